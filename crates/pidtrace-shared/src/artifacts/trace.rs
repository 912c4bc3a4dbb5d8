use crate::event::EventRecord;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Every event consumed during a tracing session, in consumption order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceArtifact {
    pub events: Vec<EventRecord>,
}

impl super::ArtifactExt for TraceArtifact {
    fn encode_to_writer<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        // Events are encoded one by one so that `decode_streamed` can read them back
        // without loading the whole trace in memory.
        let mut serializer = rmp_serde::Serializer::new(writer);
        for event in &self.events {
            event.serialize(&mut serializer)?;
        }
        Ok(())
    }
}

impl TraceArtifact {
    pub fn decode_streamed<R: Read>(reader: R) -> anyhow::Result<TraceEventStream<R>> {
        Ok(TraceEventStream {
            deserializer: rmp_serde::Deserializer::new(reader),
        })
    }
}

pub struct TraceEventStream<R: Read> {
    deserializer: rmp_serde::Deserializer<rmp_serde::decode::ReadReader<R>>,
}

impl<R: Read> Iterator for TraceEventStream<R> {
    type Item = EventRecord;

    fn next(&mut self) -> Option<Self::Item> {
        EventRecord::deserialize(&mut self.deserializer).ok()
    }
}
