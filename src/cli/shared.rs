use crate::prelude::*;
use pidtrack::{EventKind, EventRecord, EventSink, ProcessInfo};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Events collected by a sink, shared with the caller
pub type CollectedEvents = Arc<Mutex<Vec<EventRecord>>>;

/// Sink keeping every record in memory
pub fn collecting_sink() -> (CollectedEvents, EventSink) {
    let events = CollectedEvents::default();
    let events_clone = events.clone();
    let sink: EventSink = Box::new(move |record: &EventRecord| {
        log_event(record);
        events_clone
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*record);
    });
    (events, sink)
}

pub fn take_events(events: &CollectedEvents) -> Vec<EventRecord> {
    std::mem::take(&mut *events.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Writes every record as one JSON object per line
pub struct JsonLinesWriter<W: Write> {
    writer: W,
}

impl JsonLinesWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create events file {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write(&mut self, record: &EventRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Sink logging every record, and writing it to `writer` when provided
pub fn logging_sink<W: Write + Send + 'static>(
    mut writer: Option<JsonLinesWriter<W>>,
) -> EventSink {
    Box::new(move |record: &EventRecord| {
        log_event(record);
        let Some(json_writer) = writer.as_mut() else {
            return;
        };
        // Flushing per record keeps the file usable while tracing is still running
        let result = json_writer.write(record).and_then(|_| json_writer.flush());
        if let Err(e) = result {
            warn!("Failed to write event, disabling the events file: {e:#}");
            writer = None;
        }
    })
}

fn log_event(record: &EventRecord) {
    match record.kind {
        EventKind::ProcessStart => debug!("+ pid {} (seq {})", record.pid, record.sequence),
        EventKind::ProcessExit => debug!("- pid {} (seq {})", record.pid, record.sequence),
    }
}

pub fn log_snapshot(processes: &[ProcessInfo]) {
    info!("{} processes still tracked", processes.len());
    for process in processes {
        debug!(
            "  pid {} started at {} ns (seq {})",
            process.pid, process.start_timestamp, process.last_seen_sequence
        );
    }
}
