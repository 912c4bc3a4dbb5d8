use crate::error::AttachError;
use crate::instrumentation::{EventProducer, Instrumentation};
use crate::prelude::*;
use crate::process_table::ProcessTable;
use crate::ring_buffer::RingBuffer;
use pidtrace_shared::{EventRecord, ProcessInfo};
use std::sync::Arc;

/// Callback receiving every record consumed by a session, in order
pub type EventSink = Box<dyn FnMut(&EventRecord) + Send>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Ring buffer capacity, rounded up to a power of two
    pub capacity: usize,
    /// Maximum number of records consumed by one [`TracerSession::poll`]
    pub batch_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            batch_size: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Instrumentation registered and ring buffer allocated
    Attached,
    /// Polling enabled
    Running,
    /// Terminal, a new session has to be created to trace again
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Records consumed by this poll
    pub processed: usize,
    /// Total number of records dropped since the session attached
    pub dropped_count: u64,
}

/// Owns the ring buffer between an instrumentation and the process table.
///
/// The session goes `Idle -> Attached -> Running -> Stopped`. The embedding application
/// drives consumption by calling [`TracerSession::poll`] at its own cadence; nothing is
/// consumed in the background.
pub struct TracerSession<I: Instrumentation> {
    instrumentation: I,
    config: SessionConfig,
    state: SessionState,
    registration: Option<I::Handle>,
    buffer: Option<Arc<RingBuffer>>,
    table: ProcessTable,
    sink: Option<EventSink>,
    dropped_count: u64,
    last_sequence: u64,
}

impl<I: Instrumentation> TracerSession<I> {
    pub fn new(instrumentation: I, config: SessionConfig) -> Self {
        Self {
            instrumentation,
            config,
            state: SessionState::Idle,
            registration: None,
            buffer: None,
            table: ProcessTable::new(),
            sink: None,
            dropped_count: 0,
            last_sequence: 0,
        }
    }

    /// Forward every consumed record to `sink`
    pub fn with_sink(mut self, sink: EventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn set_sink(&mut self, sink: EventSink) {
        self.sink = Some(sink);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn instrumentation(&self) -> &I {
        &self.instrumentation
    }

    pub fn process_table(&self) -> &ProcessTable {
        &self.table
    }

    pub fn snapshot(&self) -> Vec<ProcessInfo> {
        self.table.snapshot()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    pub fn is_buffer_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    /// Allocate the ring buffer and register the instrumentation.
    ///
    /// On failure the buffer is released and the session stays `Idle`, so attaching can be
    /// retried.
    pub fn attach(&mut self) -> Result<(), AttachError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Attached | SessionState::Running => return Ok(()),
            SessionState::Stopped => return Err(AttachError::SessionStopped),
        }

        let buffer = Arc::new(RingBuffer::with_capacity(self.config.capacity));
        let producer = EventProducer::new(buffer.clone());

        match self.instrumentation.register(producer) {
            Ok(registration) => {
                info!(
                    "Tracer attached with a ring buffer of {} events",
                    buffer.capacity()
                );
                self.registration = Some(registration);
                self.buffer = Some(buffer);
                self.state = SessionState::Attached;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to attach tracer: {e}");
                Err(e)
            }
        }
    }

    /// Attach if needed and enable polling
    pub fn start(&mut self) -> Result<(), AttachError> {
        match self.state {
            SessionState::Idle => self.attach()?,
            SessionState::Attached => {}
            SessionState::Running => return Ok(()),
            SessionState::Stopped => return Err(AttachError::SessionStopped),
        }

        self.state = SessionState::Running;
        debug!("Tracer session running");
        Ok(())
    }

    /// Consume one batch of records and apply them to the process table.
    ///
    /// Does nothing unless the session is running.
    pub fn poll(&mut self) -> PollStats {
        let processed = match self.state {
            SessionState::Running => self.drain(self.config.batch_size),
            _ => 0,
        };

        PollStats {
            processed,
            dropped_count: self.dropped_count,
        }
    }

    /// Unregister the instrumentation, drain what is left and release the ring buffer.
    ///
    /// Calling it again, or on a session that never attached, has no further effect.
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            debug!("Tracer session already stopped");
            return;
        }

        // The producer must be gone before the final drain and the release of the buffer
        if let Some(registration) = self.registration.take() {
            self.instrumentation.unregister(registration);
        }
        let remaining = self.drain(usize::MAX);
        self.buffer = None;
        self.state = SessionState::Stopped;

        info!(
            "Tracer stopped: {remaining} events drained on stop, {} processes still tracked, {} events dropped",
            self.table.len(),
            self.dropped_count
        );
    }

    fn drain(&mut self, max_n: usize) -> usize {
        let Some(buffer) = self.buffer.as_ref() else {
            return 0;
        };
        let batch = buffer.consume_batch(max_n);

        if batch.dropped > 0 {
            self.dropped_count += batch.dropped;
            warn!(
                "Ring buffer overrun, {} events dropped ({} total)",
                batch.dropped, self.dropped_count
            );
        }

        for record in &batch.records {
            if record.sequence != self.last_sequence + 1 {
                debug!(
                    "Sequence gap: expected {}, got {}",
                    self.last_sequence + 1,
                    record.sequence
                );
            }
            self.last_sequence = record.sequence;

            let change = self.table.on_event(record);
            trace!("{:?} pid {} -> {change:?}", record.kind, record.pid);

            if let Some(sink) = self.sink.as_mut() {
                sink(record);
            }
        }

        batch.records.len()
    }
}

impl<I: Instrumentation> Drop for TracerSession<I> {
    fn drop(&mut self) {
        self.stop();
    }
}
