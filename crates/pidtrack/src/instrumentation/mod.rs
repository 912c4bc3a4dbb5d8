//! Attach points feeding a tracer session
//!
//! An [`Instrumentation`] receives the session's unique [`EventProducer`] when the session
//! attaches, and must give it back up (and stop using it) when unregistered.

mod hook;
#[cfg(target_os = "linux")]
mod procfs;

pub use hook::{HookInstrumentation, HookRegistration, ProcessHook};
#[cfg(target_os = "linux")]
pub use self::procfs::{ProcfsInstrumentation, ProcfsOptions, ProcfsScanner};

use crate::error::AttachError;
use crate::ring_buffer::RingBuffer;
use nix::time::{ClockId, clock_gettime};
use pidtrace_shared::{EventKind, EventRecord};
use std::sync::Arc;

/// A mechanism that detects process starts and exits.
pub trait Instrumentation {
    /// Token identifying an active registration
    type Handle;

    /// Start reporting events through `producer`.
    ///
    /// On failure the producer must be dropped, so the session can release its buffer.
    fn register(&mut self, producer: EventProducer) -> Result<Self::Handle, AttachError>;

    /// Stop reporting events. When this returns, the producer passed to `register` must have
    /// been dropped and no publish may still be in flight.
    fn unregister(&mut self, handle: Self::Handle);
}

/// The single publishing handle of a ring buffer.
///
/// It is deliberately not `Clone`: owning it is what makes a caller the producer. It stamps
/// every record with the next sequence number and the monotonic clock.
#[derive(Debug)]
pub struct EventProducer {
    buffer: Arc<RingBuffer>,
    next_sequence: u64,
}

impl EventProducer {
    pub(crate) fn new(buffer: Arc<RingBuffer>) -> Self {
        Self {
            buffer,
            next_sequence: 1,
        }
    }

    /// Publish an event for `pid` and return the record that was written
    pub fn emit(&mut self, kind: EventKind, pid: u32) -> EventRecord {
        let record = EventRecord {
            kind,
            pid,
            timestamp: monotonic_ns(),
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.buffer.publish(record);
        record
    }

    pub fn process_started(&mut self, pid: u32) -> EventRecord {
        self.emit(EventKind::ProcessStart, pid)
    }

    pub fn process_exited(&mut self, pid: u32) -> EventRecord {
        self.emit(EventKind::ProcessExit, pid)
    }
}

/// Current CLOCK_MONOTONIC time in nanoseconds
pub fn monotonic_ns() -> u64 {
    clock_gettime(ClockId::CLOCK_MONOTONIC)
        .map(|ts| ts.tv_sec() as u64 * 1_000_000_000 + ts.tv_nsec() as u64)
        .unwrap_or(0)
}
