use super::{EventProducer, Instrumentation};
use crate::error::AttachError;
use log::debug;
use pidtrace_shared::{EventKind, EventRecord};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type SharedProducer = Arc<Mutex<Option<EventProducer>>>;

/// Instrumentation driven by the embedding host.
///
/// The host keeps a [`ProcessHook`] and calls it from wherever it learns about process starts
/// and exits, for instance from library load and unload hooks. Calls are serialized by a
/// mutex, so any number of threads may share the hook. Clones of a `HookInstrumentation`
/// share the same attach point, and only one session can be attached to it at a time.
#[derive(Debug, Clone, Default)]
pub struct HookInstrumentation {
    producer: SharedProducer,
}

impl HookInstrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook(&self) -> ProcessHook {
        ProcessHook {
            producer: self.producer.clone(),
        }
    }
}

#[derive(Debug)]
pub struct HookRegistration(());

impl Instrumentation for HookInstrumentation {
    type Handle = HookRegistration;

    fn register(&mut self, producer: EventProducer) -> Result<HookRegistration, AttachError> {
        let mut slot = lock(&self.producer);
        if slot.is_some() {
            return Err(AttachError::AlreadyAttached);
        }
        *slot = Some(producer);
        debug!("Process hook attached");

        Ok(HookRegistration(()))
    }

    fn unregister(&mut self, _handle: HookRegistration) {
        // Taking the producer under the lock waits for any in-flight publish
        lock(&self.producer).take();
        debug!("Process hook detached");
    }
}

/// Host-side handle reporting events to the attached session, if any.
///
/// Every method returns the published record, or `None` when no session is attached.
#[derive(Debug, Clone)]
pub struct ProcessHook {
    producer: SharedProducer,
}

impl ProcessHook {
    pub fn is_attached(&self) -> bool {
        lock(&self.producer).is_some()
    }

    pub fn process_started(&self, pid: u32) -> Option<EventRecord> {
        self.emit(EventKind::ProcessStart, pid)
    }

    pub fn process_exited(&self, pid: u32) -> Option<EventRecord> {
        self.emit(EventKind::ProcessExit, pid)
    }

    /// Report the calling process as started, as a library constructor would
    pub fn announce_current_process(&self) -> Option<EventRecord> {
        self.process_started(std::process::id())
    }

    /// Report the calling process as exited, as a library destructor would
    pub fn retire_current_process(&self) -> Option<EventRecord> {
        self.process_exited(std::process::id())
    }

    fn emit(&self, kind: EventKind, pid: u32) -> Option<EventRecord> {
        lock(&self.producer)
            .as_mut()
            .map(|producer| producer.emit(kind, pid))
    }
}

fn lock(producer: &SharedProducer) -> MutexGuard<'_, Option<EventProducer>> {
    // A panicking host thread must not disable tracing for everyone else
    producer.lock().unwrap_or_else(PoisonError::into_inner)
}
