use pidtrace_shared::{EventKind, EventRecord, ProcessInfo};
use std::collections::HashMap;

/// Effect of applying one event to a [`ProcessTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableChange {
    Inserted,
    /// A start for a pid that was already tracked, e.g. after pid reuse with a lost exit
    Replaced,
    Removed,
    /// An exit for a pid that was never seen starting
    Ignored,
}

/// Processes known to be alive, built from the observed event stream.
///
/// The table is best-effort: it only reflects events that made it through the ring buffer,
/// so drops can leave stale entries or cause exits to be ignored.
#[derive(Debug, Default)]
pub struct ProcessTable {
    processes: HashMap<u32, ProcessInfo>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an event and update the table
    pub fn on_event(&mut self, record: &EventRecord) -> TableChange {
        match record.kind {
            EventKind::ProcessStart => {
                match self.processes.insert(record.pid, ProcessInfo::from(record)) {
                    Some(_) => TableChange::Replaced,
                    None => TableChange::Inserted,
                }
            }
            EventKind::ProcessExit => match self.processes.remove(&record.pid) {
                Some(_) => TableChange::Removed,
                None => TableChange::Ignored,
            },
        }
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessInfo> {
        self.processes.get(&pid)
    }

    /// Copy of every tracked process, sorted by pid
    pub fn snapshot(&self) -> Vec<ProcessInfo> {
        let mut processes: Vec<_> = self.processes.values().copied().collect();
        processes.sort_unstable_by_key(|p| p.pid);
        processes
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}
