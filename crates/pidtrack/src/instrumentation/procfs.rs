use super::{EventProducer, Instrumentation};
use crate::error::AttachError;
use crate::prelude::*;
use pidtrace_shared::EventKind;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Tuning of the `/proc` scanner
#[derive(Debug, Clone)]
pub struct ProcfsOptions {
    /// Delay between two scans of `/proc`
    pub scan_interval: Duration,
    /// Only report this process and its descendants
    pub root_pid: Option<u32>,
    /// Report processes already alive at registration as started
    pub report_existing: bool,
}

impl Default for ProcfsOptions {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(100),
            root_pid: None,
            report_existing: false,
        }
    }
}

/// Instrumentation detecting process starts and exits by periodically diffing the pid set
/// exposed in `/proc`.
///
/// Processes living shorter than the scan interval can go unnoticed, and a pid reused within
/// one interval is seen as the same process.
#[derive(Debug, Default)]
pub struct ProcfsInstrumentation {
    options: ProcfsOptions,
}

impl ProcfsInstrumentation {
    pub fn new(options: ProcfsOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ProcfsOptions {
        &self.options
    }
}

/// Background thread scanning `/proc` on behalf of a registered session
pub struct ProcfsScanner {
    shutdown: Arc<AtomicBool>,
    scan_thread: Option<JoinHandle<()>>,
}

impl ProcfsScanner {
    /// Stop the scanning thread and wait for it to finish
    fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.scan_thread.take() {
            thread.thread().unpark();
            if thread.join().is_err() {
                error!("procfs scanner thread panicked");
            }
        }
    }
}

impl Drop for ProcfsScanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Instrumentation for ProcfsInstrumentation {
    type Handle = ProcfsScanner;

    fn register(&mut self, mut producer: EventProducer) -> Result<ProcfsScanner, AttachError> {
        let with_parents = self.options.root_pid.is_some();
        let baseline = read_processes(with_parents)
            .map_err(|e| AttachError::Unavailable(format!("{e:#}")))?;

        if let Some(root_pid) = self.options.root_pid {
            if !baseline.contains_key(&root_pid) {
                warn!("Root process {root_pid} is not running, nothing may be traced");
            }
        }

        let mut state = ScanState::new(self.options.root_pid);
        let existing = state.prime(baseline);
        debug!("procfs baseline has {} tracked processes", existing.len());
        if self.options.report_existing {
            for pid in existing {
                producer.emit(EventKind::ProcessStart, pid);
            }
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let scan_interval = self.options.scan_interval;

        let scan_thread = std::thread::Builder::new()
            .name("pidtrack-procfs".into())
            .spawn(move || {
                while !shutdown_clone.load(Ordering::Relaxed) {
                    std::thread::park_timeout(scan_interval);
                    scan_once(&mut state, &mut producer, with_parents);
                }
                // Catch processes that exited right before the session stopped
                scan_once(&mut state, &mut producer, with_parents);
            })
            .map_err(|e| AttachError::Registration(format!("failed to spawn scanner: {e}")))?;

        Ok(ProcfsScanner {
            shutdown,
            scan_thread: Some(scan_thread),
        })
    }

    fn unregister(&mut self, mut handle: ProcfsScanner) {
        handle.shutdown();
    }
}

fn scan_once(state: &mut ScanState, producer: &mut EventProducer, with_parents: bool) {
    match read_processes(with_parents) {
        Ok(current) => {
            for (kind, pid) in state.update(current) {
                producer.emit(kind, pid);
            }
        }
        Err(e) => warn!("Failed to scan /proc: {e:#}"),
    }
}

/// Read the live pids, mapped to their parent pid when `with_parents` is set (0 otherwise).
///
/// The parent is `None` when the process stat could not be read.
fn read_processes(with_parents: bool) -> Result<HashMap<u32, Option<u32>>> {
    let processes = ::procfs::process::all_processes().context("Failed to list /proc")?;

    let mut current = HashMap::new();
    for process in processes {
        // Processes can exit while being listed
        let Ok(process) = process else {
            continue;
        };
        let ppid = if with_parents {
            process.stat().ok().map(|stat| stat.ppid as u32)
        } else {
            Some(0)
        };
        current.insert(process.pid as u32, ppid);
    }

    Ok(current)
}

/// Pid set bookkeeping between two scans
#[derive(Debug)]
struct ScanState {
    root_pid: Option<u32>,
    /// Pids seen by the previous scan, mapped to their parent
    known: HashMap<u32, u32>,
    /// Root and descendants, only maintained when `root_pid` is set
    tracked: HashSet<u32>,
}

impl ScanState {
    fn new(root_pid: Option<u32>) -> Self {
        Self {
            root_pid,
            known: HashMap::new(),
            tracked: HashSet::new(),
        }
    }

    /// Fill in unreadable parents from the previous scan. Unknown pids without a parent are
    /// left for the next scan.
    fn resolve_parents(&self, scanned: HashMap<u32, Option<u32>>) -> HashMap<u32, u32> {
        scanned
            .into_iter()
            .filter_map(|(pid, ppid)| {
                ppid.or_else(|| self.known.get(&pid).copied())
                    .map(|ppid| (pid, ppid))
            })
            .collect()
    }

    /// Record the initial pid set and return the tracked processes in it, sorted by pid
    fn prime(&mut self, scanned: HashMap<u32, Option<u32>>) -> Vec<u32> {
        let current = self.resolve_parents(scanned);
        if let Some(root_pid) = self.root_pid {
            if current.contains_key(&root_pid) {
                self.tracked.insert(root_pid);
            }
            let candidates: Vec<u32> = current.keys().copied().collect();
            self.adopt_descendants(candidates, &current);
        }
        self.known = current;

        let mut existing: Vec<u32> = match self.root_pid {
            Some(_) => self.tracked.iter().copied().collect(),
            None => self.known.keys().copied().collect(),
        };
        existing.sort_unstable();
        existing
    }

    /// Diff `current` against the previous scan. Exits come first, then starts sorted by pid.
    fn update(&mut self, scanned: HashMap<u32, Option<u32>>) -> Vec<(EventKind, u32)> {
        let current = self.resolve_parents(scanned);
        let mut events = Vec::new();

        let mut exited: Vec<u32> = self
            .known
            .keys()
            .filter(|pid| !current.contains_key(pid))
            .copied()
            .collect();
        exited.sort_unstable();
        for pid in exited {
            let was_tracked = match self.root_pid {
                Some(_) => self.tracked.remove(&pid),
                None => true,
            };
            if was_tracked {
                events.push((EventKind::ProcessExit, pid));
            }
        }

        let mut started: Vec<u32> = current
            .keys()
            .filter(|pid| !self.known.contains_key(pid))
            .copied()
            .collect();
        started.sort_unstable();

        if self.root_pid.is_some() {
            let adopted = self.adopt_descendants(started.clone(), &current);
            started.retain(|pid| adopted.contains(pid));
        }
        events.extend(started.into_iter().map(|pid| (EventKind::ProcessStart, pid)));

        self.known = current;
        events
    }

    /// Track every candidate whose parent chain reaches a tracked process. Returns the newly
    /// tracked pids.
    fn adopt_descendants(
        &mut self,
        mut candidates: Vec<u32>,
        parents: &HashMap<u32, u32>,
    ) -> HashSet<u32> {
        let mut adopted = HashSet::new();
        loop {
            let before = candidates.len();
            candidates.retain(|pid| {
                if self.tracked.contains(pid) {
                    return false;
                }
                match parents.get(pid) {
                    Some(ppid) if self.tracked.contains(ppid) => {
                        self.tracked.insert(*pid);
                        adopted.insert(*pid);
                        false
                    }
                    _ => true,
                }
            });
            if candidates.len() == before {
                return adopted;
            }
        }
    }
}
