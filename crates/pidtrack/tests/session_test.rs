use pidtrack::{
    EventKind, EventRecord, HookInstrumentation, SessionConfig, SessionState, TracerSession,
};
use std::sync::{Arc, Mutex};

/// Helper collecting every record a session forwards to its sink
fn recording_sink() -> (Arc<Mutex<Vec<EventRecord>>>, pidtrack::EventSink) {
    let records = Arc::new(Mutex::new(Vec::new()));
    let records_clone = records.clone();
    let sink: pidtrack::EventSink = Box::new(move |record: &EventRecord| {
        records_clone.lock().unwrap().push(*record);
    });
    (records, sink)
}

/// Test the load/unload hook flow of an embedding library
#[test_log::test]
fn test_library_lifecycle_hooks() -> anyhow::Result<()> {
    let instrumentation = HookInstrumentation::new();
    let hook = instrumentation.hook();
    let (records, sink) = recording_sink();

    let mut session = TracerSession::new(instrumentation, SessionConfig::default()).with_sink(sink);
    session.start()?;

    // Library constructor
    hook.announce_current_process();
    session.poll();
    let own_pid = std::process::id();
    assert!(session.process_table().get(own_pid).is_some());

    // Library destructor
    hook.retire_current_process();
    session.stop();

    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.snapshot().is_empty());

    let records = records.lock().unwrap();
    let kinds: Vec<_> = records.iter().map(|r| (r.kind, r.pid)).collect();
    assert_eq!(
        kinds,
        vec![
            (EventKind::ProcessStart, own_pid),
            (EventKind::ProcessExit, own_pid)
        ]
    );
    assert_eq!(records[0].sequence, 1);
    assert_eq!(records[1].sequence, 2);

    Ok(())
}

/// Test that several host threads can share the hook
#[test_log::test]
fn test_hook_shared_between_threads() -> anyhow::Result<()> {
    let instrumentation = HookInstrumentation::new();
    let hook = instrumentation.hook();
    let mut session = TracerSession::new(
        instrumentation,
        SessionConfig {
            capacity: 1024,
            batch_size: 64,
        },
    );
    session.start()?;

    let workers: Vec<_> = (0..4u32)
        .map(|worker| {
            let hook = hook.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    let pid = worker * 1000 + i;
                    hook.process_started(pid);
                    hook.process_exited(pid);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut processed = 0;
    loop {
        let stats = session.poll();
        if stats.processed == 0 {
            break;
        }
        processed += stats.processed;
    }

    assert_eq!(processed, 800);
    assert_eq!(session.dropped_count(), 0);
    assert!(session.snapshot().is_empty());

    Ok(())
}

/// Test that a second session cannot attach to an already used hook
#[test_log::test]
fn test_second_session_fails_to_attach() -> anyhow::Result<()> {
    let instrumentation = HookInstrumentation::new();
    let mut first = TracerSession::new(instrumentation.clone(), SessionConfig::default());
    first.start()?;

    let mut second = TracerSession::new(instrumentation, SessionConfig::default());
    assert!(matches!(
        second.start(),
        Err(pidtrack::AttachError::AlreadyAttached)
    ));
    assert_eq!(second.state(), SessionState::Idle);
    assert!(!second.is_buffer_allocated());

    // Once the first session is gone the attach point is free again
    first.stop();
    second.start()?;
    assert_eq!(second.state(), SessionState::Running);

    Ok(())
}

#[cfg(target_os = "linux")]
mod procfs_instrumentation {
    use super::*;
    use pidtrack::{ProcfsInstrumentation, ProcfsOptions};
    use std::process::Command;
    use std::time::{Duration, Instant};

    /// Track a command with the procfs instrumentation until it exits
    fn track_command(command: &str, args: &[&str]) -> anyhow::Result<(u32, Vec<EventRecord>)> {
        let mut child = Command::new(command).args(args).spawn()?;
        let root_pid = child.id();

        let instrumentation = ProcfsInstrumentation::new(ProcfsOptions {
            scan_interval: Duration::from_millis(10),
            root_pid: Some(root_pid),
            report_existing: true,
        });
        let (records, sink) = recording_sink();
        let mut session =
            TracerSession::new(instrumentation, SessionConfig::default()).with_sink(sink);
        session.start()?;

        let deadline = Instant::now() + Duration::from_secs(10);
        while child.try_wait()?.is_none() && Instant::now() < deadline {
            session.poll();
            std::thread::sleep(Duration::from_millis(20));
        }
        child.wait()?;
        session.stop();

        let records = records.lock().unwrap().clone();
        Ok((root_pid, records))
    }

    /// Test that the root process start and exit are observed
    #[test_log::test]
    fn test_root_process_start_and_exit() -> anyhow::Result<()> {
        let (root_pid, records) = track_command("sleep", &["0.3"])?;

        assert!(
            records
                .iter()
                .any(|r| r.kind == EventKind::ProcessStart && r.pid == root_pid),
            "Root process start should be reported: {records:?}"
        );
        assert!(
            records
                .iter()
                .any(|r| r.kind == EventKind::ProcessExit && r.pid == root_pid),
            "Root process exit should be reported: {records:?}"
        );
        assert!(records.windows(2).all(|w| w[0].sequence < w[1].sequence));

        Ok(())
    }

    /// Test that a child of the root process is tracked
    #[test_log::test]
    fn test_child_process_is_tracked() -> anyhow::Result<()> {
        let (root_pid, records) = track_command("sh", &["-c", "sleep 0.5; true"])?;

        let child_starts = records
            .iter()
            .filter(|r| r.kind == EventKind::ProcessStart && r.pid != root_pid)
            .count();
        assert!(
            child_starts >= 1,
            "Expected the sleep child to be tracked: {records:?}"
        );

        Ok(())
    }
}
