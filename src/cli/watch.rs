use super::shared::{JsonLinesWriter, log_snapshot, logging_sink};
use crate::config::PidtraceConfig;
use crate::prelude::*;
use clap::Args;
use pidtrack::{ProcfsInstrumentation, ProcfsOptions, TracerSession};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Stop tracing after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Stop tracing after this many seconds without any event
    /// Defaults to `idle-timeout-secs` from the configuration
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Only trace this process and its descendants
    #[arg(long)]
    pub pid: Option<u32>,

    /// Write every event as a JSON line to this file
    #[arg(long)]
    pub events: Option<PathBuf>,
}

pub fn run(args: WatchArgs, config: &PidtraceConfig) -> Result<i32> {
    let writer = args
        .events
        .as_deref()
        .map(JsonLinesWriter::create)
        .transpose()?;

    let instrumentation = ProcfsInstrumentation::new(ProcfsOptions {
        scan_interval: config.scan_interval(),
        root_pid: args.pid,
        report_existing: args.pid.is_some(),
    });
    let mut session =
        TracerSession::new(instrumentation, config.session_config()).with_sink(logging_sink(writer));
    session
        .start()
        .context("Failed to start tracing")?;

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let idle_timeout = args
        .idle_timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.idle_timeout());
    info!("👀 Watching process events...");

    let mut last_event = Instant::now();
    loop {
        let stats = session.poll();
        if stats.processed > 0 {
            last_event = Instant::now();
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            debug!("Tracing duration elapsed");
            break;
        }
        if last_event.elapsed() >= idle_timeout {
            info!(
                "No events received for {} secs. Exiting.",
                idle_timeout.as_secs()
            );
            break;
        }

        std::thread::sleep(config.poll_interval());
    }

    session.stop();
    log_snapshot(&session.snapshot());
    if session.dropped_count() > 0 {
        warn!("{} events were dropped", session.dropped_count());
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Child, Command};

    fn fast_config() -> PidtraceConfig {
        PidtraceConfig {
            poll_interval_ms: 20,
            scan_interval_ms: 10,
            ..Default::default()
        }
    }

    /// Long-lived process to scope the watch to
    fn spawn_sleeper() -> Child {
        Command::new("sleep").arg("30").spawn().unwrap()
    }

    fn reap(mut child: Child) {
        let _ = child.kill();
        let _ = child.wait();
    }

    #[test]
    fn test_watch_stops_after_idle_timeout() {
        let sleeper = spawn_sleeper();
        let dir = tempfile::tempdir().unwrap();
        let events_path = dir.path().join("events.jsonl");
        let args = WatchArgs {
            duration: None,
            idle_timeout: Some(1),
            pid: Some(sleeper.id()),
            events: Some(events_path.clone()),
        };

        let start = Instant::now();
        let result = run(args, &fast_config());
        let elapsed = start.elapsed();
        let sleeper_pid = sleeper.id();
        reap(sleeper);

        assert_eq!(result.unwrap(), 0);
        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(10), "{elapsed:?}");

        let content = std::fs::read_to_string(&events_path).unwrap();
        assert!(
            content.contains(&format!(r#""kind":"ProcessStart","pid":{sleeper_pid},"#)),
            "The watched process should be reported: {content}"
        );
    }

    #[test]
    fn test_watch_stops_after_duration() {
        let sleeper = spawn_sleeper();
        let args = WatchArgs {
            duration: Some(1),
            idle_timeout: Some(60),
            pid: Some(sleeper.id()),
            events: None,
        };

        let start = Instant::now();
        let result = run(args, &fast_config());
        let elapsed = start.elapsed();
        reap(sleeper);

        assert_eq!(result.unwrap(), 0);
        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(10), "{elapsed:?}");
    }
}
