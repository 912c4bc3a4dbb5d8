use super::shared::{collecting_sink, log_snapshot, take_events};
use crate::config::PidtraceConfig;
use crate::prelude::*;
use clap::Args;
use pidtrace_shared::artifacts::{ArtifactExt, ProcessSnapshot, TraceArtifact};
use pidtrack::{Instrumentation, ProcfsInstrumentation, ProcfsOptions, TracerSession};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Output folder for the trace artifacts
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Command to run and trace
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

pub fn run(args: RunArgs, config: &PidtraceConfig) -> Result<i32> {
    track_command(&args.command, &args.output, config)
}

/// Run `command`, trace it with its descendants and save the artifacts to `output_dir`.
///
/// Returns the exit code of the command.
fn track_command(command: &[String], output_dir: &Path, config: &PidtraceConfig) -> Result<i32> {
    let scan_interval = config.scan_interval();
    track_command_with(command, output_dir, config, |root_pid| {
        ProcfsInstrumentation::new(ProcfsOptions {
            scan_interval,
            root_pid: Some(root_pid),
            report_existing: true,
        })
    })
}

fn track_command_with<I, F>(
    command: &[String],
    output_dir: &Path,
    config: &PidtraceConfig,
    instrumentation_for: F,
) -> Result<i32>
where
    I: Instrumentation,
    F: FnOnce(u32) -> I,
{
    info!("Starting pidtrace for command: {command:?}");

    let (program, program_args) = command
        .split_first()
        .ok_or_else(|| anyhow!("No command to run"))?;
    let mut child = Command::new(program)
        .args(program_args)
        .spawn()
        .with_context(|| format!("Failed to spawn {program}"))?;
    let root_pid = child.id();
    info!("Spawned child with pid {root_pid}");

    let (events, sink) = collecting_sink();
    let mut session =
        TracerSession::new(instrumentation_for(root_pid), config.session_config()).with_sink(sink);

    // Tracing is best-effort, the command must run to completion either way
    if let Err(e) = session.start() {
        error!("Tracing disabled: {e}");
        let status = child.wait().context("Failed to wait for command")?;
        return Ok(exit_code(status));
    }

    let status = poll_until_exit(&mut session, &mut child, config)?;
    info!("Command exited with status: {status}");
    session.stop();

    let trace = TraceArtifact {
        events: take_events(&events),
    };
    let snapshot = ProcessSnapshot {
        root_pid: Some(root_pid),
        dropped: session.dropped_count(),
        processes: session.snapshot(),
    };
    log_snapshot(&snapshot.processes);
    info!(
        "Traced {} events, {} dropped",
        trace.events.len(),
        snapshot.dropped
    );

    trace.save_with_pid_to(output_dir, root_pid)?;
    snapshot.save_with_pid_to(output_dir, root_pid)?;
    info!("Saved trace artifacts to {}", output_dir.display());

    Ok(exit_code(status))
}

fn poll_until_exit<I: Instrumentation>(
    session: &mut TracerSession<I>,
    child: &mut Child,
    config: &PidtraceConfig,
) -> Result<ExitStatus> {
    loop {
        if let Some(status) = child.try_wait().context("Failed to wait for command")? {
            return Ok(status);
        }
        let stats = session.poll();
        trace!(
            "Polled {} events ({} dropped so far)",
            stats.processed, stats.dropped_count
        );
        std::thread::sleep(config.poll_interval());
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
