use thiserror::Error;

/// Failure to attach a tracer session to its instrumentation point.
///
/// This is always recoverable: the session stays `Idle` and the host process is unaffected.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("instrumentation is already attached to another session")]
    AlreadyAttached,
    #[error("instrumentation is unavailable: {0}")]
    Unavailable(String),
    #[error("instrumentation registration failed: {0}")]
    Registration(String),
    #[error("session was stopped, create a new session to trace again")]
    SessionStopped,
}
