//! Process-lifecycle event tracing core
//!
//! An [`Instrumentation`] reports process starts and exits through an [`EventProducer`] into a
//! drop-oldest [`RingBuffer`]. A [`TracerSession`] drains that buffer on demand and keeps a
//! [`ProcessTable`] of the processes currently known to be alive.

mod error;
pub mod instrumentation;
mod prelude;
pub mod process_table;
pub mod ring_buffer;
pub mod session;

pub use error::AttachError;
pub use instrumentation::{EventProducer, HookInstrumentation, Instrumentation, ProcessHook};
#[cfg(target_os = "linux")]
pub use instrumentation::{ProcfsInstrumentation, ProcfsOptions};
pub use pidtrace_shared::{EventKind, EventRecord, ProcessInfo};
pub use process_table::{ProcessTable, TableChange};
pub use ring_buffer::{ConsumedBatch, RingBuffer};
pub use session::{EventSink, PollStats, SessionConfig, SessionState, TracerSession};
