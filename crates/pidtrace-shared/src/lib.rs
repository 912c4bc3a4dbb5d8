pub mod artifacts;
pub mod event;

pub use event::{EventKind, EventRecord, ProcessInfo};
