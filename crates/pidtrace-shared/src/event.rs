use serde::{Deserialize, Serialize};

/// Lifecycle transition reported by an instrumentation point
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    ProcessStart,
    ProcessExit,
}

impl EventKind {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            EventKind::ProcessStart => 0,
            EventKind::ProcessExit => 1,
        }
    }

    pub(crate) fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(EventKind::ProcessStart),
            1 => Some(EventKind::ProcessExit),
            _ => None,
        }
    }
}

/// One lifecycle event, as published by a producer into the ring buffer.
///
/// `sequence` is assigned by the producer, starts at 1 and strictly increases. A consumer
/// that observes a gap between two consecutive sequences knows events were dropped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub pid: u32,
    /// CLOCK_MONOTONIC, in nanoseconds
    pub timestamp: u64,
    pub sequence: u64,
}

impl EventRecord {
    pub fn start(pid: u32, timestamp: u64, sequence: u64) -> Self {
        Self {
            kind: EventKind::ProcessStart,
            pid,
            timestamp,
            sequence,
        }
    }

    pub fn exit(pid: u32, timestamp: u64, sequence: u64) -> Self {
        Self {
            kind: EventKind::ProcessExit,
            pid,
            timestamp,
            sequence,
        }
    }

    /// Pack `kind` and `pid` into a single word, so a ring buffer slot can store them with
    /// one atomic operation.
    pub fn packed_header(&self) -> u64 {
        (u64::from(self.kind.as_u8()) << 32) | u64::from(self.pid)
    }

    /// Inverse of [`EventRecord::packed_header`]. Returns `None` for an unknown kind.
    pub fn from_packed(header: u64, timestamp: u64, sequence: u64) -> Option<Self> {
        let kind = EventKind::from_u8((header >> 32) as u8)?;
        Some(Self {
            kind,
            pid: header as u32,
            timestamp,
            sequence,
        })
    }
}

/// Tracked-process metadata kept by the process table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub start_timestamp: u64,
    pub last_seen_sequence: u64,
}

impl From<&EventRecord> for ProcessInfo {
    fn from(record: &EventRecord) -> Self {
        Self {
            pid: record.pid,
            start_timestamp: record.timestamp,
            last_seen_sequence: record.sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_header_keeps_kind_and_pid() {
        let record = EventRecord::exit(u32::MAX, 10, 3);
        let decoded = EventRecord::from_packed(record.packed_header(), 10, 3);
        assert_eq!(decoded, Some(record));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert_eq!(EventRecord::from_packed(7 << 32, 0, 0), None);
    }

    #[test]
    fn test_record_json_layout() {
        insta::assert_json_snapshot!(EventRecord::start(42, 1_000, 1), @r#"
        {
          "kind": "ProcessStart",
          "pid": 42,
          "timestamp": 1000,
          "sequence": 1
        }
        "#);
    }
}
