use crate::event::ProcessInfo;
use serde::{Deserialize, Serialize};

/// Processes still tracked when a session stopped
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessSnapshot {
    /// Process the session was scoped to, if any
    pub root_pid: Option<u32>,
    /// Total number of events lost to ring buffer overruns
    pub dropped: u64,
    pub processes: Vec<ProcessInfo>,
}

impl super::ArtifactExt for ProcessSnapshot {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactExt;

    #[test]
    fn test_snapshot_round_trip_through_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let snapshot = ProcessSnapshot {
            root_pid: Some(12),
            dropped: 3,
            processes: vec![ProcessInfo {
                pid: 12,
                start_timestamp: 99,
                last_seen_sequence: 4,
            }],
        };
        snapshot.save_to(dir.path())?;

        let bytes = std::fs::read(dir.path().join("ProcessSnapshot.msgpack"))?;
        let decoded: ProcessSnapshot = rmp_serde::from_slice(&bytes)?;
        assert_eq!(decoded, snapshot);

        Ok(())
    }
}
