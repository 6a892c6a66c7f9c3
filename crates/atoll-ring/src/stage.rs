//! Replication stage ladder.

use serde::{Deserialize, Serialize};

/// Cluster-wide mode telling the data plane which rings to read and write.
///
/// The forward sequence is totally ordered:
/// `UseOnlyOld → WriteBothReadOld → WriteBothReadNew → UseOnlyNew → Cleanup`.
/// `CleanupOnAbort` is the sink of the abort path and sits outside the
/// forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReplicationStage {
    /// Reads and writes use the pre-transition ring only.
    UseOnlyOld,

    /// Writes go to both rings; reads use the pre-transition ring.
    WriteBothReadOld,

    /// Writes go to both rings; reads use the post-transition ring.
    WriteBothReadNew,

    /// Reads and writes use the post-transition ring only.
    UseOnlyNew,

    /// Old-ring replicas drop data they no longer own.
    Cleanup,

    /// New-ring replicas drop data streamed to them before the abort.
    CleanupOnAbort,
}

impl ReplicationStage {
    /// Position in the forward sequence, `None` for the abort sink.
    pub fn forward_rank(self) -> Option<u8> {
        match self {
            Self::UseOnlyOld => Some(0),
            Self::WriteBothReadOld => Some(1),
            Self::WriteBothReadNew => Some(2),
            Self::UseOnlyNew => Some(3),
            Self::Cleanup => Some(4),
            Self::CleanupOnAbort => None,
        }
    }

    /// True for the abort sink stage.
    pub fn is_abort(self) -> bool {
        self == Self::CleanupOnAbort
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_sequence_is_ordered() {
        let forward = [
            ReplicationStage::UseOnlyOld,
            ReplicationStage::WriteBothReadOld,
            ReplicationStage::WriteBothReadNew,
            ReplicationStage::UseOnlyNew,
            ReplicationStage::Cleanup,
        ];
        for pair in forward.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].forward_rank().unwrap() < pair[1].forward_rank().unwrap());
        }
    }

    #[test]
    fn abort_sink_is_outside_the_forward_order() {
        assert!(ReplicationStage::CleanupOnAbort.is_abort());
        assert_eq!(ReplicationStage::CleanupOnAbort.forward_rank(), None);
        assert!(!ReplicationStage::Cleanup.is_abort());
    }
}
