//! Topology protocol messages.

use serde::{Deserialize, Serialize};

use atoll_ring::RingMutation;
use atoll_types::HostId;

/// A message executed on a remote node.
///
/// - [`ReplicateRing`](Self::ReplicateRing) - Coordinator → Participant:
///   apply this token-metadata mutation and wait for its post-conditions
///   (the local data plane has re-planned reads and writes for the stage).
/// - [`Replace`](Self::Replace) - Joining node → Seed: create and run a
///   replace transaction on my behalf.
/// - [`Bootstrap`](Self::Bootstrap) - Joining node → Seed: create and run
///   an add transaction on my behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMessage {
    /// Apply a token-metadata mutation to the receiver's local table.
    ReplicateRing(RingMutation),

    /// Replace a dead host with the sender.
    Replace {
        /// The host being replaced.
        old: HostId,
        /// The replacement host (the sender).
        new: HostId,
    },

    /// Add the sender to the ring the auto-bootstrap way.
    Bootstrap {
        /// The joining host (the sender).
        node: HostId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use atoll_ring::{ReplicationStage, RingMutation};
    use atoll_types::Timestamp;
    use uuid::Uuid;

    #[test]
    fn messages_compare_by_content() {
        let node = HostId::from(Uuid::from_u128(1));
        assert_eq!(RpcMessage::Bootstrap { node }, RpcMessage::Bootstrap { node });

        let m = RingMutation::set_stage(ReplicationStage::Cleanup, Timestamp::new(3));
        assert_eq!(
            RpcMessage::ReplicateRing(m.clone()),
            RpcMessage::ReplicateRing(m)
        );
    }
}
