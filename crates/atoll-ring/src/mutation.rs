//! Ring mutations and their last-writer-wins application.

use serde::{Deserialize, Serialize};

use atoll_types::Timestamp;

use crate::metadata::TokenMetadata;
use crate::stage::ReplicationStage;

/// What a mutation does to a node-local ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingMutationOp {
    /// Install a complete ring snapshot (tokens, statuses, and stage).
    Install(TokenMetadata),

    /// Update only the static replication-stage cell.
    SetStage(ReplicationStage),
}

/// A token-metadata update crossing process boundaries.
///
/// Carries the ring-timestamp that makes delivery idempotent: for mutations
/// `m1 = (op1, t1)` and `m2 = (op2, t2)` with `t1 > t2`, applying `m1` then
/// `m2` leaves the same state as applying `m1` alone. The RPC layer is
/// at-least-once, so every delivery path leans on this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingMutation {
    stamp: Timestamp,
    op: RingMutationOp,
}

impl RingMutation {
    /// Packages a full ring snapshot under `stamp`.
    pub fn install(ring: TokenMetadata, stamp: Timestamp) -> Self {
        Self {
            stamp,
            op: RingMutationOp::Install(ring),
        }
    }

    /// A mutation updating only the replication stage under `stamp`.
    pub fn set_stage(stage: ReplicationStage, stamp: Timestamp) -> Self {
        Self {
            stamp,
            op: RingMutationOp::SetStage(stage),
        }
    }

    pub fn stamp(&self) -> Timestamp {
        self.stamp
    }

    pub fn op(&self) -> &RingMutationOp {
        &self.op
    }
}

/// A node's local view of the ring, with the stamp of the newest applied
/// mutation.
///
/// This is the value behind every participant's `token_metadata` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LocalRing {
    ring: TokenMetadata,
    applied: Timestamp,
}

impl LocalRing {
    pub fn new() -> Self {
        Self {
            ring: TokenMetadata::new(),
            applied: Timestamp::ZERO,
        }
    }

    pub fn ring(&self) -> &TokenMetadata {
        &self.ring
    }

    pub fn stage(&self) -> ReplicationStage {
        self.ring.stage()
    }

    /// Stamp of the newest applied mutation.
    pub fn applied(&self) -> Timestamp {
        self.applied
    }

    /// Applies a mutation with last-writer-wins semantics.
    ///
    /// Returns `false` (and leaves the ring untouched) when the mutation's
    /// stamp is not newer than the newest already applied.
    pub fn apply(&mut self, mutation: &RingMutation) -> bool {
        if mutation.stamp <= self.applied {
            return false;
        }
        match &mutation.op {
            RingMutationOp::Install(ring) => self.ring = ring.clone(),
            RingMutationOp::SetStage(stage) => {
                self.ring = self.ring.clone().with_stage(*stage);
            }
        }
        self.applied = mutation.stamp;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TokenStatus;
    use atoll_types::{HostId, Token};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn host(n: u128) -> HostId {
        HostId::from(Uuid::from_u128(n))
    }

    fn sample_ring(seed: i64) -> TokenMetadata {
        TokenMetadata::new()
            .with_tokens(host(1), [Token::new(seed)], TokenStatus::Normal)
            .with_tokens(host(2), [Token::new(seed + 1)], TokenStatus::Pending)
    }

    #[test]
    fn fresh_mutation_applies() {
        let mut local = LocalRing::new();
        let m = RingMutation::install(sample_ring(10), Timestamp::new(5));

        assert!(local.apply(&m));
        assert_eq!(local.applied(), Timestamp::new(5));
        assert_eq!(local.ring(), &sample_ring(10));
    }

    #[test]
    fn stale_mutation_is_a_noop() {
        let mut local = LocalRing::new();
        local.apply(&RingMutation::install(sample_ring(10), Timestamp::new(5)));

        let stale = RingMutation::install(sample_ring(99), Timestamp::new(4));
        assert!(!local.apply(&stale));
        assert_eq!(local.ring(), &sample_ring(10));

        // Equal stamp is also stale: redelivery of the same mutation.
        let equal = RingMutation::install(sample_ring(99), Timestamp::new(5));
        assert!(!local.apply(&equal));
        assert_eq!(local.ring(), &sample_ring(10));
    }

    #[test]
    fn stage_mutation_updates_only_the_stage() {
        let mut local = LocalRing::new();
        local.apply(&RingMutation::install(sample_ring(10), Timestamp::new(1)));
        local.apply(&RingMutation::set_stage(
            ReplicationStage::WriteBothReadOld,
            Timestamp::new(2),
        ));

        assert_eq!(local.stage(), ReplicationStage::WriteBothReadOld);
        assert_eq!(local.ring().tokens_of(host(1)), sample_ring(10).tokens_of(host(1)));
        assert_eq!(local.applied(), Timestamp::new(2));
    }

    #[test]
    fn redelivery_after_newer_stage_keeps_the_stage() {
        let mut local = LocalRing::new();
        let install = RingMutation::install(sample_ring(10), Timestamp::new(1));
        local.apply(&install);
        local.apply(&RingMutation::set_stage(
            ReplicationStage::WriteBothReadOld,
            Timestamp::new(2),
        ));

        // At-least-once transport redelivers the install; it must not
        // rewind the stage.
        assert!(!local.apply(&install));
        assert_eq!(local.stage(), ReplicationStage::WriteBothReadOld);
    }

    proptest! {
        /// Final state is independent of delivery order and multiplicity,
        /// provided stamps are respected (each mutation has a distinct
        /// stamp, as the store guarantees).
        #[test]
        fn delivery_order_and_multiplicity_do_not_matter(
            order in proptest::collection::vec(0usize..4, 1..32),
        ) {
            let mutations = [
                RingMutation::install(sample_ring(10), Timestamp::new(1)),
                RingMutation::set_stage(ReplicationStage::WriteBothReadOld, Timestamp::new(2)),
                RingMutation::set_stage(ReplicationStage::WriteBothReadNew, Timestamp::new(3)),
                RingMutation::install(sample_ring(20), Timestamp::new(4)),
            ];

            // Reference: apply once, in stamp order.
            let mut reference = LocalRing::new();
            for m in &mutations {
                reference.apply(m);
            }

            // Shuffled, duplicated delivery: must converge to the same
            // state once every mutation has been seen at least once.
            let mut local = LocalRing::new();
            for &i in &order {
                local.apply(&mutations[i]);
            }
            for m in &mutations {
                local.apply(m);
            }

            prop_assert_eq!(local, reference);
        }
    }
}
