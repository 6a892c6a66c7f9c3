//! The coordinator and its environment.

use std::collections::BTreeSet;
use std::sync::Arc;

use atoll_config::TopologyConfig;
use atoll_ring::{RingMutation, TokenMetadata, TokenStatus};
use atoll_rpc::{ClusterView, Transport, replicate_ring};
use atoll_store::LinearizableStore;
use atoll_types::{CoordinatorId, HostId, Timestamp, TxId};

use crate::error::{Error, Result};
use crate::lock::GlobalLock;
use crate::traits::{Clock, DataStreamer, IdSource, RingStore, TableCatalog, TokenAllocator};
use crate::transaction::{TopologyAction, Transactions};

/// Everything the coordinator drives but does not implement.
///
/// Production wiring and deterministic simulation provide the same shapes;
/// the state machine itself depends on nothing else.
#[derive(Clone)]
pub struct Environment {
    /// Linearizable metadata store (transactions, intents, locks).
    pub store: Arc<dyn LinearizableStore>,

    /// At-least-once message delivery.
    pub transport: Arc<dyn Transport>,

    /// Membership oracles: dead set, seed, local identity.
    pub cluster: Arc<dyn ClusterView>,

    /// This node's token-metadata table.
    pub ring: Arc<dyn RingStore>,

    /// Linearizable table-set reads.
    pub catalog: Arc<dyn TableCatalog>,

    /// Bulk data movement.
    pub streamer: Arc<dyn DataStreamer>,

    /// Token selection for joining hosts.
    pub tokens: Arc<dyn TokenAllocator>,

    /// Back-off sleeps.
    pub clock: Arc<dyn Clock>,

    /// Fresh identities.
    pub ids: Arc<dyn IdSource>,
}

/// Drives topology-change transactions on this node.
///
/// Logically single-threaded: a step returns before the next begins. Other
/// coordinators for the same transaction may exist transiently after a
/// takeover; the coordinator-guarded step advance ensures at most one makes
/// durable progress.
pub struct Coordinator {
    pub(crate) env: Environment,
    pub(crate) config: TopologyConfig,
    pub(crate) txs: Transactions,
    pub(crate) lock: GlobalLock,
}

impl Coordinator {
    pub fn new(env: Environment, config: TopologyConfig) -> Self {
        let txs = Transactions::new(Arc::clone(&env.store));
        let lock = GlobalLock::ring(Arc::clone(&env.store));
        Self {
            env,
            config,
            txs,
            lock,
        }
    }

    /// Typed access to the transaction tables.
    pub fn transactions(&self) -> &Transactions {
        &self.txs
    }

    /// The ring lock registers.
    pub fn ring_lock(&self) -> &GlobalLock {
        &self.lock
    }

    /// Installs this node as a fresh coordinator for the transaction.
    ///
    /// The previous coordinator is preempted: its next guarded write fails,
    /// wherever it is.
    pub fn failover(&self, tx: TxId) -> Result<CoordinatorId> {
        let coordinator = CoordinatorId::from(self.env.ids.new_uuid());
        self.txs.failover(tx, coordinator, self.env.cluster.local_host())?;
        Ok(coordinator)
    }

    /// Active participants: the stored set minus permanently dead hosts.
    ///
    /// Dead hosts never execute another message, so dropping them from the
    /// fanout cannot lose an effect.
    pub(crate) fn participants(&self, tx: TxId) -> Result<BTreeSet<HostId>> {
        let stored = self.txs.stored_participants(tx)?;
        let dead = self.env.cluster.dead();
        Ok(stored.difference(&dead).copied().collect())
    }

    /// Moves every participant to `stage` under the step's stamp.
    pub(crate) fn set_stage(
        &self,
        tx: TxId,
        stage: atoll_ring::ReplicationStage,
        stamp: Timestamp,
    ) -> Result<()> {
        let mutation = RingMutation::set_stage(stage, stamp);
        replicate_ring(&*self.env.transport, self.participants(tx)?, &mutation)?;
        Ok(())
    }

    /// Computes the transitional ring for the transaction's action.
    pub(crate) fn make_new_ring(&self, tx: TxId) -> Result<TokenMetadata> {
        let mut ring = self.env.ring.local_ring();
        let action = self.txs.action(tx)?;
        let targets = self.txs.targets(tx)?;
        match action {
            TopologyAction::Add => {
                for node in targets {
                    let tokens = self.env.tokens.choose_tokens(&ring);
                    ring = ring.with_tokens(node, tokens, TokenStatus::Pending);
                }
            }
            TopologyAction::Decommission => {
                for node in targets {
                    let tokens = ring.tokens_of(node);
                    ring = ring.with_tokens(node, tokens, TokenStatus::Leaving);
                }
            }
            TopologyAction::Replace => {
                let &[old, new] = targets.as_slice() else {
                    return Err(Error::InvalidRecord {
                        tx,
                        reason: "replace requires exactly two targets",
                    });
                };
                let tokens = ring.tokens_of(old);
                ring = ring
                    .with_tokens(old, tokens.clone(), TokenStatus::Leaving)
                    .with_tokens(new, tokens, TokenStatus::Pending);
            }
        }
        Ok(ring)
    }
}
