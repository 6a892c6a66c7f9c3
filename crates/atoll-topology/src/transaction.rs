//! Durable topology-change transaction records.
//!
//! One linearizable row per transaction holds the action, its targets, the
//! current step, the authorized coordinator, and the saved intent. A second
//! table holds the (potentially large) intent mutation blob behind an
//! indirection key. A reserved `active` register keeps admission honest:
//! at most one transaction record is in flight.

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use atoll_ring::RingMutation;
use atoll_store::{Assignment, LinearizableStore, Predicate, Row, Value};
use atoll_types::{CoordinatorId, HostId, IntentId, Timestamp, TxId};

use crate::error::{Error, Result};
use crate::step::Step;

const TOPOLOGY_CHANGES: &str = "topology_changes";
const INTENTS: &str = "topology_change_intents";

const ACTION: &str = "action";
const TARGETS: &str = "targets";
const STEP: &str = "step";
const COORDINATOR: &str = "coordinator";
const COORDINATOR_HOST: &str = "coordinator_host";
const INTENT: &str = "intent";
const PARTICIPANTS: &str = "participants";

const TX: &str = "tx";
const MUTATION: &str = "mutation";

/// Row key of the single-change admission register.
const ACTIVE: &str = "active";

/// What a topology change does to the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyAction {
    /// Targets join the ring with fresh tokens.
    Add,

    /// Targets leave the ring, giving up their tokens.
    Decommission,

    /// The first target's tokens move to the second target.
    Replace,
}

impl TopologyAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TopologyAction::Add => "add",
            TopologyAction::Decommission => "decommission",
            TopologyAction::Replace => "replace",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "add" => TopologyAction::Add,
            "decommission" => TopologyAction::Decommission,
            "replace" => TopologyAction::Replace,
            _ => return None,
        })
    }
}

/// Typed access to the transaction tables.
pub struct Transactions {
    store: Arc<dyn LinearizableStore>,
}

impl Transactions {
    pub fn new(store: Arc<dyn LinearizableStore>) -> Self {
        Self { store }
    }

    fn key(tx: TxId) -> String {
        tx.as_uuid().to_string()
    }

    fn record(&self, tx: TxId) -> Result<Row> {
        self.store
            .read_serial(TOPOLOGY_CHANGES, &Self::key(tx))?
            .ok_or(Error::NotFound { tx })
    }

    /// Creates a new transaction record at step [`Step::Lock`].
    ///
    /// Rejects with [`Error::ChangeInProgress`] when another change already
    /// holds the admission register.
    pub fn create(
        &self,
        tx: TxId,
        action: TopologyAction,
        targets: &[HostId],
    ) -> Result<()> {
        let target_ids: Vec<Uuid> = targets.iter().map(|host| host.as_uuid()).collect();
        let inserted = self.store.cas(
            TOPOLOGY_CHANGES,
            &Self::key(tx),
            &Predicate::always().and_null(STEP),
            &[
                Assignment::set(ACTION, action.as_str()),
                Assignment::set(TARGETS, Value::Uuids(target_ids)),
                Assignment::set(STEP, Step::Lock.as_str()),
            ],
        )?;
        if !inserted.applied {
            // A record with this id already exists; never disturb it.
            return Err(Error::ChangeInProgress { active: tx });
        }

        let admission = self.store.cas(
            TOPOLOGY_CHANGES,
            ACTIVE,
            &Predicate::always().and_null(TX),
            &[Assignment::set(TX, tx.as_uuid())],
        )?;
        if !admission.applied {
            // Another change is in flight; withdraw our record.
            self.store.remove(TOPOLOGY_CHANGES, &Self::key(tx))?;
            let active = admission
                .observed
                .get(TX)
                .and_then(Value::as_uuid)
                .map(TxId::from)
                .ok_or(Error::InvalidRecord {
                    tx,
                    reason: "admission register held without a transaction id",
                })?;
            return Err(Error::ChangeInProgress { active });
        }
        Ok(())
    }

    /// Installs a new coordinator for the transaction, preempting the
    /// previous one: its next guarded write will fail.
    pub fn failover(&self, tx: TxId, coordinator: CoordinatorId, host: HostId) -> Result<()> {
        let outcome = self.store.cas(
            TOPOLOGY_CHANGES,
            &Self::key(tx),
            &Predicate::always().and_not_null(STEP),
            &[
                Assignment::set(COORDINATOR, coordinator.as_uuid()),
                Assignment::set(COORDINATOR_HOST, host.as_uuid()),
            ],
        )?;
        if !outcome.applied {
            return Err(Error::NotFound { tx });
        }
        tracing::info!(%tx, %coordinator, %host, "coordinator installed");
        Ok(())
    }

    /// The current step and the stamp of the write that installed it.
    ///
    /// The stamp is strictly monotonic across step changes and stable under
    /// re-reads of the same step.
    pub fn read_step(&self, tx: TxId) -> Result<(Step, Timestamp)> {
        let row = self.record(tx)?;
        let tag = row
            .get(STEP)
            .and_then(Value::as_str)
            .ok_or(Error::InvalidRecord {
                tx,
                reason: "record has no step",
            })?;
        let step = Step::parse(tag).ok_or(Error::InvalidRecord {
            tx,
            reason: "unknown step tag",
        })?;
        let stamp = row.written(STEP).ok_or(Error::InvalidRecord {
            tx,
            reason: "step cell has no write stamp",
        })?;
        Ok((step, stamp))
    }

    /// Advances the step, guarded on the coordinator identity.
    ///
    /// The guard is the preemption mechanism: guarding on the previous step
    /// would let two coordinators that observed the same step race forward,
    /// while the coordinator guard fails the old one unconditionally once a
    /// takeover has been installed.
    pub fn set_step(&self, tx: TxId, coordinator: CoordinatorId, step: Step) -> Result<()> {
        let outcome = self.store.cas(
            TOPOLOGY_CHANGES,
            &Self::key(tx),
            &Predicate::always().and_eq(COORDINATOR, coordinator.as_uuid()),
            &[Assignment::set(STEP, step.as_str())],
        )?;
        if !outcome.applied {
            tracing::info!(%tx, %coordinator, "preempted during step advance");
            return Err(Error::Preempted { tx });
        }
        tracing::debug!(%tx, step = %step, "step advanced");
        Ok(())
    }

    /// Durably associates the intent mutation and participant set with the
    /// transaction, if `coordinator` is still authorized.
    pub fn save_intent(
        &self,
        tx: TxId,
        coordinator: CoordinatorId,
        intent: IntentId,
        participants: &BTreeSet<HostId>,
        mutation: &RingMutation,
    ) -> Result<()> {
        let blob = postcard::to_allocvec(mutation).map_err(|err| Error::Codec {
            reason: err.to_string(),
        })?;
        self.store.cas(
            INTENTS,
            &intent.as_uuid().to_string(),
            &Predicate::always(),
            &[
                Assignment::set(TX, tx.as_uuid()),
                Assignment::set(MUTATION, Value::Bytes(blob)),
            ],
        )?;

        let participant_ids: Vec<Uuid> =
            participants.iter().map(|host| host.as_uuid()).collect();
        let outcome = self.store.cas(
            TOPOLOGY_CHANGES,
            &Self::key(tx),
            &Predicate::always().and_eq(COORDINATOR, coordinator.as_uuid()),
            &[
                Assignment::set(INTENT, intent.as_uuid()),
                Assignment::set(PARTICIPANTS, Value::Uuids(participant_ids)),
            ],
        )?;
        if !outcome.applied {
            return Err(Error::Preempted { tx });
        }
        Ok(())
    }

    /// The intent mutation saved by [`save_intent`](Self::save_intent).
    pub fn read_intent(&self, tx: TxId) -> Result<RingMutation> {
        let row = self.record(tx)?;
        let intent = row
            .get(INTENT)
            .and_then(Value::as_uuid)
            .ok_or(Error::InvalidRecord {
                tx,
                reason: "no intent saved",
            })?;
        let intent_row = self
            .store
            .read_serial(INTENTS, &intent.to_string())?
            .ok_or(Error::InvalidRecord {
                tx,
                reason: "intent row missing",
            })?;
        let blob = intent_row
            .get(MUTATION)
            .and_then(Value::as_bytes)
            .ok_or(Error::InvalidRecord {
                tx,
                reason: "intent row has no mutation",
            })?;
        postcard::from_bytes(blob).map_err(|err| Error::Codec {
            reason: err.to_string(),
        })
    }

    /// The stored participant set.
    ///
    /// Reading the local ring instead would be wrong: during the final
    /// steps some participants may already be gone from the ring, yet the
    /// steps may need to be replayed against them.
    pub fn stored_participants(&self, tx: TxId) -> Result<BTreeSet<HostId>> {
        let row = self.record(tx)?;
        let ids = row
            .get(PARTICIPANTS)
            .and_then(Value::as_uuids)
            .ok_or(Error::InvalidRecord {
                tx,
                reason: "no participants saved",
            })?;
        Ok(ids.iter().copied().map(HostId::from).collect())
    }

    /// The action recorded at admission.
    pub fn action(&self, tx: TxId) -> Result<TopologyAction> {
        let row = self.record(tx)?;
        let tag = row
            .get(ACTION)
            .and_then(Value::as_str)
            .ok_or(Error::InvalidRecord {
                tx,
                reason: "record has no action",
            })?;
        TopologyAction::parse(tag).ok_or(Error::InvalidRecord {
            tx,
            reason: "unknown action tag",
        })
    }

    /// The target hosts recorded at admission, in admission order.
    pub fn targets(&self, tx: TxId) -> Result<Vec<HostId>> {
        let row = self.record(tx)?;
        let ids = row
            .get(TARGETS)
            .and_then(Value::as_uuids)
            .ok_or(Error::InvalidRecord {
                tx,
                reason: "record has no targets",
            })?;
        Ok(ids.iter().copied().map(HostId::from).collect())
    }

    /// The currently authorized coordinator, if one has been installed.
    pub fn coordinator(&self, tx: TxId) -> Result<Option<CoordinatorId>> {
        let row = self.record(tx)?;
        Ok(row
            .get(COORDINATOR)
            .and_then(Value::as_uuid)
            .map(CoordinatorId::from))
    }

    /// Removes the transaction record, its intent row, and the admission
    /// register. Idempotent: re-running after a partial crash completes the
    /// removal.
    pub fn remove(&self, tx: TxId) -> Result<()> {
        // Release the admission register first so a crash mid-removal never
        // leaves it pointing at a vanished record.
        self.store.cas(
            TOPOLOGY_CHANGES,
            ACTIVE,
            &Predicate::always().and_eq(TX, tx.as_uuid()),
            &[Assignment::clear(TX)],
        )?;

        if let Some(row) = self.store.read_serial(TOPOLOGY_CHANGES, &Self::key(tx))? {
            if let Some(intent) = row.get(INTENT).and_then(Value::as_uuid) {
                self.store.remove(INTENTS, &intent.to_string())?;
            }
        }
        self.store.remove(TOPOLOGY_CHANGES, &Self::key(tx))?;
        Ok(())
    }
}
