//! The step library: effects of each forward and abort step.
//!
//! Every effect is idempotent under replay. A crash between an effect and
//! its step advance re-runs the effect with the same stamp: ring mutations
//! are absorbed by their last-writer-wins stamps, stage sets and
//! `stop_streaming` are naturally repeatable, and the lock tolerates
//! re-acquisition by its owner.

use atoll_ring::{ReplicationStage, RingMutation};
use atoll_rpc::replicate_ring;
use atoll_types::{CoordinatorId, IntentId, Timestamp, TxId};

use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::step::Step;

/// Outcome of one iteration of the lock acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// This transaction owns the ring lock.
    Acquired,

    /// The transaction has moved off the lock step: an abort (or another
    /// coordinator) took over while we were acquiring.
    Superseded,

    /// The lock is held elsewhere or our candidacy was overwritten; retry
    /// after the back-off.
    Contended,
}

impl Coordinator {
    /// Executes one step's effect, returning the next step (`None` for
    /// terminal).
    ///
    /// No effect of the next step starts before the advance of this one is
    /// durable; the driver enforces that ordering.
    pub(crate) fn execute_step(
        &self,
        tx: TxId,
        coordinator: CoordinatorId,
        step: Step,
        stamp: Timestamp,
    ) -> Result<Option<Step>> {
        match step {
            Step::Lock => self.step_lock(tx),
            Step::MakeRing => self.step_make_ring(tx, coordinator, stamp),
            Step::AdvertiseRing => self.step_advertise_ring(tx),
            Step::BeforeStreaming => {
                self.set_stage(tx, ReplicationStage::WriteBothReadOld, stamp)?;
                Ok(Some(Step::Streaming))
            }
            Step::Streaming => self.step_streaming(tx),
            Step::AfterStreaming => {
                self.set_stage(tx, ReplicationStage::WriteBothReadNew, stamp)?;
                Ok(Some(Step::UseOnlyNew))
            }
            Step::UseOnlyNew => {
                self.set_stage(tx, ReplicationStage::UseOnlyNew, stamp)?;
                Ok(Some(Step::Cleanup))
            }
            Step::Cleanup => {
                self.set_stage(tx, ReplicationStage::Cleanup, stamp)?;
                Ok(Some(Step::OnlyNewRing))
            }
            Step::OnlyNewRing => self.step_only_new_ring(tx, stamp),
            Step::Unlock => self.step_unlock(tx),
            Step::AbortLock => {
                self.lock.interrupt()?;
                Ok(Some(Step::Unlock))
            }
            Step::AbortReadOld => {
                self.set_stage(tx, ReplicationStage::WriteBothReadOld, stamp)?;
                Ok(Some(Step::AbortStopStreaming))
            }
            Step::AbortStopStreaming => {
                self.env.streamer.stop(tx).map_err(|err| Error::Streaming {
                    tx,
                    reason: err.to_string(),
                })?;
                Ok(Some(Step::AbortUseOnlyOld))
            }
            Step::AbortUseOnlyOld => {
                self.set_stage(tx, ReplicationStage::UseOnlyOld, stamp)?;
                Ok(Some(Step::AbortCleanup))
            }
            Step::AbortCleanup => {
                self.set_stage(tx, ReplicationStage::CleanupOnAbort, stamp)?;
                Ok(Some(Step::AbortOldRing))
            }
            Step::AbortOldRing => self.step_abort_old_ring(tx, stamp),
        }
    }

    /// One iteration of the lock acquisition loop: register candidacy,
    /// re-check the step, attempt the guarded ownership write.
    ///
    /// Exposed as a single attempt so every interleaving with the abort
    /// sequence can be driven deterministically; the lock step loops it
    /// with the configured back-off.
    pub fn lock_attempt(&self, tx: TxId) -> Result<LockAttempt> {
        self.lock.prepare(tx)?;
        // An abort moves the step away from Lock before it nulls the
        // candidate register; checking between the two writes is what makes
        // the abort airtight (see the lock module docs).
        let (step, _) = self.txs.read_step(tx)?;
        if step != Step::Lock {
            return Ok(LockAttempt::Superseded);
        }
        if self.lock.try_lock(tx)? {
            Ok(LockAttempt::Acquired)
        } else {
            Ok(LockAttempt::Contended)
        }
    }

    fn step_lock(&self, tx: TxId) -> Result<Option<Step>> {
        let mut attempts: u32 = 0;
        loop {
            match self.lock_attempt(tx)? {
                LockAttempt::Acquired => return Ok(Some(Step::MakeRing)),
                LockAttempt::Superseded => return Err(Error::Preempted { tx }),
                LockAttempt::Contended => {
                    attempts += 1;
                    let limit = self.config.lock_retry_limit;
                    if limit != 0 && attempts >= limit {
                        return Err(Error::LockUnavailable { tx, attempts });
                    }
                    tracing::debug!(%tx, attempts, "ring lock contended, backing off");
                    self.env.clock.sleep(self.config.lock_retry_interval());
                }
            }
        }
    }

    fn step_make_ring(
        &self,
        tx: TxId,
        coordinator: CoordinatorId,
        stamp: Timestamp,
    ) -> Result<Option<Step>> {
        let ring = self.make_new_ring(tx)?;
        let participants = ring.members();
        let intent = IntentId::from(self.env.ids.new_uuid());
        let mutation = RingMutation::install(ring, stamp);
        self.txs.save_intent(tx, coordinator, intent, &participants, &mutation)?;
        Ok(Some(Step::AdvertiseRing))
    }

    fn step_advertise_ring(&self, tx: TxId) -> Result<Option<Step>> {
        let mutation = self.txs.read_intent(tx)?;
        replicate_ring(&*self.env.transport, self.participants(tx)?, &mutation)?;
        Ok(Some(Step::BeforeStreaming))
    }

    fn step_streaming(&self, tx: TxId) -> Result<Option<Step>> {
        // The table-set read must happen after every participant reached
        // write-both/read-old: tables created before that stage are in the
        // set and get streamed explicitly, tables created after are covered
        // by the dual writes. Reading earlier would leave a window where a
        // new table has neither.
        let tables = self.env.catalog.all_tables().map_err(|err| Error::Catalog {
            reason: err.to_string(),
        })?;
        self.env
            .streamer
            .stream(tx, &tables)
            .map_err(|err| Error::Streaming {
                tx,
                reason: err.to_string(),
            })?;
        Ok(Some(Step::AfterStreaming))
    }

    fn step_only_new_ring(&self, tx: TxId, stamp: Timestamp) -> Result<Option<Step>> {
        let collapsed = self.env.ring.local_ring().new_ring();
        let mutation = RingMutation::install(collapsed, stamp);
        replicate_ring(&*self.env.transport, self.participants(tx)?, &mutation)?;
        Ok(Some(Step::Unlock))
    }

    fn step_abort_old_ring(&self, tx: TxId, stamp: Timestamp) -> Result<Option<Step>> {
        let collapsed = self.env.ring.local_ring().old_ring();
        let mutation = RingMutation::install(collapsed, stamp);
        replicate_ring(&*self.env.transport, self.participants(tx)?, &mutation)?;
        Ok(Some(Step::Unlock))
    }

    fn step_unlock(&self, tx: TxId) -> Result<Option<Step>> {
        self.lock.unlock(tx)?;
        self.txs.remove(tx)?;
        tracing::info!(%tx, "topology change finished");
        Ok(None)
    }
}
