//! The state-machine driver.
//!
//! A loop over: read the current step and its stamp, execute the step's
//! effect, advance the durable record. The advance is guarded on the
//! coordinator identity; when it fails the driver raises
//! [`Error::Preempted`] and terminates without rolling anything back - the
//! successor coordinator finishes the transaction, and every effect is
//! idempotent under its replay.

use atoll_types::{CoordinatorId, TxId};

use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::step::Step;

impl Coordinator {
    /// One read-dispatch-advance cycle.
    ///
    /// Returns the step the transaction advanced to, or `None` when the
    /// executed step was terminal.
    pub fn step_once(&self, tx: TxId, coordinator: CoordinatorId) -> Result<Option<Step>> {
        let (step, stamp) = self.txs.read_step(tx)?;
        tracing::info!(%tx, %step, %stamp, "executing step");
        let next = self.execute_step(tx, coordinator, step, stamp)?;
        if let Some(next) = next {
            self.txs.set_step(tx, coordinator, next)?;
        }
        Ok(next)
    }

    /// Drives the transaction to its terminal step.
    pub fn run(&self, tx: TxId, coordinator: CoordinatorId) -> Result<()> {
        while self.step_once(tx, coordinator)?.is_some() {}
        Ok(())
    }
}
