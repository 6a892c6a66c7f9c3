//! The three-register global lock.
//!
//! Mutual exclusion for topology changes, built from two linearizable
//! registers (`owner`, `candidate`) plus the transaction's `step` register.
//! Three registers are the minimum for a lock whose *acquisition* can be
//! safely aborted: with a bare CAS on `owner`, an acquire could land between
//! an abort's step change and its release, leaving the lock held by a
//! transaction that believes it was aborted.
//!
//! Acquisition loops over: set `candidate := tx`; check the transaction is
//! still at the lock step; CAS `owner := tx` if `owner` is null and
//! `candidate` is still `tx`. The abort sequence advances the step away
//! from the lock step, nulls `candidate`, then releases `owner` if held.
//! After that, an acquirer before its step check exits there; one past it
//! fails the candidate guard; one that already owned the lock has been
//! released.

use std::sync::Arc;

use atoll_store::{Assignment, LinearizableStore, Predicate, Value};
use atoll_types::TxId;

use crate::error::Result;

/// Table holding the lock registers.
const GLOBAL_LOCKS: &str = "global_locks";

/// Name of the ring lock.
pub const RING_LOCK: &str = "ring";

const OWNER: &str = "owner";
const CANDIDATE: &str = "candidate";

/// A named global lock, owned by a transaction.
///
/// Ownership by transaction (not by node) means a coordinator takeover does
/// not invalidate a held lock; the successor inherits it with the
/// transaction.
pub struct GlobalLock {
    store: Arc<dyn LinearizableStore>,
    name: String,
}

impl GlobalLock {
    pub fn new(store: Arc<dyn LinearizableStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// The ring lock.
    pub fn ring(store: Arc<dyn LinearizableStore>) -> Self {
        Self::new(store, RING_LOCK)
    }

    /// Registers `tx` as the lock candidate, unconditionally.
    ///
    /// A later [`try_lock`](Self::try_lock) only succeeds while this
    /// registration stands.
    pub fn prepare(&self, tx: TxId) -> Result<()> {
        self.store.cas(
            GLOBAL_LOCKS,
            &self.name,
            &Predicate::always(),
            &[Assignment::set(CANDIDATE, tx.as_uuid())],
        )?;
        Ok(())
    }

    /// Attempts to take ownership for `tx`.
    ///
    /// Succeeds iff the lock is free and `tx` is still the candidate - or
    /// `tx` already owns the lock (re-execution after a crash).
    pub fn try_lock(&self, tx: TxId) -> Result<bool> {
        let outcome = self.store.cas(
            GLOBAL_LOCKS,
            &self.name,
            &Predicate::always()
                .and_null(OWNER)
                .and_eq(CANDIDATE, tx.as_uuid()),
            &[Assignment::set(OWNER, tx.as_uuid())],
        )?;
        Ok(outcome.applied
            || outcome.observed.get(OWNER).and_then(Value::as_uuid) == Some(tx.as_uuid()))
    }

    /// Invalidates any in-flight acquisition: nulls the candidate register,
    /// unconditionally. Subsequent `try_lock` fails until `prepare` runs
    /// again.
    pub fn interrupt(&self) -> Result<()> {
        self.store.cas(
            GLOBAL_LOCKS,
            &self.name,
            &Predicate::always(),
            &[Assignment::clear(CANDIDATE)],
        )?;
        Ok(())
    }

    /// Releases the lock if `tx` owns it; otherwise has no effect.
    pub fn unlock(&self, tx: TxId) -> Result<()> {
        self.store.cas(
            GLOBAL_LOCKS,
            &self.name,
            &Predicate::always().and_eq(OWNER, tx.as_uuid()),
            &[Assignment::clear(OWNER)],
        )?;
        Ok(())
    }

    /// The current owner, if any.
    pub fn owner(&self) -> Result<Option<TxId>> {
        let row = self.store.read_serial(GLOBAL_LOCKS, &self.name)?;
        Ok(row
            .as_ref()
            .and_then(|row| row.get(OWNER))
            .and_then(Value::as_uuid)
            .map(TxId::from))
    }
}
