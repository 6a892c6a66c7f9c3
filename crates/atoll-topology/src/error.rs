//! Error types for the topology core.

use thiserror::Error;

use atoll_types::{HostId, TxId};

use crate::step::Step;

/// Topology coordination errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Another coordinator took over this transaction. Terminate; the
    /// successor finishes the work. Nothing is rolled back.
    #[error("preempted: another coordinator took over transaction {tx}")]
    Preempted { tx: TxId },

    /// The transaction record no longer exists (completed and removed).
    #[error("transaction {tx} no longer exists")]
    NotFound { tx: TxId },

    /// Abort was requested at or past the point of no return; the forward
    /// path must complete.
    #[error("too late to abort transaction {tx} at step {step}")]
    TooLateToAbort { tx: TxId, step: Step },

    /// Another topology change is already in flight.
    #[error("topology change {active} is already in progress")]
    ChangeInProgress { active: TxId },

    /// The local host cannot be a target of its own admission call.
    #[error("host {host} cannot target itself")]
    TargetIsLocal { host: HostId },

    /// The lock step exhausted its configured attempts.
    #[error("ring lock unavailable for transaction {tx} after {attempts} attempts")]
    LockUnavailable { tx: TxId, attempts: u32 },

    /// A stored transaction record is malformed.
    #[error("malformed record for transaction {tx}: {reason}")]
    InvalidRecord { tx: TxId, reason: &'static str },

    /// The intent mutation blob failed to encode or decode.
    #[error("intent mutation codec failure: {reason}")]
    Codec { reason: String },

    /// Metadata store failure.
    #[error(transparent)]
    Store(#[from] atoll_store::Error),

    /// RPC fanout failure; the step is retried on resume.
    #[error(transparent)]
    Rpc(#[from] atoll_rpc::Error),

    /// Streaming subsystem failure; surfaced to the operator.
    #[error("streaming failed for transaction {tx}: {reason}")]
    Streaming { tx: TxId, reason: String },

    /// Table catalog read failure.
    #[error("table catalog read failed: {reason}")]
    Catalog { reason: String },
}

/// Result type for topology operations.
pub type Result<T> = std::result::Result<T, Error>;
