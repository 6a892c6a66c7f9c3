//! # atoll-topology: The topology-change state machine
//!
//! Safe, resumable ring changes for a token-ring database. An admitted
//! change (add / decommission / replace) walks a durable sequence of steps
//! that carries every participant through well-defined replication stages,
//! so reads and writes stay correct end-to-end - across coordinator
//! crashes, takeovers, and concurrent abort requests.
//!
//! ## Key principles
//!
//! - **Durable steps**: the current step lives on a linearizable record;
//!   any node can resume the machine from wherever the last coordinator
//!   stopped.
//! - **Coordinator-guarded advance**: a takeover installs a fresh
//!   coordinator identity, and every step advance is a CAS guarded on it.
//!   The superseded coordinator's next advance fails, wherever it is.
//! - **Idempotent effects**: a crash between an effect and its advance
//!   replays the effect. Ring mutations carry last-writer-wins stamps;
//!   everything else is naturally repeatable.
//! - **Abortable locking**: the ring lock's three-register protocol makes
//!   even the acquisition loop safe to abort.
//!
//! ## Architecture
//!
//! - [`Coordinator`] + [`Environment`]: the machine and its seams
//! - [`Step`]: the closed step set, forward and abort
//! - [`Transactions`]: the durable record (component behind `resume`)
//! - [`GlobalLock`]: owner/candidate registers
//! - [`traits`]: collaborator seams ([`RingStore`], [`DataStreamer`], ...)
//!
//! ## Example
//!
//! ```ignore
//! let coordinator = Coordinator::new(env, config.topology);
//!
//! // Grow the ring; drives the change to completion.
//! coordinator.add_nodes(&nodes)?;
//!
//! // After the admitting node died mid-change, any member finishes it:
//! coordinator.resume(tx)?;
//! ```

mod admission;
mod coordinator;
mod driver;
mod error;
mod lock;
mod step;
mod steps;
pub mod traits;
mod transaction;

#[cfg(test)]
mod testing;


pub use coordinator::{Coordinator, Environment};
pub use error::{Error, Result};
pub use lock::{GlobalLock, RING_LOCK};
pub use step::Step;
pub use steps::LockAttempt;
pub use traits::{
    CatalogError, Clock, DataStreamer, IdSource, RandomIds, RingStore, StreamingError,
    SystemClock, TableCatalog, TokenAllocator,
};
pub use transaction::{TopologyAction, Transactions};

// The coordinator's tunables come from the shared configuration crate.
pub use atoll_config::TopologyConfig;
