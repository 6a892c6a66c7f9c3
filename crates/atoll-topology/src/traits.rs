//! Collaborator seams of the coordinator.
//!
//! The coordinator drives external subsystems it does not implement:
//! node-local ring state, the table catalog, the streaming engine, token
//! selection, time, and identity generation. Each is a trait so production
//! wiring and deterministic simulation plug in the same way.

use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use atoll_ring::{RingMutation, TokenMetadata};
use atoll_types::{TableId, Token, TxId};

/// Node-local token-metadata table.
pub trait RingStore: Send + Sync {
    /// This node's current view of the ring.
    fn local_ring(&self) -> TokenMetadata;

    /// Applies a mutation with last-writer-wins semantics; returns whether
    /// it took effect. The local data plane must have re-planned reads and
    /// writes before this returns.
    fn apply(&self, mutation: &RingMutation) -> bool;
}

/// Streaming subsystem failure.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StreamingError(pub String);

/// Bulk data movement between replica sets. Internals are opaque to the
/// coordinator.
pub trait DataStreamer: Send + Sync {
    /// Streams all data of `tables` for the transaction. On return, every
    /// write ACKed before the call is replicated to its new replica set and
    /// visible to reads.
    fn stream(&self, tx: TxId, tables: &BTreeSet<TableId>) -> Result<(), StreamingError>;

    /// Interrupts streaming started by the transaction. After this returns,
    /// streaming effects no longer land, so they cannot interfere with
    /// cleanup or user reads.
    fn stop(&self, tx: TxId) -> Result<(), StreamingError>;
}

/// Table catalog read failure.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CatalogError(pub String);

/// The set of existing tables.
pub trait TableCatalog: Send + Sync {
    /// Reads the current table set at linearizable consistency, so that
    /// streaming cannot miss a table that has already received writes.
    fn all_tables(&self) -> Result<BTreeSet<TableId>, CatalogError>;
}

/// Token selection for joining hosts. Internals are opaque.
pub trait TokenAllocator: Send + Sync {
    /// Chooses a fresh token set for one host joining `ring`.
    fn choose_tokens(&self, ring: &TokenMetadata) -> BTreeSet<Token>;
}

/// Time source for the lock retry back-off.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Production clock backed by the OS.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Source of fresh identities.
pub trait IdSource: Send + Sync {
    fn new_uuid(&self) -> Uuid;
}

/// Production identity source.
#[derive(Debug, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn new_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}
