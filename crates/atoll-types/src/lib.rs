//! # atoll-types: Core types for `Atoll`
//!
//! This crate contains shared types used across the `Atoll` topology core:
//! - Identity types ([`HostId`], [`TxId`], [`CoordinatorId`], [`IntentId`], [`TableId`])
//! - Ring position ([`Token`])
//! - Logical time ([`Timestamp`])
//!
//! All identities are UUID-backed and `Copy`. [`Timestamp`] is a logical
//! write counter assigned by the linearizable metadata store, not wall-clock
//! time; it is strictly monotonic store-wide.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identity types - all Copy (16-byte UUIDs)
// ============================================================================

/// Unique identifier for a cluster host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostId(Uuid);

impl HostId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for HostId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Unique identifier for a topology change transaction.
///
/// Also serves as the lock-owner identity: the ring lock is owned by a
/// transaction, not by a node, so a coordinator takeover does not invalidate
/// a held lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(Uuid);

impl TxId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TxId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Identity of a coordinator incarnation for a transaction.
///
/// A fresh id is minted on every takeover. The transaction record stores the
/// currently authorized id; a CAS guarded on it is how the old coordinator
/// discovers it has been superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoordinatorId(Uuid);

impl CoordinatorId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Display for CoordinatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CoordinatorId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Key of a stored intent mutation (indirection row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IntentId(Uuid);

impl IntentId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for IntentId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Unique identifier for a user table (streaming unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(Uuid);

impl TableId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TableId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

// ============================================================================
// Ring position
// ============================================================================

/// A point on the partition ring, owned by a host.
///
/// Tokens determine data placement: a key hashes to a ring position and is
/// owned by the hosts holding the next tokens clockwise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Token(i64);

impl Token {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Token {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Token> for i64 {
    fn from(token: Token) -> Self {
        token.0
    }
}

// ============================================================================
// Logical time
// ============================================================================

/// Logical write timestamp assigned by the linearizable metadata store.
///
/// A store-wide strictly monotonic counter. The same value serves two roles:
/// the install time of a transaction step (returned alongside the step by
/// `read_step`) and the ring-timestamp carried by token-metadata mutations
/// for last-writer-wins application.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// The immediately following timestamp.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
