//! # atoll-rpc: Messages and fanout seam
//!
//! This crate defines what the topology core sends between nodes:
//!
//! - [`RpcMessage`] - the three messages of the protocol
//! - [`Transport`] - send-and-execute with *at-least-once* semantics
//! - [`ClusterView`] - the membership oracles (`dead`, `seed`, `local_host`)
//! - [`replicate_ring`] - the fanout helper for token-metadata mutations
//!
//! A [`Transport::call`] may return success after remote execution, or
//! failure even though the remote will eventually execute the message.
//! Every effect shipped through it must therefore be idempotent; ring
//! mutations are, by their last-writer-wins stamps.

mod message;
mod transport;

pub use message::RpcMessage;
pub use transport::{ClusterView, Error, Result, Transport, replicate_ring};
