//! # atoll-sim: Deterministic simulation of the topology core
//!
//! An in-process cluster: one shared linearizable store (the LWT-managed
//! metadata tables), one full coordinator per node, and a transport that
//! routes every message to the destination node's handler - with scripted
//! partitions standing in for network failures.
//!
//! ## Philosophy
//!
//! - **Reproducibility**: same seed → same host identities, same tokens,
//!   same execution
//! - **No real time**: the clock is virtual; lock back-off advances it
//!   without sleeping
//! - **Whole-protocol coverage**: admission RPCs (`Replace`, `Bootstrap`)
//!   run through the same transport as ring replication, so a scenario
//!   exercises exactly the calls a real cluster would make
//!
//! ## Quick start
//!
//! ```ignore
//! let mut sim = SimCluster::new(3, SimConfig::default().with_seed(42));
//! let d = sim.add_node();
//! let a = sim.hosts()[0];
//! sim.node(a).coordinator.add_nodes(&BTreeSet::from([d]))?;
//! assert!(sim.ring(a).members().contains(&d));
//! ```

mod cluster;


pub use cluster::{SimCluster, SimConfig, SimNode, SimStreamer};
