//! Admission surface: the operator-facing entry points.

use std::collections::BTreeSet;

use atoll_rpc::RpcMessage;
use atoll_types::{HostId, TxId};

use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::transaction::TopologyAction;

impl Coordinator {
    /// Creates a topology-change record without running it.
    ///
    /// Admission rejects a second change while one is in flight.
    pub fn create_change(&self, action: TopologyAction, targets: &[HostId]) -> Result<TxId> {
        let tx = TxId::from(self.env.ids.new_uuid());
        self.txs.create(tx, action, targets)?;
        tracing::info!(%tx, action = action.as_str(), targets = targets.len(), "topology change admitted");
        Ok(tx)
    }

    /// Adds `nodes` to the ring and drives the change to completion.
    pub fn add_nodes(&self, nodes: &BTreeSet<HostId>) -> Result<TxId> {
        let local = self.env.cluster.local_host();
        if nodes.contains(&local) {
            return Err(Error::TargetIsLocal { host: local });
        }
        let targets: Vec<HostId> = nodes.iter().copied().collect();
        let tx = self.create_change(TopologyAction::Add, &targets)?;
        self.take_over_and_run(tx)?;
        Ok(tx)
    }

    /// Removes `nodes` from the ring and drives the change to completion.
    pub fn decommission_nodes(&self, nodes: &BTreeSet<HostId>) -> Result<TxId> {
        let targets: Vec<HostId> = nodes.iter().copied().collect();
        let tx = self.create_change(TopologyAction::Decommission, &targets)?;
        self.take_over_and_run(tx)?;
        Ok(tx)
    }

    /// Asks a seed to replace `old` with this node.
    ///
    /// Runs on the replacement node; the seed creates and drives the
    /// transaction, since the joining node is not yet a cluster member.
    pub fn replace_node(&self, old: HostId) -> Result<()> {
        let seed = self.env.cluster.seed();
        let new = self.env.cluster.local_host();
        self.env.transport.call(seed, RpcMessage::Replace { old, new })?;
        Ok(())
    }

    /// Asks a seed to add this node the auto-bootstrap way.
    pub fn bootstrap(&self) -> Result<()> {
        let seed = self.env.cluster.seed();
        let node = self.env.cluster.local_host();
        self.env.transport.call(seed, RpcMessage::Bootstrap { node })?;
        Ok(())
    }

    /// Resumes a transaction on this node, preempting whatever coordinator
    /// drove it before.
    pub fn resume(&self, tx: TxId) -> Result<()> {
        self.take_over_and_run(tx)
    }

    /// Safely reverts a topology change: installs a fresh coordinator, maps
    /// the current step to its abort entry, and drives the reverse sequence
    /// until the pre-change ring is restored.
    ///
    /// Rejected with [`Error::TooLateToAbort`] once reads have left the old
    /// ring for good; from there the forward path must complete.
    pub fn abort(&self, tx: TxId) -> Result<()> {
        let coordinator = self.failover(tx)?;
        let (step, _) = self.txs.read_step(tx)?;
        let entry = step.abort_entry().ok_or(Error::TooLateToAbort { tx, step })?;
        tracing::info!(%tx, from = %step, entry = %entry, "aborting topology change");
        self.txs.set_step(tx, coordinator, entry)?;
        self.run(tx, coordinator)
    }

    /// Executes a message delivered to this node.
    pub fn handle_message(&self, msg: RpcMessage) -> Result<()> {
        match msg {
            RpcMessage::ReplicateRing(mutation) => {
                self.env.ring.apply(&mutation);
                Ok(())
            }
            RpcMessage::Replace { old, new } => {
                let tx = self.create_change(TopologyAction::Replace, &[old, new])?;
                self.take_over_and_run(tx)
            }
            RpcMessage::Bootstrap { node } => {
                let tx = self.create_change(TopologyAction::Add, &[node])?;
                self.take_over_and_run(tx)
            }
        }
    }

    fn take_over_and_run(&self, tx: TxId) -> Result<()> {
        let coordinator = self.failover(tx)?;
        self.run(tx, coordinator)
    }
}
