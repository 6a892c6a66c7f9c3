//! Transport and membership seams.

use std::collections::BTreeSet;

use thiserror::Error;

use atoll_ring::RingMutation;
use atoll_types::HostId;

use crate::message::RpcMessage;

/// RPC errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The call did not complete. The remote may still execute the message
    /// eventually; the effect must tolerate that.
    #[error("rpc call to {host} failed: {reason}")]
    CallFailed { host: HostId, reason: String },
}

/// Result type for RPC operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Send-and-execute message delivery.
///
/// Unreliable semantics: a call may return `Ok` after remote execution, or
/// `Err` even though the remote received the message and will execute it
/// later. Callers treat every remote effect as at-least-once.
pub trait Transport: Send + Sync {
    /// Sends `msg` to `host` for execution, returning when the host has
    /// executed it - or failing without that guarantee.
    fn call(&self, host: HostId, msg: RpcMessage) -> Result<()>;
}

/// Membership oracles consumed by the topology core.
pub trait ClusterView: Send + Sync {
    /// Hosts known to be permanently decommissioned.
    ///
    /// Guarantee: a host in this set is not executing any message now and
    /// never will again. This is what makes it safe to drop dead hosts from
    /// a transaction's participant set.
    fn dead(&self) -> BTreeSet<HostId>;

    /// One of the configured seed hosts.
    fn seed(&self) -> HostId;

    /// The identity of this node.
    fn local_host(&self) -> HostId;
}

/// Replicates a ring mutation to every host in `nodes`.
///
/// Stops at the first failure: the caller's step fails and is re-run on
/// resume, and redelivery to hosts that already applied the mutation is
/// absorbed by its stamp.
pub fn replicate_ring<T: Transport + ?Sized>(
    transport: &T,
    nodes: impl IntoIterator<Item = HostId>,
    mutation: &RingMutation,
) -> Result<()> {
    for node in nodes {
        if let Err(err) = transport.call(node, RpcMessage::ReplicateRing(mutation.clone())) {
            tracing::warn!(host = %node, error = %err, "ring replication fanout failed");
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atoll_ring::ReplicationStage;
    use atoll_types::Timestamp;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn host(n: u128) -> HostId {
        HostId::from(Uuid::from_u128(n))
    }

    /// Records calls; fails on hosts in the deny set.
    struct RecordingTransport {
        calls: Mutex<Vec<(HostId, RpcMessage)>>,
        deny: BTreeSet<HostId>,
    }

    impl RecordingTransport {
        fn new(deny: impl IntoIterator<Item = HostId>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                deny: deny.into_iter().collect(),
            }
        }
    }

    impl Transport for RecordingTransport {
        fn call(&self, host: HostId, msg: RpcMessage) -> Result<()> {
            self.calls.lock().unwrap().push((host, msg));
            if self.deny.contains(&host) {
                return Err(Error::CallFailed {
                    host,
                    reason: "unreachable".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn fanout_reaches_every_node() {
        let transport = RecordingTransport::new([]);
        let m = RingMutation::set_stage(ReplicationStage::Cleanup, Timestamp::new(1));

        replicate_ring(&transport, [host(1), host(2), host(3)], &m).unwrap();

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, msg)| *msg == RpcMessage::ReplicateRing(m.clone())));
    }

    #[test]
    fn fanout_stops_at_the_first_failure() {
        let transport = RecordingTransport::new([host(2)]);
        let m = RingMutation::set_stage(ReplicationStage::Cleanup, Timestamp::new(1));

        let err = replicate_ring(&transport, [host(1), host(2), host(3)], &m).unwrap_err();
        assert!(matches!(err, Error::CallFailed { host: h, .. } if h == host(2)));

        // host(3) was never attempted; the step re-runs on resume.
        assert_eq!(transport.calls.lock().unwrap().len(), 2);
    }
}
