//! Test doubles for the coordinator's seams.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use atoll_config::TopologyConfig;
use atoll_ring::{LocalRing, ReplicationStage, RingMutation, TokenMetadata, TokenStatus};
use atoll_rpc::{ClusterView, RpcMessage, Transport};
use atoll_store::InMemoryStore;
use atoll_types::{HostId, TableId, Token, TxId};

use crate::coordinator::{Coordinator, Environment};
use crate::traits::{
    CatalogError, Clock, DataStreamer, IdSource, RingStore, StreamingError, TableCatalog,
    TokenAllocator,
};

pub fn host(n: u128) -> HostId {
    HostId::from(Uuid::from_u128(0x0100 + n))
}

pub fn table(n: u128) -> TableId {
    TableId::from(Uuid::from_u128(0x0200 + n))
}

/// A node's ring table, recording every stage it observes.
pub struct SharedRing {
    state: Mutex<LocalRing>,
    stages: Mutex<Vec<ReplicationStage>>,
}

impl SharedRing {
    fn new(initial: TokenMetadata) -> Self {
        let mut state = LocalRing::new();
        // Seed the initial ring below any transaction stamp.
        state.apply(&RingMutation::install(initial, atoll_types::Timestamp::ZERO.next()));
        Self {
            state: Mutex::new(state),
            stages: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> TokenMetadata {
        self.state.lock().unwrap().ring().clone()
    }

    pub fn observed_stages(&self) -> Vec<ReplicationStage> {
        self.stages.lock().unwrap().clone()
    }
}

impl RingStore for SharedRing {
    fn local_ring(&self) -> TokenMetadata {
        self.snapshot()
    }

    fn apply(&self, mutation: &RingMutation) -> bool {
        let mut state = self.state.lock().unwrap();
        let before = state.stage();
        let applied = state.apply(mutation);
        if applied && state.stage() != before {
            self.stages.lock().unwrap().push(state.stage());
        }
        applied
    }
}

/// Transport that applies ring mutations to registered rings and records
/// admission messages. Hosts in the deny set fail their calls.
pub struct FanoutTransport {
    rings: Mutex<BTreeMap<HostId, Arc<SharedRing>>>,
    admissions: Mutex<Vec<(HostId, RpcMessage)>>,
    deny: Mutex<BTreeSet<HostId>>,
}

impl FanoutTransport {
    fn new() -> Self {
        Self {
            rings: Mutex::new(BTreeMap::new()),
            admissions: Mutex::new(Vec::new()),
            deny: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn deny(&self, host: HostId) {
        self.deny.lock().unwrap().insert(host);
    }

    pub fn allow(&self, host: HostId) {
        self.deny.lock().unwrap().remove(&host);
    }

    pub fn admissions(&self) -> Vec<(HostId, RpcMessage)> {
        self.admissions.lock().unwrap().clone()
    }
}

impl Transport for FanoutTransport {
    fn call(&self, host: HostId, msg: RpcMessage) -> atoll_rpc::Result<()> {
        if self.deny.lock().unwrap().contains(&host) {
            return Err(atoll_rpc::Error::CallFailed {
                host,
                reason: "injected failure".to_string(),
            });
        }
        match msg {
            RpcMessage::ReplicateRing(mutation) => {
                if let Some(ring) = self.rings.lock().unwrap().get(&host) {
                    ring.apply(&mutation);
                }
                Ok(())
            }
            other => {
                self.admissions.lock().unwrap().push((host, other));
                Ok(())
            }
        }
    }
}

/// Static membership oracles with a mutable dead set.
pub struct TestCluster {
    local: HostId,
    seed: HostId,
    dead: Mutex<BTreeSet<HostId>>,
}

impl TestCluster {
    pub fn mark_dead(&self, host: HostId) {
        self.dead.lock().unwrap().insert(host);
    }
}

impl ClusterView for TestCluster {
    fn dead(&self) -> BTreeSet<HostId> {
        self.dead.lock().unwrap().clone()
    }

    fn seed(&self) -> HostId {
        self.seed
    }

    fn local_host(&self) -> HostId {
        self.local
    }
}

/// Fixed table set.
pub struct TestCatalog {
    tables: BTreeSet<TableId>,
}

impl TableCatalog for TestCatalog {
    fn all_tables(&self) -> Result<BTreeSet<TableId>, CatalogError> {
        Ok(self.tables.clone())
    }
}

/// Records stream/stop calls; optionally fails the next stream.
#[derive(Default)]
pub struct TestStreamer {
    pub streamed: Mutex<Vec<(TxId, BTreeSet<TableId>)>>,
    pub stopped: Mutex<Vec<TxId>>,
    fail_next: AtomicBool,
}

impl TestStreamer {
    pub fn fail_next_stream(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl DataStreamer for TestStreamer {
    fn stream(&self, tx: TxId, tables: &BTreeSet<TableId>) -> Result<(), StreamingError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StreamingError("injected stream failure".to_string()));
        }
        self.streamed.lock().unwrap().push((tx, tables.clone()));
        Ok(())
    }

    fn stop(&self, tx: TxId) -> Result<(), StreamingError> {
        self.stopped.lock().unwrap().push(tx);
        Ok(())
    }
}

/// Hands out disjoint token pairs.
pub struct SeqTokens {
    next: AtomicU64,
}

impl TokenAllocator for SeqTokens {
    fn choose_tokens(&self, _ring: &TokenMetadata) -> BTreeSet<Token> {
        let base = self.next.fetch_add(2, Ordering::SeqCst) as i64;
        BTreeSet::from([Token::new(base), Token::new(base + 1)])
    }
}

/// Clock that only counts sleeps.
#[derive(Default)]
pub struct InstantClock {
    pub sleeps: AtomicU64,
}

impl Clock for InstantClock {
    fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

/// Deterministic identity source.
pub struct SeqIds {
    next: AtomicU64,
}

impl IdSource for SeqIds {
    fn new_uuid(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Uuid::from_u128(0xA000_0000 + u128::from(n))
    }
}

/// A single-store world with one ring table per member host.
pub struct TestWorld {
    pub store: Arc<InMemoryStore>,
    pub transport: Arc<FanoutTransport>,
    pub cluster: Arc<TestCluster>,
    pub rings: BTreeMap<HostId, Arc<SharedRing>>,
    pub catalog: Arc<TestCatalog>,
    pub streamer: Arc<TestStreamer>,
    pub tokens: Arc<SeqTokens>,
    pub clock: Arc<InstantClock>,
    pub ids: Arc<SeqIds>,
}

impl TestWorld {
    /// Members get two `Normal` tokens each; `local` is the admitting node
    /// and the seed.
    pub fn new(members: &[HostId], local: HostId) -> Self {
        let mut initial = TokenMetadata::new();
        for (i, member) in members.iter().enumerate() {
            let base = 1_000 * (i as i64 + 1);
            initial = initial.with_tokens(
                *member,
                [Token::new(base), Token::new(base + 1)],
                TokenStatus::Normal,
            );
        }

        let transport = Arc::new(FanoutTransport::new());
        let mut rings = BTreeMap::new();
        for member in members {
            let ring = Arc::new(SharedRing::new(initial.clone()));
            rings.insert(*member, Arc::clone(&ring));
            transport.rings.lock().unwrap().insert(*member, ring);
        }

        Self {
            store: Arc::new(InMemoryStore::new()),
            transport,
            cluster: Arc::new(TestCluster {
                local,
                seed: local,
                dead: Mutex::new(BTreeSet::new()),
            }),
            rings,
            catalog: Arc::new(TestCatalog {
                tables: BTreeSet::from([table(1), table(2)]),
            }),
            streamer: Arc::new(TestStreamer::default()),
            tokens: Arc::new(SeqTokens {
                next: AtomicU64::new(1),
            }),
            clock: Arc::new(InstantClock::default()),
            ids: Arc::new(SeqIds {
                next: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a joining host's (initially empty) ring table so fanout
    /// can reach it.
    pub fn add_ring(&mut self, host: HostId) -> Arc<SharedRing> {
        let ring = Arc::new(SharedRing::new(TokenMetadata::new()));
        self.rings.insert(host, Arc::clone(&ring));
        self.transport.rings.lock().unwrap().insert(host, Arc::clone(&ring));
        ring
    }

    pub fn coordinator(&self) -> Coordinator {
        self.coordinator_with(TopologyConfig::default())
    }

    pub fn coordinator_with(&self, config: TopologyConfig) -> Coordinator {
        let local = self.cluster.local_host();
        let env = Environment {
            store: self.store.clone() as Arc<dyn atoll_store::LinearizableStore>,
            transport: self.transport.clone(),
            cluster: self.cluster.clone(),
            ring: Arc::clone(&self.rings[&local]) as Arc<dyn RingStore>,
            catalog: self.catalog.clone(),
            streamer: self.streamer.clone(),
            tokens: self.tokens.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
        };
        Coordinator::new(env, config)
    }
}
