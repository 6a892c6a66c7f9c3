//! The simulated cluster and its component doubles.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use atoll_config::TopologyConfig;
use atoll_ring::{LocalRing, ReplicationStage, RingMutation, TokenMetadata, TokenStatus};
use atoll_rpc::{ClusterView, RpcMessage, Transport};
use atoll_store::InMemoryStore;
use atoll_topology::traits::{
    CatalogError, Clock, DataStreamer, IdSource, RingStore, StreamingError, TableCatalog,
    TokenAllocator,
};
use atoll_topology::{Coordinator, Environment};
use atoll_types::{HostId, TableId, Timestamp, Token, TxId};

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Seed for host identities, transaction ids, and token selection.
    pub seed: u64,

    /// Coordinator tunables used by every node.
    pub topology: TopologyConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            topology: TopologyConfig {
                // Virtual clock: back-off costs nothing, bound it tightly so
                // a scripted deadlock fails fast instead of spinning.
                lock_retry_interval_ms: 100,
                lock_retry_limit: 16,
            },
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

// ============================================================================
// Component doubles
// ============================================================================

/// A node's token-metadata table, with the stages it observed.
struct NodeRing {
    state: Mutex<LocalRing>,
    stages: Mutex<Vec<ReplicationStage>>,
}

impl NodeRing {
    fn new(initial: TokenMetadata) -> Self {
        let mut state = LocalRing::new();
        state.apply(&RingMutation::install(initial, Timestamp::ZERO.next()));
        Self {
            state: Mutex::new(state),
            stages: Mutex::new(Vec::new()),
        }
    }
}

impl RingStore for NodeRing {
    fn local_ring(&self) -> TokenMetadata {
        self.state.lock().expect("ring poisoned").ring().clone()
    }

    fn apply(&self, mutation: &RingMutation) -> bool {
        let mut state = self.state.lock().expect("ring poisoned");
        let before = state.stage();
        let applied = state.apply(mutation);
        if applied && state.stage() != before {
            self.stages.lock().expect("ring poisoned").push(state.stage());
        }
        applied
    }
}

/// Routes every message to the destination node's handler; partitioned
/// hosts fail their calls.
struct SimTransport {
    nodes: Mutex<BTreeMap<HostId, Arc<SimNode>>>,
    partitioned: Mutex<BTreeSet<HostId>>,
}

impl Transport for SimTransport {
    fn call(&self, host: HostId, msg: RpcMessage) -> atoll_rpc::Result<()> {
        if self.partitioned.lock().expect("transport poisoned").contains(&host) {
            return Err(atoll_rpc::Error::CallFailed {
                host,
                reason: "partitioned".to_string(),
            });
        }
        let node = self
            .nodes
            .lock()
            .expect("transport poisoned")
            .get(&host)
            .cloned();
        let Some(node) = node else {
            return Err(atoll_rpc::Error::CallFailed {
                host,
                reason: "unknown host".to_string(),
            });
        };
        node.coordinator
            .handle_message(msg)
            .map_err(|err| atoll_rpc::Error::CallFailed {
                host,
                reason: err.to_string(),
            })
    }
}

/// Per-node membership view over shared cluster state.
struct SimMembership {
    local: HostId,
    seed: HostId,
    dead: Arc<Mutex<BTreeSet<HostId>>>,
}

impl ClusterView for SimMembership {
    fn dead(&self) -> BTreeSet<HostId> {
        self.dead.lock().expect("membership poisoned").clone()
    }

    fn seed(&self) -> HostId {
        self.seed
    }

    fn local_host(&self) -> HostId {
        self.local
    }
}

/// Shared table catalog; tables can appear mid-scenario.
struct SimCatalog {
    tables: Mutex<BTreeSet<TableId>>,
}

impl TableCatalog for SimCatalog {
    fn all_tables(&self) -> Result<BTreeSet<TableId>, CatalogError> {
        Ok(self.tables.lock().expect("catalog poisoned").clone())
    }
}

/// Records streaming activity; can fail the next stream on request.
#[derive(Default)]
pub struct SimStreamer {
    streams: Mutex<Vec<(TxId, BTreeSet<TableId>)>>,
    stops: Mutex<Vec<TxId>>,
    fail_next: AtomicBool,
}

impl SimStreamer {
    /// Completed stream passes, in order.
    pub fn streams(&self) -> Vec<(TxId, BTreeSet<TableId>)> {
        self.streams.lock().expect("streamer poisoned").clone()
    }

    /// Stop requests, in order.
    pub fn stops(&self) -> Vec<TxId> {
        self.stops.lock().expect("streamer poisoned").clone()
    }

    /// Makes the next stream pass fail.
    pub fn fail_next_stream(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl DataStreamer for SimStreamer {
    fn stream(&self, tx: TxId, tables: &BTreeSet<TableId>) -> Result<(), StreamingError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StreamingError("simulated stream failure".to_string()));
        }
        self.streams
            .lock()
            .expect("streamer poisoned")
            .push((tx, tables.clone()));
        Ok(())
    }

    fn stop(&self, tx: TxId) -> Result<(), StreamingError> {
        self.stops.lock().expect("streamer poisoned").push(tx);
        Ok(())
    }
}

/// Seeded token selection; never reuses a token already on the ring.
struct SimTokens {
    rng: Mutex<ChaCha8Rng>,
}

impl TokenAllocator for SimTokens {
    fn choose_tokens(&self, ring: &TokenMetadata) -> BTreeSet<Token> {
        let mut rng = self.rng.lock().expect("allocator poisoned");
        let taken: BTreeSet<Token> = ring
            .members()
            .into_iter()
            .flat_map(|host| ring.tokens_of(host))
            .collect();
        let mut chosen = BTreeSet::new();
        while chosen.len() < 2 {
            let token = Token::new(rng.gen_range(-1_000_000..1_000_000));
            if !taken.contains(&token) {
                chosen.insert(token);
            }
        }
        chosen
    }
}

/// Virtual clock: sleeping advances simulated time instantly.
#[derive(Default)]
struct SimClock {
    now_ms: AtomicU64,
}

impl Clock for SimClock {
    fn sleep(&self, duration: Duration) {
        self.now_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

/// Seeded identity source shared by all nodes.
struct SimIds {
    rng: Mutex<ChaCha8Rng>,
}

impl IdSource for SimIds {
    fn new_uuid(&self) -> Uuid {
        Uuid::from_u128(self.rng.lock().expect("ids poisoned").r#gen())
    }
}

// ============================================================================
// Cluster
// ============================================================================

/// One simulated node: its identity, ring table, and coordinator.
pub struct SimNode {
    pub host: HostId,
    pub coordinator: Coordinator,
    ring: Arc<NodeRing>,
}

impl SimNode {
    /// The node's current ring view.
    pub fn ring(&self) -> TokenMetadata {
        self.ring.local_ring()
    }

    /// Replication stages this node observed, in arrival order.
    pub fn observed_stages(&self) -> Vec<ReplicationStage> {
        self.ring.stages.lock().expect("ring poisoned").clone()
    }
}

/// A deterministic in-process cluster.
pub struct SimCluster {
    config: SimConfig,
    store: Arc<InMemoryStore>,
    transport: Arc<SimTransport>,
    dead: Arc<Mutex<BTreeSet<HostId>>>,
    catalog: Arc<SimCatalog>,
    streamer: Arc<SimStreamer>,
    tokens: Arc<SimTokens>,
    clock: Arc<SimClock>,
    ids: Arc<SimIds>,
    hosts: Vec<HostId>,
    seed_host: HostId,
}

impl SimCluster {
    /// Builds a cluster of `nodes` members, each holding seeded tokens in
    /// everyone's initial ring. The first host is the seed node.
    pub fn new(nodes: usize, config: SimConfig) -> Self {
        assert!(nodes >= 1, "a cluster needs at least one node");

        let mut id_rng = ChaCha8Rng::seed_from_u64(config.seed);
        let hosts: Vec<HostId> = (0..nodes)
            .map(|_| HostId::from(Uuid::from_u128(id_rng.r#gen())))
            .collect();
        let seed_host = hosts[0];

        let tokens = Arc::new(SimTokens {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(1))),
        });
        let mut initial = TokenMetadata::new();
        for host in &hosts {
            let chosen = tokens.choose_tokens(&initial);
            initial = initial.with_tokens(*host, chosen, TokenStatus::Normal);
        }

        let cluster = Self {
            store: Arc::new(InMemoryStore::new()),
            transport: Arc::new(SimTransport {
                nodes: Mutex::new(BTreeMap::new()),
                partitioned: Mutex::new(BTreeSet::new()),
            }),
            dead: Arc::new(Mutex::new(BTreeSet::new())),
            catalog: Arc::new(SimCatalog {
                tables: Mutex::new(BTreeSet::new()),
            }),
            streamer: Arc::new(SimStreamer::default()),
            tokens,
            clock: Arc::new(SimClock::default()),
            ids: Arc::new(SimIds {
                rng: Mutex::new(ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(2))),
            }),
            hosts: hosts.clone(),
            seed_host,
            config,
        };

        for host in &hosts {
            cluster.spawn(*host, initial.clone());
        }
        cluster.create_table();
        cluster
    }

    fn spawn(&self, host: HostId, initial: TokenMetadata) {
        let ring = Arc::new(NodeRing::new(initial));
        let env = Environment {
            store: self.store.clone() as Arc<dyn atoll_store::LinearizableStore>,
            transport: self.transport.clone(),
            cluster: Arc::new(SimMembership {
                local: host,
                seed: self.seed_host,
                dead: Arc::clone(&self.dead),
            }),
            ring: Arc::clone(&ring) as Arc<dyn RingStore>,
            catalog: self.catalog.clone(),
            streamer: self.streamer.clone(),
            tokens: self.tokens.clone(),
            clock: self.clock.clone(),
            ids: self.ids.clone(),
        };
        let node = Arc::new(SimNode {
            host,
            coordinator: Coordinator::new(env, self.config.topology.clone()),
            ring,
        });
        self.transport
            .nodes
            .lock()
            .expect("transport poisoned")
            .insert(host, node);
    }

    /// Spawns a fresh node outside the ring (a joining host).
    pub fn add_node(&mut self) -> HostId {
        let host = HostId::from(Uuid::from_u128(
            self.ids.rng.lock().expect("ids poisoned").r#gen(),
        ));
        self.spawn(host, TokenMetadata::new());
        self.hosts.push(host);
        host
    }

    /// Member hosts in creation order; index 0 is the seed.
    pub fn hosts(&self) -> &[HostId] {
        &self.hosts
    }

    pub fn node(&self, host: HostId) -> Arc<SimNode> {
        self.transport
            .nodes
            .lock()
            .expect("transport poisoned")
            .get(&host)
            .cloned()
            .expect("unknown host")
    }

    /// The ring as `host` currently sees it.
    pub fn ring(&self, host: HostId) -> TokenMetadata {
        self.node(host).ring()
    }

    /// Marks a host permanently dead: it never executes a message again.
    pub fn mark_dead(&self, host: HostId) {
        self.dead.lock().expect("cluster poisoned").insert(host);
        self.transport
            .partitioned
            .lock()
            .expect("transport poisoned")
            .insert(host);
    }

    /// Cuts a host off the network (calls to it fail).
    pub fn partition(&self, host: HostId) {
        self.transport
            .partitioned
            .lock()
            .expect("transport poisoned")
            .insert(host);
    }

    /// Reconnects a partitioned host.
    pub fn heal(&self, host: HostId) {
        self.transport
            .partitioned
            .lock()
            .expect("transport poisoned")
            .remove(&host);
    }

    /// Creates a new table in the shared catalog.
    pub fn create_table(&self) -> TableId {
        let table = TableId::from(Uuid::from_u128(
            self.ids.rng.lock().expect("ids poisoned").r#gen(),
        ));
        self.catalog
            .tables
            .lock()
            .expect("catalog poisoned")
            .insert(table);
        table
    }

    /// The current table set.
    pub fn tables(&self) -> BTreeSet<TableId> {
        self.catalog.tables.lock().expect("catalog poisoned").clone()
    }

    /// The shared streaming double.
    pub fn streamer(&self) -> &SimStreamer {
        &self.streamer
    }
}
