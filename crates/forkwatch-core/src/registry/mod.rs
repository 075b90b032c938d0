//! Per-node state registry with single-writer-per-entry discipline.
//!
//! The registry holds one entry per configured node for the life of the
//! process. Mutation rights to an entry are handed out exactly once, as a
//! [`NodeWriter`] claimed by that node's connection task at startup; every
//! other component (the fork detector, the HTTP snapshot layer) reads through
//! [`NodeRegistry::observe`] or [`NodeRegistry::snapshot`].
//!
//! Because each entry has a single writer, no cross-task locking protocol is
//! needed: the per-entry lock is held only for field-level reads and writes,
//! never across an await point. Readers may observe one node's entry mid-way
//! through another node's update burst; the fork detector tolerates that and
//! converges because it is re-run on every accepted momentum.

use parking_lot::RwLock;
use serde::Serialize;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tracing::debug;

/// Number of recent momentums retained per node.
pub const MOMENTUM_WINDOW: usize = 5;

/// Returns the current unix timestamp in seconds.
fn current_unix_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// One ledger unit reported by a node.
///
/// Immutable once recorded, except for the staleness marker which flips to
/// `true` when the reporting node disconnects. Stale entries are retained for
/// display ("last known, possibly outdated") rather than deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Momentum {
    pub height: u64,
    pub hash: String,
    /// Unix timestamp (seconds) at which this momentum was accepted.
    #[serde(rename = "timestamp")]
    pub observed_at: u64,
    pub is_stale: bool,
}

/// Mutable per-node record. Only ever touched through the entry lock.
#[derive(Debug)]
struct NodeState {
    subscription_id: Option<String>,
    last_height: Option<u64>,
    last_hash: Option<String>,
    is_connected: bool,
    last_message_at: Instant,
    recent_momentums: VecDeque<Momentum>,
}

impl NodeState {
    fn new() -> Self {
        Self {
            subscription_id: None,
            last_height: None,
            last_hash: None,
            is_connected: false,
            last_message_at: Instant::now(),
            recent_momentums: VecDeque::with_capacity(MOMENTUM_WINDOW),
        }
    }
}

#[derive(Debug)]
struct NodeEntry {
    state: RwLock<NodeState>,
    claimed: AtomicBool,
}

/// Read-only view of one node used by the fork detector.
#[derive(Debug, Clone)]
pub struct NodeObservation {
    pub name: Arc<str>,
    pub is_connected: bool,
    pub last_height: Option<u64>,
    pub last_hash: Option<String>,
}

/// Read-only projection of one node served by the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub is_connected: bool,
    pub momentums: Vec<Momentum>,
}

/// Registry of all configured nodes.
///
/// Built once at startup from the configured node names; entries are never
/// added or removed afterwards, only reset in place on reconnection.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: BTreeMap<Arc<str>, Arc<NodeEntry>>,
}

impl NodeRegistry {
    /// Creates a registry with one disconnected entry per node name.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let nodes = names
            .into_iter()
            .map(|name| {
                let name: Arc<str> = Arc::from(name.as_ref());
                let entry = Arc::new(NodeEntry {
                    state: RwLock::new(NodeState::new()),
                    claimed: AtomicBool::new(false),
                });
                (name, entry)
            })
            .collect();
        Self { nodes }
    }

    /// Returns the number of configured nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the configured node names in deterministic order.
    #[must_use]
    pub fn node_names(&self) -> Vec<Arc<str>> {
        self.nodes.keys().cloned().collect()
    }

    /// Claims exclusive write access to a node's entry.
    ///
    /// Succeeds at most once per node; subsequent calls (and calls for
    /// unknown names) return `None`. This is what enforces the
    /// single-writer-per-entry discipline by construction.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<NodeWriter> {
        let (name, entry) = self.nodes.get_key_value(name)?;
        if entry.claimed.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(NodeWriter { name: name.clone(), entry: entry.clone() })
    }

    /// Produces the detector's view: connectivity and last accepted
    /// height/hash per node, in deterministic name order.
    ///
    /// Each entry is read independently under a short read lock; the detector
    /// tolerates observing nodes at slightly different instants.
    #[must_use]
    pub fn observe(&self) -> Vec<NodeObservation> {
        self.nodes
            .iter()
            .map(|(name, entry)| {
                let state = entry.state.read();
                NodeObservation {
                    name: name.clone(),
                    is_connected: state.is_connected,
                    last_height: state.last_height,
                    last_hash: state.last_hash.clone(),
                }
            })
            .collect()
    }

    /// Produces the HTTP layer's view: connectivity plus the retained
    /// momentum window per node.
    ///
    /// Reads only in-memory state; never blocks on network I/O.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, NodeSnapshot> {
        self.nodes
            .iter()
            .map(|(name, entry)| {
                let state = entry.state.read();
                let snapshot = NodeSnapshot {
                    is_connected: state.is_connected,
                    momentums: state.recent_momentums.iter().cloned().collect(),
                };
                (name.to_string(), snapshot)
            })
            .collect()
    }
}

/// Exclusive write handle for one node's registry entry.
///
/// Handed to the node's connection task at startup via
/// [`NodeRegistry::claim`]; all registry mutations flow through this type.
#[derive(Debug)]
pub struct NodeWriter {
    name: Arc<str>,
    entry: Arc<NodeEntry>,
}

impl NodeWriter {
    /// Returns the node name this writer is bound to.
    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.entry.state.read().is_connected
    }

    /// Returns the time elapsed since the node last produced any traffic.
    #[must_use]
    pub fn last_message_age(&self) -> Duration {
        self.entry.state.read().last_message_at.elapsed()
    }

    /// Records a successful subscription: stores the token, flips the node to
    /// connected, and stamps the liveness clock.
    ///
    /// This is the only path that sets `is_connected`, which is what upholds
    /// the invariant that a connected node always has a subscription id.
    pub fn mark_connected(&self, subscription_id: String) {
        let mut state = self.entry.state.write();
        state.subscription_id = Some(subscription_id);
        state.is_connected = true;
        state.last_message_at = Instant::now();
    }

    /// Stamps the liveness clock. Any inbound traffic counts, not only
    /// momentum payloads.
    pub fn touch(&self) {
        self.entry.state.write().last_message_at = Instant::now();
    }

    /// Records an accepted momentum: updates `last_height`/`last_hash` and
    /// appends to the bounded window, evicting the oldest entry past
    /// [`MOMENTUM_WINDOW`].
    pub fn accept_momentum(&self, height: u64, hash: &str) {
        let mut state = self.entry.state.write();
        state.last_height = Some(height);
        state.last_hash = Some(hash.to_string());
        state.recent_momentums.push_back(Momentum {
            height,
            hash: hash.to_string(),
            observed_at: current_unix_timestamp(),
            is_stale: false,
        });
        while state.recent_momentums.len() > MOMENTUM_WINDOW {
            state.recent_momentums.pop_front();
        }
    }

    /// Shared disconnection routine: clears the subscription, flips the node
    /// to disconnected, and marks every retained momentum stale.
    ///
    /// `last_height`/`last_hash` are left in place — they reflect the most
    /// recently accepted momentum regardless of staleness. Idempotent.
    pub fn mark_disconnected(&self) {
        let mut state = self.entry.state.write();
        if state.is_connected {
            debug!(node = %self.name, "registry entry reset to disconnected");
        }
        state.is_connected = false;
        state.subscription_id = None;
        for momentum in &mut state.recent_momentums {
            momentum.is_stale = true;
        }
    }
}
