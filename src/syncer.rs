//! src/syncer.rs
//!
//! The syncer: the bidirectional bridge between `NetworkMap`'s semantic
//! operations and the gossip engine's flat key/value state-per-node model
//! (§4.3). It is a stateless adapter beyond its reference to the network
//! map and a small pending-node buffer.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::gossip::{GossipCallbacks, Gossiper};
use crate::network_map::{ChangeKind, NetworkMap, Unsubscribe};
use crate::node::{Node, Status};

/// Partial state accumulated for a remote id that has not yet been
/// promoted into the visible network map (§4.3, §9). Has no TTL of its
/// own; it relies on `OnExpired`/`OnLeave` to bound its size.
#[derive(Default, Clone, Debug)]
struct PendingNode {
    proxy_addr: Option<String>,
    admin_addr: Option<String>,
    status: Option<Status>,
    endpoints: HashMap<String, u32>,
}

impl PendingNode {
    fn is_promotable(&self) -> bool {
        self.proxy_addr.is_some() && self.admin_addr.is_some()
    }

    fn into_node(self, id: &str) -> Node {
        Node {
            id: id.to_string(),
            status: self.status.unwrap_or(Status::Active),
            proxy_addr: self.proxy_addr.unwrap_or_default(),
            admin_addr: self.admin_addr.unwrap_or_default(),
            endpoints: self.endpoints,
        }
    }
}

const ENDPOINT_KEY_PREFIX: &str = "endpoint:";

fn endpoint_key(endpoint: &str) -> String {
    format!("{ENDPOINT_KEY_PREFIX}{endpoint}")
}

fn parse_endpoint_key(key: &str) -> Option<&str> {
    key.strip_prefix(ENDPOINT_KEY_PREFIX)
}

/// The syncer (§4.3). Construct one per network map, then:
///
/// 1. call [`Syncer::seed`] once at startup to publish the local node's
///    initial gossip state,
/// 2. call [`Syncer::start`] to begin mirroring further local changes
///    outward, and
/// 3. register the syncer itself (it implements [`GossipCallbacks`]) with
///    the gossip engine to receive inbound callbacks.
pub struct Syncer<G: Gossiper> {
    map: NetworkMap,
    gossiper: G,
    pending: Mutex<HashMap<String, PendingNode>>,
}

impl<G: Gossiper> Syncer<G> {
    pub fn new(map: NetworkMap, gossiper: G) -> Self {
        Self {
            map,
            gossiper,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn local_id(&self) -> String {
        self.map.local_node().id
    }

    /// Access to the underlying gossip engine handle, e.g. so a caller can
    /// drive its lifecycle (see `Bootstrapper::shutdown`).
    pub fn gossiper(&self) -> &G {
        &self.gossiper
    }

    /// One-shot seeding of the local node's current state to the gossip
    /// engine (§4.3 step 1). Emits `proxy_addr`, `admin_addr`, then one
    /// `endpoint:<id>` key per local endpoint (sorted for determinism),
    /// matching the concrete scenario in §8.1. Per the open question in
    /// §9, `status` is seeded only if the local node's status is not the
    /// default — in practice the bootstrapper calls `SetLocalStatus`
    /// explicitly when it wants a non-default status advertised, and that
    /// call is mirrored by [`Syncer::start`]'s live subscription rather
    /// than by this one-shot seed.
    pub fn seed(&self) {
        let local = self.map.local_node();
        if !local.proxy_addr.is_empty() {
            self.gossiper.upsert_local("proxy_addr", &local.proxy_addr);
        }
        if !local.admin_addr.is_empty() {
            self.gossiper.upsert_local("admin_addr", &local.admin_addr);
        }
        let mut endpoints: Vec<_> = local.endpoints.into_iter().collect();
        endpoints.sort_by(|a, b| a.0.cmp(&b.0));
        for (endpoint, count) in endpoints {
            self.gossiper.upsert_local(&endpoint_key(&endpoint), &count.to_string());
        }
    }

    /// Subscribes to the network map and mirrors further local-node
    /// changes to the gossip engine (§4.3 step 2, outbound table). Returns
    /// a handle; dropping it stops the mirroring.
    pub fn start(self: &std::sync::Arc<Self>) -> Unsubscribe
    where
        G: 'static,
    {
        let this = self.clone();
        self.map.subscribe(move |event| {
            if !event.is_local {
                return;
            }
            match &event.kind {
                ChangeKind::EndpointSet { endpoint, count } => {
                    this.gossiper.upsert_local(&endpoint_key(endpoint), &count.to_string());
                }
                ChangeKind::EndpointRemoved { endpoint } => {
                    this.gossiper.delete_local(&endpoint_key(endpoint));
                }
                ChangeKind::StatusChanged(status) => {
                    if let Some(wire) = status.as_wire_str() {
                        this.gossiper.upsert_local("status", wire);
                    }
                }
                ChangeKind::ProxyAddrSet(addr) => {
                    this.gossiper.upsert_local("proxy_addr", addr);
                }
                ChangeKind::AdminAddrSet(addr) => {
                    this.gossiper.upsert_local("admin_addr", addr);
                }
                ChangeKind::Upserted | ChangeKind::Removed => {
                    // The local node is never wholesale-upserted or removed
                    // through this path; nothing to mirror.
                }
            }
        })
    }
}

impl<G: Gossiper + 'static> GossipCallbacks for std::sync::Arc<Syncer<G>> {
    fn on_join(&self, id: &str) {
        if id == self.local_id() {
            tracing::trace!(node_id = id, "on_join no-op: echo of local id");
            return;
        }
        // A redelivered `OnJoin` (§4.4 allows duplicates) must not clobber
        // state already accumulated for `id`, and must not plant a stray
        // pending entry for an id that has already been promoted — that
        // would make a later leave/down/expired mistake the redelivery for
        // a fresh join and discard it as pending instead of updating the
        // now-visible node.
        if self.map.node(id).is_some() {
            tracing::trace!(node_id = id, "on_join no-op: already visible");
            return;
        }
        tracing::debug!(node_id = id, "remote join observed");
        self.pending
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_insert_with(PendingNode::default);
    }

    fn on_upsert_key(&self, id: &str, key: &str, value: &str) {
        if id == self.local_id() {
            tracing::trace!(node_id = id, key, "on_upsert_key no-op: echo of local id");
            return;
        }

        // Already visible: apply directly via the granular admin API.
        if self.map.node(id).is_some() {
            self.apply_key_to_visible(id, key, value);
            return;
        }

        // Not visible yet: fold into the pending buffer if one exists
        // (created by a prior `on_join`); otherwise this is an unexpected
        // key for an unknown id and is ignored (§4.3 edge cases).
        let mut pending = self.pending.lock().unwrap();
        let Some(entry) = pending.get_mut(id) else {
            tracing::trace!(node_id = id, key, "on_upsert_key no-op: unknown, non-pending id");
            return;
        };

        if !apply_key_to_pending(entry, key, value) {
            return;
        }

        if entry.is_promotable() {
            let node = pending.remove(id).unwrap().into_node(id);
            drop(pending);
            tracing::info!(node_id = id, status = %node.status, "promoting pending remote node");
            self.map.upsert_node(node);
        }
    }

    fn on_delete_key(&self, id: &str, key: &str) {
        if id == self.local_id() {
            tracing::trace!(node_id = id, key, "on_delete_key no-op: echo of local id");
            return;
        }

        if self.map.node(id).is_some() {
            if let Some(endpoint) = parse_endpoint_key(key) {
                self.map.remove_remote_endpoint(id, endpoint);
            } else {
                tracing::trace!(node_id = id, key, "on_delete_key no-op: non-endpoint key on visible node");
            }
            return;
        }

        let mut pending = self.pending.lock().unwrap();
        if let Some(entry) = pending.get_mut(id) {
            match key {
                "proxy_addr" => entry.proxy_addr = None,
                "admin_addr" => entry.admin_addr = None,
                "status" => entry.status = None,
                _ => {
                    if let Some(endpoint) = parse_endpoint_key(key) {
                        entry.endpoints.remove(endpoint);
                    }
                }
            }
        }
    }

    fn on_leave(&self, id: &str) {
        if id == self.local_id() {
            tracing::trace!(node_id = id, "on_leave no-op: echo of local id");
            return;
        }
        if self.pending.lock().unwrap().remove(id).is_some() {
            tracing::debug!(node_id = id, "pending node discarded on leave");
            return;
        }
        self.map.update_remote_status(id, Status::Left);
    }

    fn on_down(&self, id: &str) {
        if id == self.local_id() {
            tracing::trace!(node_id = id, "on_down no-op: echo of local id");
            return;
        }
        if self.pending.lock().unwrap().remove(id).is_some() {
            tracing::debug!(node_id = id, "pending node discarded on down");
            return;
        }
        self.map.update_remote_status(id, Status::Down);
    }

    fn on_healthy(&self, id: &str) {
        if id == self.local_id() {
            tracing::trace!(node_id = id, "on_healthy no-op: echo of local id");
            return;
        }
        // Not in the pending transition table (§4.3) — a pending node has
        // no status to restore, so a stray `OnHealthy` for one is ignored.
        if self.pending.lock().unwrap().contains_key(id) {
            tracing::trace!(node_id = id, "on_healthy no-op: still pending");
            return;
        }
        self.map.update_remote_status(id, Status::Active);
    }

    fn on_expired(&self, id: &str) {
        if id == self.local_id() {
            tracing::trace!(node_id = id, "on_expired no-op: echo of local id");
            return;
        }
        if self.pending.lock().unwrap().remove(id).is_some() {
            tracing::debug!(node_id = id, "pending node discarded on expiry");
            return;
        }
        self.map.remove_node(id);
    }
}

impl<G: Gossiper> Syncer<G> {
    fn apply_key_to_visible(&self, id: &str, key: &str, value: &str) {
        match key {
            "proxy_addr" => {
                if let Some(mut node) = self.map.node(id) {
                    node.proxy_addr = value.to_string();
                    self.map.upsert_node(node);
                }
            }
            "admin_addr" => {
                if let Some(mut node) = self.map.node(id) {
                    node.admin_addr = value.to_string();
                    self.map.upsert_node(node);
                }
            }
            "status" => match value.parse::<Status>() {
                Ok(status) => self.map.update_remote_status(id, status),
                Err(_) => {
                    tracing::warn!(node_id = id, key, value, "malformed status value; ignoring key");
                }
            },
            _ => {
                if let Some(endpoint) = parse_endpoint_key(key) {
                    match value.parse::<u32>() {
                        Ok(count) if count >= 1 => {
                            self.map.update_remote_endpoint(id, endpoint, count);
                        }
                        Ok(_) => {
                            tracing::warn!(node_id = id, key, value, "zero endpoint count; ignoring key");
                        }
                        Err(_) => {
                            tracing::warn!(node_id = id, key, value, "malformed endpoint count; ignoring key");
                        }
                    }
                }
                // Unknown keys are ignored silently for forward
                // compatibility (§4.3); no log, unlike malformed values.
            }
        }
    }
}

/// Applies one key/value pair to a pending builder. Returns `false` if the
/// value was malformed (and thus ignored) so the caller can skip a
/// pointless promotability check.
fn apply_key_to_pending(entry: &mut PendingNode, key: &str, value: &str) -> bool {
    match key {
        "proxy_addr" => {
            entry.proxy_addr = Some(value.to_string());
            true
        }
        "admin_addr" => {
            entry.admin_addr = Some(value.to_string());
            true
        }
        "status" => match value.parse::<Status>() {
            Ok(status) => {
                entry.status = Some(status);
                true
            }
            Err(_) => {
                tracing::warn!(key, value, "malformed status value; ignoring key");
                false
            }
        },
        _ => {
            if let Some(endpoint) = parse_endpoint_key(key) {
                match value.parse::<u32>() {
                    Ok(count) if count >= 1 => {
                        entry.endpoints.insert(endpoint.to_string(), count);
                        true
                    }
                    Ok(_) => {
                        tracing::warn!(key, value, "zero endpoint count; ignoring key");
                        false
                    }
                    Err(_) => {
                        tracing::warn!(key, value, "malformed endpoint count; ignoring key");
                        false
                    }
                }
            } else {
                // Unknown key: forward-compatible no-op, not malformed.
                false
            }
        }
    }
}
