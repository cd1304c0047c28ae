//! src/network_map.rs
//!
//! The network map: the authoritative local view of the cluster (§3, §4.2).
//! Holds exactly one local node plus a set of remote nodes keyed by id.
//! Reads are infallible; mutations are atomic with respect to concurrent
//! readers and are followed by subscriber notification once the lock is
//! released (§4.2, §5, §9).
//!
//! The map never stores a `Pending` remote node — assembling a remote
//! node's state while it is not yet routable is the syncer's job (its
//! pending buffer, §4.3); by the time a remote id appears here it already
//! satisfies the visibility invariants (§3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use crate::node::{Node, Status};

/// What changed about a node, delivered to subscribers alongside the node's
/// new snapshot (§4.2). The same vocabulary covers both local mutations
/// (which the syncer mirrors outward to gossip) and remote mutations
/// (which the syncer only ever originates, never mirrors) — `is_local`
/// tells a subscriber which is which.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeKind {
    /// An endpoint was inserted or its count changed.
    EndpointSet { endpoint: String, count: u32 },
    /// An endpoint's count reached zero and the entry was removed.
    EndpointRemoved { endpoint: String },
    /// The node's status changed.
    StatusChanged(Status),
    /// The node's `ProxyAddr` was set (initially, or rarely, updated).
    ProxyAddrSet(String),
    /// The node's `AdminAddr` was set (initially, or rarely, updated).
    AdminAddrSet(String),
    /// The node was replaced wholesale (used at remote-node promotion).
    Upserted,
    /// The node was removed from the map entirely.
    Removed,
}

/// An event delivered to a `Subscribe` observer.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub node_id: String,
    pub is_local: bool,
    pub kind: ChangeKind,
    /// The node's new snapshot, or `None` for `ChangeKind::Removed`.
    pub snapshot: Option<Node>,
}

type Observer = std::sync::Arc<dyn Fn(&Event) + Send + Sync>;

/// A handle returned by [`NetworkMap::subscribe`]. Dropping it, or calling
/// [`Unsubscribe::cancel`] explicitly, deregisters the observer.
pub struct Unsubscribe {
    id: u64,
    map: std::sync::Weak<NetworkMapInner>,
}

impl Unsubscribe {
    pub fn cancel(self) {
        // Drop does the work; this just gives callers an explicit name.
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        if let Some(inner) = self.map.upgrade() {
            inner.subscribers.lock().unwrap().retain(|(id, _)| *id != self.id);
        }
    }
}

struct State {
    local: Node,
    remotes: HashMap<String, Node>,
}

struct NetworkMapInner {
    state: RwLock<State>,
    subscribers: Mutex<Vec<(u64, Observer)>>,
    next_subscriber_id: AtomicU64,
}

/// The cluster's network map (§4.2). Cheap to clone — it is a thin handle
/// around a shared, lock-protected inner state, matching how the teacher's
/// services share `watch`/`broadcast` handles rather than the state itself.
#[derive(Clone)]
pub struct NetworkMap {
    inner: std::sync::Arc<NetworkMapInner>,
}

impl NetworkMap {
    /// Creates a new map with the given node as the local node. The local
    /// node is always observable, regardless of status (§3) — callers
    /// typically pass `Status::Active` here once startup addresses are
    /// known.
    pub fn new(local: Node) -> Self {
        Self {
            inner: std::sync::Arc::new(NetworkMapInner {
                state: RwLock::new(State {
                    local,
                    remotes: HashMap::new(),
                }),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber_id: AtomicU64::new(0),
            }),
        }
    }

    fn local_id(&self) -> String {
        self.inner.state.read().unwrap().local.id.clone()
    }

    fn is_local(&self, id: &str) -> bool {
        self.inner.state.read().unwrap().local.id == id
    }

    /// Registers `observer`, invoked after every state change with the
    /// event kind and the node's new snapshot. Per §4.2/§9, notification
    /// happens after the mutating call has released the map's internal
    /// lock, so an observer may safely call back into the map. A panic
    /// inside one observer is caught and does not affect other observers
    /// or the mutating caller (§7).
    pub fn subscribe<F>(&self, observer: F) -> Unsubscribe
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .push((id, std::sync::Arc::new(observer)));
        Unsubscribe {
            id,
            map: std::sync::Arc::downgrade(&self.inner),
        }
    }

    fn notify(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        // The mutation that produced `events` has already released the
        // state lock by the time we get here (§4.2, §9). The subscriber
        // list is copied out and the lock dropped before dispatch, so an
        // observer is free to subscribe/unsubscribe (or drop an
        // `Unsubscribe`, whose `Drop` also locks `subscribers`) or call
        // back into the map without deadlocking against this thread.
        let observers: Vec<Observer> = {
            let guard = self.inner.subscribers.lock().unwrap();
            guard.iter().map(|(_, observer)| observer.clone()).collect()
        };
        for event in &events {
            for observer in &observers {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    observer(event);
                }));
                if result.is_err() {
                    tracing::warn!(node_id = %event.node_id, "subscriber callback panicked; isolating");
                }
            }
        }
    }

    // ---- Reads (§4.2) ----

    /// Snapshot of the local node.
    pub fn local_node(&self) -> Node {
        self.inner.state.read().unwrap().local.clone()
    }

    /// Snapshot of a visible node (local, or remote with status != Pending
    /// — though the map never stores a pending remote, so in practice this
    /// is "local or remote present").
    pub fn node(&self, id: &str) -> Option<Node> {
        let state = self.inner.state.read().unwrap();
        if state.local.id == id {
            return Some(state.local.clone());
        }
        state.remotes.get(id).cloned()
    }

    /// Snapshot of all visible nodes, local node included, unordered.
    pub fn nodes(&self) -> Vec<Node> {
        let state = self.inner.state.read().unwrap();
        let mut out = Vec::with_capacity(state.remotes.len() + 1);
        out.push(state.local.clone());
        out.extend(state.remotes.values().cloned());
        out
    }

    /// All visible nodes whose `Endpoints` contains `endpoint` with a
    /// count `>= 1`. Includes the local node if it qualifies (§4.2).
    pub fn lookup_endpoint(&self, endpoint: &str) -> Vec<Node> {
        let state = self.inner.state.read().unwrap();
        let mut out = Vec::new();
        if state.local.endpoint_count(endpoint).is_some() {
            out.push(state.local.clone());
        }
        for node in state.remotes.values() {
            if node.endpoint_count(endpoint).is_some() {
                out.push(node.clone());
            }
        }
        out
    }

    // ---- Local mutations (§4.2) ----

    /// Increments the local node's endpoint count, inserting with value 1
    /// if absent.
    pub fn add_local_endpoint(&self, endpoint: &str) {
        let (id, count) = {
            let mut state = self.inner.state.write().unwrap();
            let count = state.local.endpoints.entry(endpoint.to_string()).or_insert(0);
            *count += 1;
            (state.local.id.clone(), *count)
        };
        tracing::debug!(node_id = %id, endpoint, count, "local endpoint added");
        self.notify(vec![self.local_event(ChangeKind::EndpointSet {
            endpoint: endpoint.to_string(),
            count,
        })]);
    }

    /// Decrements the local node's endpoint count, deleting the entry when
    /// it reaches zero. A no-op (not an error) if the endpoint is absent or
    /// already zero (§4.2).
    pub fn remove_local_endpoint(&self, endpoint: &str) {
        let outcome = {
            let mut state = self.inner.state.write().unwrap();
            match state.local.endpoints.get_mut(endpoint) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    Some(Some(*count))
                }
                Some(_) => {
                    state.local.endpoints.remove(endpoint);
                    Some(None)
                }
                None => None,
            }
        };
        match outcome {
            Some(Some(count)) => {
                tracing::debug!(endpoint, count, "local endpoint decremented");
                self.notify(vec![self.local_event(ChangeKind::EndpointSet {
                    endpoint: endpoint.to_string(),
                    count,
                })]);
            }
            Some(None) => {
                tracing::debug!(endpoint, "local endpoint removed");
                self.notify(vec![self.local_event(ChangeKind::EndpointRemoved {
                    endpoint: endpoint.to_string(),
                })]);
            }
            None => {
                tracing::trace!(endpoint, "remove_local_endpoint no-op: absent");
            }
        }
    }

    /// Sets the local node's status.
    pub fn set_local_status(&self, status: Status) {
        {
            let mut state = self.inner.state.write().unwrap();
            state.local.status = status;
        }
        tracing::debug!(%status, "local status changed");
        self.notify(vec![self.local_event(ChangeKind::StatusChanged(status))]);
    }

    /// Sets the local node's `ProxyAddr`. Typically called once, at
    /// startup, by the bootstrapper; the outbound mirroring rule for this
    /// exists to also cover the rare case of re-advertisement (§4.3).
    pub fn set_local_proxy_addr(&self, addr: impl Into<String>) {
        let addr = addr.into();
        {
            let mut state = self.inner.state.write().unwrap();
            state.local.proxy_addr = addr.clone();
        }
        self.notify(vec![self.local_event(ChangeKind::ProxyAddrSet(addr))]);
    }

    /// Sets the local node's `AdminAddr`. See [`NetworkMap::set_local_proxy_addr`].
    pub fn set_local_admin_addr(&self, addr: impl Into<String>) {
        let addr = addr.into();
        {
            let mut state = self.inner.state.write().unwrap();
            state.local.admin_addr = addr.clone();
        }
        self.notify(vec![self.local_event(ChangeKind::AdminAddrSet(addr))]);
    }

    fn local_event(&self, kind: ChangeKind) -> Event {
        let state = self.inner.state.read().unwrap();
        Event {
            node_id: state.local.id.clone(),
            is_local: true,
            kind,
            snapshot: Some(state.local.clone()),
        }
    }

    // ---- Administrative (remote) mutations — syncer-only (§4.2, §4.3) ----

    /// Inserts or wholesale-replaces a remote node's record. Used by the
    /// syncer at promotion time. A no-op if `node.id` is the local id
    /// (echo guard, §4.3), or if `node` does not meet the visibility
    /// invariants every node this map exposes must satisfy (§3) — the map
    /// never stores a node a reader couldn't legally observe.
    pub fn upsert_node(&self, node: Node) {
        if self.is_local(&node.id) {
            tracing::trace!(node_id = %node.id, "upsert_node no-op: targets local id");
            return;
        }
        if !node.meets_visibility_invariants() {
            tracing::warn!(node_id = %node.id, "upsert_node no-op: violates visibility invariants");
            return;
        }
        let id = node.id.clone();
        {
            let mut state = self.inner.state.write().unwrap();
            state.remotes.insert(id.clone(), node.clone());
        }
        tracing::info!(node_id = %id, status = %node.status, "remote node upserted");
        self.notify(vec![Event {
            node_id: id,
            is_local: false,
            kind: ChangeKind::Upserted,
            snapshot: Some(node),
        }]);
    }

    /// Updates an already-visible remote node's status. No-op if `id` is
    /// local or unknown (§4.2, §4.3).
    pub fn update_remote_status(&self, id: &str, status: Status) {
        if self.is_local(id) {
            tracing::trace!(node_id = %id, "update_remote_status no-op: targets local id");
            return;
        }
        let snapshot = {
            let mut state = self.inner.state.write().unwrap();
            match state.remotes.get_mut(id) {
                Some(node) => {
                    node.status = status;
                    Some(node.clone())
                }
                None => None,
            }
        };
        match snapshot {
            Some(node) => {
                tracing::info!(node_id = %id, %status, "remote status updated");
                self.notify(vec![Event {
                    node_id: id.to_string(),
                    is_local: false,
                    kind: ChangeKind::StatusChanged(status),
                    snapshot: Some(node),
                }]);
            }
            None => tracing::trace!(node_id = %id, "update_remote_status no-op: unknown id"),
        }
    }

    /// Sets a remote node's endpoint count to exactly `count`. No-op if
    /// `id` is local or unknown. A `count` of zero is treated as a removal
    /// (the wire schema never carries a zero-valued count, §6, but callers
    /// that pass one get the sensible behavior rather than a stored zero).
    pub fn update_remote_endpoint(&self, id: &str, endpoint: &str, count: u32) {
        if count == 0 {
            self.remove_remote_endpoint(id, endpoint);
            return;
        }
        if self.is_local(id) {
            tracing::trace!(node_id = %id, "update_remote_endpoint no-op: targets local id");
            return;
        }
        let snapshot = {
            let mut state = self.inner.state.write().unwrap();
            match state.remotes.get_mut(id) {
                Some(node) => {
                    node.endpoints.insert(endpoint.to_string(), count);
                    Some(node.clone())
                }
                None => None,
            }
        };
        match snapshot {
            Some(node) => {
                tracing::debug!(node_id = %id, endpoint, count, "remote endpoint updated");
                self.notify(vec![Event {
                    node_id: id.to_string(),
                    is_local: false,
                    kind: ChangeKind::EndpointSet {
                        endpoint: endpoint.to_string(),
                        count,
                    },
                    snapshot: Some(node),
                }]);
            }
            None => tracing::trace!(node_id = %id, "update_remote_endpoint no-op: unknown id"),
        }
    }

    /// Removes a single endpoint entry from a remote node. No-op if `id`
    /// is local, unknown, or the endpoint is already absent.
    pub fn remove_remote_endpoint(&self, id: &str, endpoint: &str) {
        if self.is_local(id) {
            tracing::trace!(node_id = %id, "remove_remote_endpoint no-op: targets local id");
            return;
        }
        let snapshot = {
            let mut state = self.inner.state.write().unwrap();
            match state.remotes.get_mut(id) {
                Some(node) => {
                    if node.endpoints.remove(endpoint).is_some() {
                        Some(Some(node.clone()))
                    } else {
                        Some(None)
                    }
                }
                None => None,
            }
        };
        match snapshot {
            Some(Some(node)) => {
                tracing::debug!(node_id = %id, endpoint, "remote endpoint removed");
                self.notify(vec![Event {
                    node_id: id.to_string(),
                    is_local: false,
                    kind: ChangeKind::EndpointRemoved {
                        endpoint: endpoint.to_string(),
                    },
                    snapshot: Some(node),
                }]);
            }
            Some(None) => tracing::trace!(node_id = %id, endpoint, "remove_remote_endpoint no-op: endpoint absent"),
            None => tracing::trace!(node_id = %id, "remove_remote_endpoint no-op: unknown id"),
        }
    }

    /// Removes a remote node from the map entirely (gossip expiry). No-op
    /// if `id` is local.
    pub fn remove_node(&self, id: &str) {
        if self.is_local(id) {
            tracing::trace!(node_id = %id, "remove_node no-op: targets local id");
            return;
        }
        let removed = {
            let mut state = self.inner.state.write().unwrap();
            state.remotes.remove(id).is_some()
        };
        if removed {
            tracing::info!(node_id = %id, "remote node removed");
            self.notify(vec![Event {
                node_id: id.to_string(),
                is_local: false,
                kind: ChangeKind::Removed,
                snapshot: None,
            }]);
        } else {
            tracing::trace!(node_id = %id, "remove_node no-op: unknown id");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn local(id: &str) -> Node {
        let mut n = Node::new(id, Status::Active);
        n.proxy_addr = format!("{id}-proxy:8000");
        n.admin_addr = format!("{id}-admin:8001");
        n
    }

    #[test]
    fn local_node_is_observable_immediately() {
        let map = NetworkMap::new(local("local"));
        assert_eq!(map.local_node().id, "local");
        assert_eq!(map.node("local").unwrap().id, "local");
    }

    #[test]
    fn add_then_remove_local_endpoint_tracks_exact_count() {
        let map = NetworkMap::new(local("local"));
        map.add_local_endpoint("ep");
        map.add_local_endpoint("ep");
        map.add_local_endpoint("ep");
        assert_eq!(map.local_node().endpoint_count("ep"), Some(3));

        map.remove_local_endpoint("ep");
        assert_eq!(map.local_node().endpoint_count("ep"), Some(2));
        map.remove_local_endpoint("ep");
        assert_eq!(map.local_node().endpoint_count("ep"), Some(1));
        map.remove_local_endpoint("ep");
        assert_eq!(map.local_node().endpoint_count("ep"), None);
    }

    #[test]
    fn remove_local_endpoint_is_noop_below_zero() {
        let map = NetworkMap::new(local("local"));
        map.remove_local_endpoint("never-added");
        assert_eq!(map.local_node().endpoints.len(), 0);
    }

    #[test]
    fn lookup_endpoint_includes_local_and_remote_matches() {
        let map = NetworkMap::new(local("local"));
        map.add_local_endpoint("shared");

        let mut remote = local("remote-1");
        remote.endpoints.insert("shared".into(), 5);
        map.upsert_node(remote);

        let mut other = local("remote-2");
        other.endpoints.insert("other-endpoint".into(), 1);
        map.upsert_node(other);

        let found = map.lookup_endpoint("shared");
        let ids: std::collections::HashSet<_> = found.iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, ["local".to_string(), "remote-1".to_string()].into());
    }

    #[test]
    fn operations_targeting_local_id_are_silently_ignored() {
        let map = NetworkMap::new(local("local"));
        map.upsert_node(Node::new("local", Status::Down));
        assert_eq!(map.local_node().status, Status::Active);

        map.update_remote_status("local", Status::Down);
        assert_eq!(map.local_node().status, Status::Active);

        map.remove_node("local");
        assert!(map.node("local").is_some());
    }

    #[test]
    fn mutations_on_unknown_remote_id_are_noops() {
        let map = NetworkMap::new(local("local"));
        map.update_remote_status("ghost", Status::Down);
        map.update_remote_endpoint("ghost", "ep", 3);
        map.remove_remote_endpoint("ghost", "ep");
        map.remove_node("ghost");
        assert!(map.node("ghost").is_none());
        assert_eq!(map.nodes().len(), 1);
    }

    #[test]
    fn subscriber_receives_local_mutation_events_with_new_snapshot() {
        let map = NetworkMap::new(local("local"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let _sub = map.subscribe(move |event| {
            seen2.lock().unwrap().push(event.clone());
        });

        map.add_local_endpoint("ep");
        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_local);
        assert_eq!(
            events[0].kind,
            ChangeKind::EndpointSet {
                endpoint: "ep".into(),
                count: 1
            }
        );
        assert_eq!(events[0].snapshot.as_ref().unwrap().endpoint_count("ep"), Some(1));
    }

    #[test]
    fn unsubscribe_stops_further_notifications() {
        let map = NetworkMap::new(local("local"));
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let sub = map.subscribe(move |_event| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        map.add_local_endpoint("a");
        drop(sub);
        map.add_local_endpoint("b");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_panicking_subscriber_does_not_break_others() {
        let map = NetworkMap::new(local("local"));
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();

        let _panicker = map.subscribe(|_event| panic!("boom"));
        let _ok = map.subscribe(move |_event| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });

        map.add_local_endpoint("ep");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn an_observer_may_subscribe_and_unsubscribe_from_within_notify() {
        let map = NetworkMap::new(local("local"));
        let map2 = map.clone();
        let reentrant_count = Arc::new(AtomicUsize::new(0));
        let reentrant_count2 = reentrant_count.clone();

        // This observer calls back into `map` while `notify` is dispatching
        // it — both `subscribe` and dropping the returned `Unsubscribe` lock
        // `subscribers`. Neither must deadlock against the outer dispatch.
        let _sub = map.subscribe(move |_event| {
            let inner = map2.subscribe(|_event| {});
            drop(inner);
            reentrant_count2.fetch_add(1, Ordering::SeqCst);
        });

        map.add_local_endpoint("ep");
        assert_eq!(reentrant_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn upsert_node_rejects_a_node_violating_visibility_invariants() {
        let map = NetworkMap::new(local("local"));
        map.upsert_node(Node::new("remote", Status::Active)); // no addresses
        assert!(map.node("remote").is_none());

        let mut pending = Node::new("remote", Status::Pending);
        pending.proxy_addr = "10.0.0.2:8000".into();
        pending.admin_addr = "10.0.0.2:8001".into();
        map.upsert_node(pending);
        assert!(map.node("remote").is_none());
    }
}
