//! src/gossip.rs
//!
//! The gossip engine contract (§4.4): the core does not implement gossip
//! dissemination itself, it only depends on a SWIM-like engine meeting
//! this contract. This module defines the traits the syncer programs
//! against; a real engine (wire protocol, transport, encryption — all
//! outside this spec, §6) implements [`GossipEngine`] and drives
//! [`GossipCallbacks`].
//!
//! Assumptions this crate makes about any conforming engine (§4.4, §5):
//! - delivery is eventually-consistent and out-of-order across ids;
//! - duplicate callbacks for the same `(id, key, value)` are idempotent
//!   at the syncer (applying the same upsert twice is a no-op in effect);
//! - the engine owns incarnation/version numbering — callbacks already
//!   reflect latest-wins semantics, the syncer does no reconciliation of
//!   its own beyond per-id ordering;
//! - per-id ordering is preserved: callbacks for a given node id arrive,
//!   and are processed, in the order the engine observed them.

use futures::future::BoxFuture;

/// Outbound half of the contract: asynchronously propagate this node's own
/// state to peers.
pub trait Gossiper: Send + Sync {
    fn upsert_local(&self, key: &str, value: &str);
    fn delete_local(&self, key: &str);
}

/// Inbound half of the contract: the callbacks the engine delivers for
/// remote nodes (§4.3). `Syncer` is the canonical implementor.
pub trait GossipCallbacks: Send + Sync {
    /// A peer has been discovered; no state has arrived yet.
    fn on_join(&self, id: &str);
    /// One key of a peer's state was delivered (or redelivered).
    fn on_upsert_key(&self, id: &str, key: &str, value: &str);
    /// A key was removed from a peer's state.
    fn on_delete_key(&self, id: &str, key: &str);
    /// The peer announced voluntary departure.
    fn on_leave(&self, id: &str);
    /// The failure detector suspects the peer.
    fn on_down(&self, id: &str);
    /// The peer is reachable again after `on_down`.
    fn on_healthy(&self, id: &str);
    /// The peer should be forgotten entirely.
    fn on_expired(&self, id: &str);
}

/// A live gossip engine instance, as the bootstrapper holds it: the
/// outbound half of the contract, plus the ability to stop (§5's
/// shutdown sequence step (c)). Starting the engine and registering the
/// syncer as its callback sink are engine-specific and not modeled here —
/// the bootstrapper treats construction and callback wiring as already
/// done by the time it receives a `GossipEngine` handle.
pub trait GossipEngine: Gossiper {
    fn stop(&self) -> BoxFuture<'_, ()>;
}
