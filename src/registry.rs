//! src/registry.rs
//!
//! The local endpoint registry: a thin collaborator that forwards listener
//! attach/detach notifications to the network map (§6). Connection
//! bookkeeping for locally attached listeners — the actual upstream
//! connections themselves — is the out-of-scope listener registry's job
//! (§1); this type only emits the two calls `NetworkMap` expects.

use crate::network_map::NetworkMap;

/// Forwards upstream-listener attach/detach events to a `NetworkMap`.
///
/// Multiple listeners attaching to the same endpoint each produce their
/// own `attach` call, and each increments the count in the map (§6); this
/// type keeps no counts of its own.
#[derive(Clone)]
pub struct LocalEndpointRegistry {
    map: NetworkMap,
}

impl LocalEndpointRegistry {
    pub fn new(map: NetworkMap) -> Self {
        Self { map }
    }

    /// A listener attached for `endpoint`.
    pub fn attach(&self, endpoint: &str) {
        self.map.add_local_endpoint(endpoint);
    }

    /// A listener detached from `endpoint`.
    pub fn detach(&self, endpoint: &str) {
        self.map.remove_local_endpoint(endpoint);
    }
}
