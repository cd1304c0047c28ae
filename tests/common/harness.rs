//! tests/common/harness.rs
//!
//! A small test harness for exercising the syncer against a recording
//! fake of the gossip engine contract (§4.4), rather than a real SWIM
//! implementation.

use std::sync::Mutex;

use piko_core::{Gossiper, Node, NetworkMap, Status};

/// A `Gossiper` that records every `upsert_local`/`delete_local` call, in
/// call order, for asserting the exact sequences in §8's concrete
/// scenarios.
#[derive(Default)]
pub struct RecordingGossiper {
    pub upserts: Mutex<Vec<(String, String)>>,
    pub deletes: Mutex<Vec<String>>,
}

impl RecordingGossiper {
    pub fn upserts(&self) -> Vec<(String, String)> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn last_upsert(&self) -> Option<(String, String)> {
        self.upserts.lock().unwrap().last().cloned()
    }

    pub fn last_delete(&self) -> Option<String> {
        self.deletes.lock().unwrap().last().cloned()
    }
}

impl Gossiper for RecordingGossiper {
    fn upsert_local(&self, key: &str, value: &str) {
        self.upserts.lock().unwrap().push((key.to_string(), value.to_string()));
    }
    fn delete_local(&self, key: &str) {
        self.deletes.lock().unwrap().push(key.to_string());
    }
}

/// Builds a local node fixture with the given id and addresses, status
/// `Active`.
pub fn local_node(id: &str, proxy_addr: &str, admin_addr: &str) -> Node {
    let mut node = Node::new(id, Status::Active);
    node.proxy_addr = proxy_addr.to_string();
    node.admin_addr = admin_addr.to_string();
    node
}

pub fn fresh_map(id: &str, proxy_addr: &str, admin_addr: &str) -> NetworkMap {
    NetworkMap::new(local_node(id, proxy_addr, admin_addr))
}
