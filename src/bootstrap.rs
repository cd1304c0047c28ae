//! src/bootstrap.rs
//!
//! The bootstrapper: wires the network map, the syncer, and a gossip
//! engine together at startup, and drives the cooperative shutdown
//! sequence at the end of the process's life (§2 data flow, §5
//! cancellation).

use std::sync::Arc;
use std::time::Duration;

use crate::gossip::GossipEngine;
use crate::network_map::{NetworkMap, Unsubscribe};
use crate::node::{Node, Status};
use crate::registry::LocalEndpointRegistry;
use crate::syncer::Syncer;

/// The wired-up core, handed back by [`Bootstrapper::start`]. Holding this
/// alive keeps the local-change mirroring subscription alive; dropping
/// `_mirror` would silently stop outbound gossip propagation.
pub struct Core<E: GossipEngine> {
    pub network_map: NetworkMap,
    pub syncer: Arc<Syncer<E>>,
    pub registry: LocalEndpointRegistry,
    _mirror: Unsubscribe,
}

pub struct Bootstrapper {
    /// How long to wait, after advertising `status=left`, for gossip to
    /// propagate before stopping the engine (§5).
    pub shutdown_grace: Duration,
}

impl Bootstrapper {
    pub fn new(shutdown_grace: Duration) -> Self {
        Self { shutdown_grace }
    }

    /// Starts the core: creates the local node (status `Active`, per §3
    /// "typically Active"), wires the syncer to `engine`, seeds the
    /// engine with the local node's initial state, and begins mirroring
    /// further local changes.
    ///
    /// The caller is responsible for constructing `engine` and for
    /// registering the returned `Core`'s `syncer` (it implements
    /// `GossipCallbacks` through `Arc<Syncer<E>>`) as the engine's
    /// callback sink — that wiring is engine-specific and outside this
    /// spec (§4.4).
    pub fn start<E: GossipEngine + 'static>(
        &self,
        id: impl Into<String>,
        proxy_addr: impl Into<String>,
        admin_addr: impl Into<String>,
        engine: E,
    ) -> Core<E> {
        let mut local = Node::new(id, Status::Active);
        local.proxy_addr = proxy_addr.into();
        local.admin_addr = admin_addr.into();

        tracing::info!(
            node_id = %local.id,
            proxy_addr = %local.proxy_addr,
            admin_addr = %local.admin_addr,
            "starting cluster core"
        );

        let network_map = NetworkMap::new(local);
        let registry = LocalEndpointRegistry::new(network_map.clone());
        let syncer = Arc::new(Syncer::new(network_map.clone(), engine));

        syncer.seed();
        let mirror = syncer.start();

        Core {
            network_map,
            syncer,
            registry,
            _mirror: mirror,
        }
    }

    /// Drives the §5 cooperative shutdown sequence: (a) advertises
    /// `status=left`, (b) waits the configured grace period while gossip
    /// propagates, then (c) stops the engine.
    pub async fn shutdown<E: GossipEngine>(&self, core: &Core<E>) {
        tracing::info!("initiating graceful shutdown: advertising departure");
        core.network_map.set_local_status(Status::Left);

        tokio::time::sleep(self.shutdown_grace).await;

        tracing::info!("shutdown grace period elapsed; stopping gossip engine");
        core.syncer.gossiper().stop().await;
        tracing::info!("cluster core shut down");
    }
}
