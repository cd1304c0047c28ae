//! src/bin/piko-core-check.rs
//!
//! Binary entry point. Responsible for initializing tracing, loading
//! configuration, and driving a minimal startup/shutdown cycle of the
//! core — a smoke test standing in for the real process bootstrap, which
//! also wires up the proxy front-end and the concrete gossip engine
//! (both out of scope for this crate, §1).

use anyhow::Context;
use futures::future::BoxFuture;
use piko_core::{Bootstrapper, Gossiper};
use std::time::Duration;

/// A gossip engine that does nothing but log — real engines are a
/// separate crate's concern (§4.4).
struct NoopGossipEngine;

impl Gossiper for NoopGossipEngine {
    fn upsert_local(&self, key: &str, value: &str) {
        tracing::debug!(key, value, "upsert_local");
    }
    fn delete_local(&self, key: &str) {
        tracing::debug!(key, "delete_local");
    }
}

impl piko_core::GossipEngine for NoopGossipEngine {
    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            tracing::debug!("noop gossip engine stopped");
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = piko_core::Config::load().context("failed to load configuration")?;

    tracing::info!(node_id = %config.node_id, "starting piko-core check");

    let bootstrapper = Bootstrapper::new(Duration::from_millis(config.shutdown_grace_ms));
    let core = bootstrapper.start(
        config.node_id.clone(),
        config.proxy_addr.to_string(),
        config.admin_addr.to_string(),
        NoopGossipEngine,
    );

    core.registry.attach("example-endpoint");
    tracing::info!(nodes = core.network_map.nodes().len(), "core wired up");

    bootstrapper.shutdown(&core).await;

    Ok(())
}
