//! src/config.rs
//!
//! Defines the strongly-typed `Config` struct for the parameters the
//! bootstrapper needs, loaded from a file and environment variables via
//! `figment` (§6, §5). The proxy front-end's own configuration — listener
//! ports, TLS, request-forwarding timeouts — is a different crate's
//! concern and is not modeled here (§1).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Top-level configuration for wiring up the cluster-membership core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// This node's cluster-wide unique id (§3).
    pub node_id: String,
    /// host:port other nodes use to forward requests to this node (§3, §6).
    pub proxy_addr: SocketAddr,
    /// host:port for admin/metrics, reachable by other nodes (§3, §6).
    pub admin_addr: SocketAddr,
    /// How long the bootstrapper waits, after advertising `status=left`,
    /// for gossip to propagate before stopping the engine (§5).
    pub shutdown_grace_ms: u64,
}

impl Config {
    /// Loads configuration from `config.toml` and `PIKO_`-prefixed
    /// environment variables, layered over [`Config::default`].
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("PIKO_"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            proxy_addr: "127.0.0.1:7000".parse().unwrap(),
            admin_addr: "127.0.0.1:7001".parse().unwrap(),
            shutdown_grace_ms: 2_000,
        }
    }
}
