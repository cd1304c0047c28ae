//! src/lib.rs
//!
//! Cluster membership and endpoint-routing core for Piko, a clustered
//! reverse proxy. This library covers the network map, the syncer, the
//! gossip engine contract, the local endpoint registry collaborator, and
//! the bootstrapper that wires them together. The HTTP/WebSocket proxy
//! front-end, the request-forwarding transport, and the concrete gossip
//! engine implementation are separate crates built against the traits
//! exposed here.

// Declare the module hierarchy.
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod gossip;
pub mod network_map;
pub mod node;
pub mod registry;
pub mod syncer;

// Re-export key types for the public API.
pub use bootstrap::{Bootstrapper, Core};
pub use config::Config;
pub use error::Error;
pub use gossip::{GossipCallbacks, GossipEngine, Gossiper};
pub use network_map::{ChangeKind, Event, NetworkMap, Unsubscribe};
pub use node::{Node, Status};
pub use registry::LocalEndpointRegistry;
pub use syncer::Syncer;
