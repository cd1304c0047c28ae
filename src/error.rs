//! src/error.rs
//!
//! Defines the library's `Error` enum using `thiserror`.
//!
//! Per §7, the core (`network_map`, `syncer`) raises no user-visible errors
//! upward — malformed gossip values are logged and the offending key is
//! ignored, and all lookups are infallible. `Error` is therefore scoped to
//! the ambient concerns around the core: configuration loading and
//! bootstrap/shutdown of the gossip engine task.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gossip engine task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
