//! Error types for the discovery service.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by service lifecycle operations.
///
/// None of these are fatal to the host process; the caller decides whether
/// a failed `start()` should end the program or just show "no devices".
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The beacon port could not be bound (usually already in use).
    #[error("Failed to bind beacon listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
