//! Error types for hostname resolution

use thiserror::Error;

/// Result type alias for resolution operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving a hostname
#[derive(Debug, Error)]
pub enum Error {
    /// The lookup itself failed
    #[error("failed to resolve {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The lookup succeeded but produced no usable address
    #[error("{0} resolved to no addresses")]
    NoAddresses(String),

    /// Resolution was abandoned before producing an answer
    #[error("resolution of {0} was cancelled")]
    Cancelled(String),

    /// Any other resolver failure
    #[error("DNS error: {0}")]
    Dns(String),
}

impl Error {
    /// Whether the resolver answered but had nothing for the host
    pub fn is_empty_answer(&self) -> bool {
        matches!(self, Error::NoAddresses(_))
    }
}
