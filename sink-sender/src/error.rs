//! Error types for the sender
//!
//! Only construction, configuration and lifecycle misuse surface as errors.
//! Runtime failures (resolution, transport) are absorbed by the sender and
//! show up in [`SenderStats`](crate::SenderStats) instead.

use thiserror::Error;

use crate::lifecycle::Lifecycle;

/// Result type alias for sender operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or driving a sender
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to parse configuration file
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not allowed in the current lifecycle state
    #[error("invalid state: cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: Lifecycle,
    },
}

impl Error {
    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_) | Error::ConfigParse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_display() {
        let err = Error::InvalidState {
            action: "start",
            state: Lifecycle::Stopped,
        };
        assert_eq!(err.to_string(), "invalid state: cannot start while STOPPED");
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(Error::Config("port is required".into()).is_config_error());
        let parse = toml::from_str::<toml::Value>("host = ").unwrap_err();
        assert!(Error::from(parse).is_config_error());
    }
}
