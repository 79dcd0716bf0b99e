//! Error types for isolatord
//!
//! Every error is caught at the REST boundary and turned into a JSON body;
//! none of them terminate the daemon.

use thiserror::Error;

/// Errors that can occur in isolatord
#[derive(Debug, Error)]
pub enum IsolatorError {
    /// Outbound HTTP call failed before a response arrived (connect, timeout, decode)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Outbound HTTP call returned a non-success status
    #[error("Upstream {url} returned {status}: {body}")]
    Upstream {
        url: String,
        status: u16,
        body: String,
    },

    /// Router JSON-RPC call failed or login was refused
    #[error("Router RPC error: {0}")]
    Rpc(String),

    /// Blacklist store could not be read or written
    #[error("Blacklist state error: {0}")]
    State(String),

    /// Missing or invalid configuration (including an undiscoverable DPID)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identifier is not a valid MAC address
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IsolatorError {
    /// Returns true if the error was caused by the caller rather than a collaborator
    pub fn is_client_error(&self) -> bool {
        matches!(self, IsolatorError::InvalidMac(_))
    }
}

/// Result type alias for isolatord operations
pub type Result<T> = std::result::Result<T, IsolatorError>;
