//! Error types for fabricq.

use thiserror::Error;

use crate::transport::TransportError;

/// Main error type for all queue-pair operations.
#[derive(Debug, Error)]
pub enum FabricqError {
    /// Queue parameters rejected at creation.
    #[error("invalid queue parameters: {0}")]
    InvalidParams(String),

    /// The transport layer could not allocate the underlying queue handle.
    #[error("transport handle allocation failed")]
    HandleAllocation(#[source] TransportError),

    /// The queue pair has been shut down (or never finished creation);
    /// there is no transport handle to transmit on.
    #[error("queue pair is not connected")]
    NotConnected,

    /// The transport accepted the capsule but failed to transmit it.
    /// Not retried here; the caller decides whether to retry or tear down.
    #[error("transmit failed")]
    Transmit(#[source] TransportError),
}

/// Result type alias using FabricqError.
pub type Result<T> = std::result::Result<T, FabricqError>;
