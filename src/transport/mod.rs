//! Transport module - the boundary to the layer that moves bytes.
//!
//! The transport layer (TCP, RDMA, in-memory for tests) is an external
//! collaborator. It delivers inbound capsules and accepts outbound response
//! capsules; everything about the wire is its business. This module defines
//! the seam:
//!
//! - [`TransportFactory`] - allocates the per-queue transport handle,
//!   wiring the queue pair in as the event sink
//! - [`TransportQueue`] - the handle itself; transmits response capsules,
//!   frees its resources on drop
//! - [`QueueEvents`] - callbacks the transport invokes (implemented by
//!   `QueuePair`)
//! - [`QueueParams`] - fixed queue-pair parameters handed off at creation

mod params;

use std::sync::{Arc, Weak};

use thiserror::Error;

use crate::protocol::{CommandCapsule, ResponseCapsule};

pub use params::QueueParams;

/// Errors reported by the transport layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection closed cleanly.
    #[error("connection closed")]
    Closed,

    /// The peer reset the connection.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// A capsule could not be transmitted.
    #[error("transmit failed: {0}")]
    Transmit(String),

    /// Any other transport-level failure.
    #[error("transport failure: {0}")]
    Other(String),
}

/// Event sink the transport layer drives.
///
/// Implemented by the queue pair. The transport holds a weak reference so
/// a torn-down queue pair does not linger just because the transport still
/// exists.
pub trait QueueEvents: Send + Sync {
    /// A command capsule arrived from the peer.
    fn capsule_received(&self, capsule: CommandCapsule);

    /// The transport hit an asynchronous error on this queue.
    fn transport_failed(&self, error: TransportError);
}

/// The per-queue transport handle.
///
/// Dropping the last reference frees the transport-side resources; the
/// queue pair's pin/release discipline guarantees that happens exactly once
/// and never while a transmit is in flight.
pub trait TransportQueue: Send + Sync {
    /// Transmit a response capsule to the peer.
    ///
    /// Failures are surfaced to the caller; no retry happens at this layer.
    fn transmit(&self, capsule: &ResponseCapsule) -> std::result::Result<(), TransportError>;
}

/// Factory side of the transport layer.
pub trait TransportFactory: Send + Sync {
    /// Allocate the transport handle for a new queue pair, registering
    /// `events` as the receive/error sink.
    fn allocate_queue(
        &self,
        params: &QueueParams,
        events: Weak<dyn QueueEvents>,
    ) -> std::result::Result<Arc<dyn TransportQueue>, TransportError>;
}
