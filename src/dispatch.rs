//! Dispatch module - seams to the command-interpretation layer.
//!
//! The queue pair validates and admits capsules, then hands them to the
//! command-interpretation layer through [`CommandDispatch`]. Interpreters
//! receive the owning `Arc<QueuePair>` so they can address responses (and
//! deferred transfers) back to the correct queue, possibly from another
//! task.
//!
//! [`Controller`] is the external controller object a queue pair becomes
//! associated with during the connect handshake. The queue pair only ever
//! holds a weak back-reference to it.

use std::sync::Arc;

use crate::protocol::{CommandCapsule, CompletionStatus};
use crate::queue_pair::QueuePair;
use crate::transport::TransportError;

/// Command-interpretation layer for a queue pair.
pub trait CommandDispatch: Send + Sync {
    /// Structurally validate an inbound capsule before admission.
    ///
    /// A non-success status causes the capsule to be rejected to the peer
    /// without any command-identifier bookkeeping.
    fn validate(&self, capsule: &CommandCapsule) -> CompletionStatus;

    /// Interpret a control-plane command admitted on an admin queue.
    fn admin_command(&self, queue_pair: Arc<QueuePair>, capsule: CommandCapsule);

    /// Interpret a data-plane command admitted on an I/O queue.
    fn io_command(&self, queue_pair: Arc<QueuePair>, capsule: CommandCapsule);
}

/// The controller a queue pair is associated with after a successful
/// connect handshake.
pub trait Controller: Send + Sync {
    /// Identifier assigned to this controller, reported to the peer in the
    /// connect response.
    fn controller_id(&self) -> u16;

    /// A connection-level transport error was reported on one of this
    /// controller's queue pairs. [`TransportError::Closed`] means the peer
    /// disconnected cleanly.
    fn transport_failed(&self, queue_pair: &QueuePair, error: TransportError);
}
