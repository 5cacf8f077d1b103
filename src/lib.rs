//! # fabricq
//!
//! Controller-side command queue-pair core for a fabric-attached
//! block-storage protocol.
//!
//! Commands and completions are exchanged as discrete capsules over a
//! transport-agnostic connection. This crate sits between a transport layer
//! that moves capsules over some wire medium and the command-interpretation
//! logic that gives operation codes their meaning; it owns everything in
//! between:
//!
//! - **Queue-pair lifecycle**: create / shutdown / drop with safe teardown
//!   of the shared transport handle while transmissions may be in flight
//!   from other tasks
//! - **Command admission**: duplicate command-identifier detection over the
//!   full 16-bit identifier space, rejection of pre-association traffic,
//!   routing to the admin or I/O interpreter
//! - **Completion emission**: response transmit with optional
//!   submission-queue flow control
//! - **Connect handshake**: the one command that associates a queue pair
//!   with its owning controller
//! - **Deferred transfers**: FIFO, single-flight execution of blocking data
//!   transfers outside the capsule-receive context, with guaranteed abort
//!   at shutdown
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fabricq::{QueuePair, QueueParams};
//!
//! let params = QueueParams::admin(32, true).name("host-a:admin");
//! let qp = QueuePair::create(&transport, params, dispatch)?;
//!
//! // The transport now delivers capsules; the dispatch layer interprets
//! // them and answers through the queue pair:
//! qp.send_success(cid)?;
//! qp.enqueue_transfer(job);
//!
//! // Any task may tear the queue pair down; in-flight transmissions and
//! // queued transfers are never left dangling.
//! qp.shutdown();
//! ```

pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod transfer;
pub mod transport;

mod cid_set;
mod connect;
mod queue_pair;

pub use cid_set::CommandIdSet;
pub use dispatch::{CommandDispatch, Controller};
pub use error::{FabricqError, Result};
pub use protocol::{
    CommandCapsule, Completion, CompletionStatus, ConnectResponse, ResponseCapsule, StatusCategory,
    CONNECT_OPCODE, SQ_HEAD_DISABLED,
};
pub use queue_pair::{QueuePair, QueuePairStats};
pub use transfer::{BoxFuture, TransferJob};
pub use transport::{
    QueueEvents, QueueParams, TransportError, TransportFactory, TransportQueue,
};
