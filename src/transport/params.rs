//! Queue-pair creation parameters.
//!
//! Handed off by the transport layer when a new connection's queue pair is
//! created. All fields are fixed for the lifetime of the queue pair; the
//! submission-queue head/tail shadows are meaningful only when flow control
//! was negotiated.

use crate::error::{FabricqError, Result};

/// Parameters for creating a queue pair.
#[derive(Debug, Clone)]
pub struct QueueParams {
    /// Queue identifier, unique within the connection.
    pub queue_id: u16,
    /// Whether this is the admin queue (control plane) rather than an I/O
    /// queue (data plane).
    pub is_admin: bool,
    /// Number of submission-queue entries.
    pub queue_size: u16,
    /// Whether submission-queue flow control was negotiated.
    pub flow_control: bool,
    /// Initial shadow of the peer's submission-queue head.
    pub sq_head: u16,
    /// Initial shadow of the peer's submission-queue tail.
    pub sq_tail: u16,
    /// Diagnostic label used in logs.
    pub name: String,
}

impl QueueParams {
    /// Create parameters for an admin queue pair.
    pub fn admin(queue_size: u16, flow_control: bool) -> Self {
        Self {
            queue_id: 0,
            is_admin: true,
            queue_size,
            flow_control,
            sq_head: 0,
            sq_tail: 0,
            name: "admin".to_string(),
        }
    }

    /// Create parameters for an I/O queue pair.
    pub fn io(queue_id: u16, queue_size: u16, flow_control: bool) -> Self {
        Self {
            queue_id,
            is_admin: false,
            queue_size,
            flow_control,
            sq_head: 0,
            sq_tail: 0,
            name: format!("io-{}", queue_id),
        }
    }

    /// Set the diagnostic name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the initial submission-queue head/tail shadows.
    pub fn sq_pointers(mut self, head: u16, tail: u16) -> Self {
        self.sq_head = head;
        self.sq_tail = tail;
        self
    }

    /// Validate the parameters.
    ///
    /// The queue size must be nonzero, and the head/tail shadows must fall
    /// inside the queue when flow control is on.
    pub fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(FabricqError::InvalidParams(
                "queue size must be nonzero".to_string(),
            ));
        }
        if self.flow_control && (self.sq_head >= self.queue_size || self.sq_tail >= self.queue_size)
        {
            return Err(FabricqError::InvalidParams(format!(
                "sq pointers ({}, {}) out of range for queue size {}",
                self.sq_head, self.sq_tail, self.queue_size
            )));
        }
        Ok(())
    }
}
