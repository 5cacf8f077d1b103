//! Connect handshake responses.
//!
//! The connect command is the first capsule on a newly created queue pair;
//! its success response associates the queue pair with its owning
//! controller. Per queue pair the state machine is
//! Unassociated → Associated → Terminated, with no way back: a transmit
//! failure during the handshake leaves the pair Unassociated, and the
//! transport error callback handles the teardown if the connection actually
//! died.
//!
//! Handshake responses have their own shape
//! ([`ConnectResponse`](crate::protocol::ConnectResponse)) and never touch
//! the flow-control pointers; the format predates flow-control negotiation.

use std::sync::Arc;

use crate::dispatch::Controller;
use crate::error::{FabricqError, Result};
use crate::protocol::{CompletionStatus, ConnectResponse, ResponseCapsule, SQ_HEAD_DISABLED};
use crate::queue_pair::QueuePair;

impl QueuePair {
    /// Transmit a handshake response through the pinned transport handle.
    fn transmit_connect(&self, response: ConnectResponse) -> Result<()> {
        let handle = self.pinned_handle()?;
        handle
            .transmit(&ResponseCapsule::Connect(response))
            .map_err(FabricqError::Transmit)
    }

    /// Reject the connect command with the given status.
    pub fn connect_error(&self, cid: u16, status: CompletionStatus) -> Result<()> {
        self.transmit_connect(ConnectResponse::error(cid, status))
    }

    /// Reject the connect command because one of its parameters is invalid,
    /// telling the peer where: `offset` is the byte offset of the offending
    /// field, in the attached data payload if `in_data` or in the command's
    /// fixed header otherwise.
    pub fn connect_invalid_parameters(&self, cid: u16, in_data: bool, offset: u16) -> Result<()> {
        self.transmit_connect(ConnectResponse::invalid_parameter(cid, in_data, offset))
    }

    /// Accept the connect command and associate this queue pair with its
    /// owning controller.
    ///
    /// The success response echoes the current submission-queue head when
    /// flow control was negotiated (the sentinel otherwise) and embeds the
    /// controller's assigned identifier. Association is the last step: only
    /// once this returns `Ok` is ordinary command traffic routed, and a
    /// transmit failure leaves the queue pair unassociated.
    ///
    /// # Panics
    ///
    /// Panics if the queue pair is already associated.
    pub fn finish_accept(&self, cid: u16, controller: &Arc<dyn Controller>) -> Result<()> {
        let sq_head = if self.flow_control_enabled() {
            self.sq_head()
        } else {
            SQ_HEAD_DISABLED
        };
        let response = ConnectResponse::accepted(cid, controller.controller_id(), sq_head);
        self.transmit_connect(response)?;

        self.associate(Arc::downgrade(controller));
        tracing::debug!(
            queue = %self.name(),
            controller_id = controller.controller_id(),
            "queue pair associated"
        );
        Ok(())
    }
}
