//! Capsule types with typed accessors.
//!
//! A capsule is a discrete command or response message exchanged with the
//! peer. The transport layer owns the wire representation; this module
//! defines the in-process view: an inbound [`CommandCapsule`] delivered by
//! the transport, and the two outbound response shapes ([`Completion`] for
//! ordinary commands, [`ConnectResponse`] for the handshake) wrapped in
//! [`ResponseCapsule`] for transmission.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing.

use bytes::Bytes;

use super::status::CompletionStatus;

/// Operation code carried by fabric connect capsules.
///
/// Connect is the one command allowed on an unassociated queue pair; it is
/// how association happens.
pub const CONNECT_OPCODE: u8 = 0x7F;

/// Submission-queue head value reported in a connect response when flow
/// control was not negotiated.
pub const SQ_HEAD_DISABLED: u16 = 0xFFFF;

/// An inbound command capsule as delivered by the transport layer.
#[derive(Debug, Clone)]
pub struct CommandCapsule {
    /// 16-bit command identifier chosen by the peer.
    cid: u16,
    /// Operation code.
    opcode: u8,
    /// In-capsule data payload (may be empty).
    payload: Bytes,
}

impl CommandCapsule {
    /// Create a capsule from its decoded fields.
    pub fn new(cid: u16, opcode: u8, payload: Bytes) -> Self {
        Self {
            cid,
            opcode,
            payload,
        }
    }

    /// Get the command identifier.
    #[inline]
    pub fn cid(&self) -> u16 {
        self.cid
    }

    /// Get the operation code.
    #[inline]
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Check if this is a fabric connect capsule.
    #[inline]
    pub fn is_connect(&self) -> bool {
        self.opcode == CONNECT_OPCODE
    }
}

/// A completion for an ordinary command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Completion {
    /// Identifier of the command being completed.
    pub cid: u16,
    /// Completion status.
    pub status: CompletionStatus,
    /// Submission-queue head at transmission time; stamped by the queue
    /// pair when flow control is enabled, left as written otherwise.
    pub sq_head: u16,
    /// Command-specific result dword.
    pub result: u32,
}

impl Completion {
    /// Build a generic success completion for `cid`.
    pub fn success(cid: u16) -> Self {
        Self {
            cid,
            ..Default::default()
        }
    }

    /// Build an error completion for `cid` with the given status.
    pub fn error(cid: u16, status: CompletionStatus) -> Self {
        Self {
            cid,
            status,
            ..Default::default()
        }
    }
}

/// A response to the connect handshake.
///
/// Distinct shape from [`Completion`]: the handshake response format
/// predates flow-control negotiation and instead reports either the
/// controller identity (on success) or diagnostic information about the
/// offending parameter (on parameter errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Identifier of the connect command.
    pub cid: u16,
    /// Handshake status.
    pub status: CompletionStatus,
    /// Identifier assigned to the owning controller (success only).
    pub controller_id: u16,
    /// Submission-queue head echo, or [`SQ_HEAD_DISABLED`].
    pub sq_head: u16,
    /// Byte offset of the invalid parameter (parameter errors only).
    pub param_offset: u16,
    /// Whether the invalid parameter sits in the attached data payload
    /// rather than the command's fixed header.
    pub param_in_data: bool,
}

impl ConnectResponse {
    /// Build a success response embedding the controller identity.
    pub fn accepted(cid: u16, controller_id: u16, sq_head: u16) -> Self {
        Self {
            cid,
            status: CompletionStatus::SUCCESS,
            controller_id,
            sq_head,
            param_offset: 0,
            param_in_data: false,
        }
    }

    /// Build a failure response with the given status.
    pub fn error(cid: u16, status: CompletionStatus) -> Self {
        Self {
            cid,
            status,
            controller_id: 0,
            sq_head: SQ_HEAD_DISABLED,
            param_offset: 0,
            param_in_data: false,
        }
    }

    /// Build an invalid-parameter response pointing at the offending byte.
    pub fn invalid_parameter(cid: u16, in_data: bool, offset: u16) -> Self {
        Self {
            param_offset: offset,
            param_in_data: in_data,
            ..Self::error(cid, CompletionStatus::connect_invalid_param())
        }
    }

    /// Check whether the handshake was accepted.
    #[inline]
    pub fn is_accepted(&self) -> bool {
        self.status.is_success()
    }
}

/// An outbound response capsule handed to the transport for transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCapsule {
    /// Ordinary command completion.
    Completion(Completion),
    /// Connect handshake response.
    Connect(ConnectResponse),
}

impl ResponseCapsule {
    /// Identifier of the command this capsule responds to.
    #[inline]
    pub fn cid(&self) -> u16 {
        match self {
            ResponseCapsule::Completion(c) => c.cid,
            ResponseCapsule::Connect(c) => c.cid,
        }
    }

    /// Status carried by this capsule.
    #[inline]
    pub fn status(&self) -> CompletionStatus {
        match self {
            ResponseCapsule::Completion(c) => c.status,
            ResponseCapsule::Connect(c) => c.status,
        }
    }
}
