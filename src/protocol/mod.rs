//! Protocol module - capsule and completion types.
//!
//! This module defines the in-process protocol surface:
//! - Status categories and codes for completions
//! - Inbound command capsules with typed accessors
//! - The two outbound response shapes (completion, connect response)

mod capsule;
mod status;

pub use capsule::{
    CommandCapsule, Completion, ConnectResponse, ResponseCapsule, CONNECT_OPCODE, SQ_HEAD_DISABLED,
};
pub use status::{status_code, CompletionStatus, StatusCategory};
