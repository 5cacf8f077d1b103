//! Completion status model.
//!
//! A completion carries a two-part status: a category (which family of
//! statuses the code belongs to) and an 8-bit code within that category.
//! The core itself only ever emits a handful of generic statuses; command
//! interpreters are free to use the full space.

/// Status category of a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum StatusCategory {
    /// Generic statuses applicable to any command.
    #[default]
    Generic = 0,
    /// Statuses whose meaning depends on the command's opcode.
    CommandSpecific = 1,
    /// Media and data-integrity errors.
    MediaError = 2,
    /// Vendor-defined statuses.
    VendorSpecific = 7,
}

/// Status code constants.
pub mod status_code {
    /// Command completed successfully.
    pub const SUCCESS: u8 = 0x00;
    /// Operation code not supported.
    pub const INVALID_OPCODE: u8 = 0x01;
    /// A field in the command is invalid.
    pub const INVALID_FIELD: u8 = 0x02;
    /// The command identifier is already in use by an outstanding command.
    pub const COMMAND_ID_CONFLICT: u8 = 0x03;
    /// The data transfer associated with the command failed.
    pub const DATA_TRANSFER_ERROR: u8 = 0x04;
    /// Internal error not attributable to the command.
    pub const INTERNAL_ERROR: u8 = 0x06;
    /// The command arrived out of sequence (e.g. before association).
    pub const COMMAND_SEQUENCE_ERROR: u8 = 0x0C;

    /// Connect handshake carried an invalid parameter (command-specific).
    pub const CONNECT_INVALID_PARAM: u8 = 0x82;
}

/// Two-part status stamped into completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionStatus {
    /// Status category.
    pub category: StatusCategory,
    /// Status code within the category.
    pub code: u8,
}

impl CompletionStatus {
    /// Generic success.
    pub const SUCCESS: Self = Self {
        category: StatusCategory::Generic,
        code: status_code::SUCCESS,
    };

    /// Build a generic-category status.
    pub const fn generic(code: u8) -> Self {
        Self {
            category: StatusCategory::Generic,
            code,
        }
    }

    /// Build a command-specific status.
    pub const fn command_specific(code: u8) -> Self {
        Self {
            category: StatusCategory::CommandSpecific,
            code,
        }
    }

    /// Duplicate in-flight command identifier.
    pub const fn command_id_conflict() -> Self {
        Self::generic(status_code::COMMAND_ID_CONFLICT)
    }

    /// Command arrived before the queue pair was associated.
    pub const fn sequence_error() -> Self {
        Self::generic(status_code::COMMAND_SEQUENCE_ERROR)
    }

    /// A field in the command is invalid.
    pub const fn invalid_field() -> Self {
        Self::generic(status_code::INVALID_FIELD)
    }

    /// Internal error not attributable to the command.
    pub const fn internal_error() -> Self {
        Self::generic(status_code::INTERNAL_ERROR)
    }

    /// Connect handshake parameter rejected.
    pub const fn connect_invalid_param() -> Self {
        Self::command_specific(status_code::CONNECT_INVALID_PARAM)
    }

    /// Check whether this status reports success.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.category == StatusCategory::Generic && self.code == status_code::SUCCESS
    }
}
