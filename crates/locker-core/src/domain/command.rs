//! Lock/unlock commands.
//!
//! A [`Command`] is ephemeral: it is built by the caller, validated, turned
//! into a `lock` or `unlock` frame and handed to the transport.  It is never
//! stored.  Delivery is *send-confirmed*: the only evidence that a bolt
//! actually moved is a later telemetry report.

use thiserror::Error;

use crate::protocol::messages::{LockAction, OutboundMsg};

/// Longest identifier accepted in a command.
pub const MAX_ID_LEN: usize = 64;

/// Reasons a command payload is rejected before any lookup happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} exceeds 64 characters")]
    TooLong { field: &'static str },
    #[error("{field} contains control characters")]
    ControlCharacters { field: &'static str },
}

/// A lock/unlock request addressed to one locker of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub module_id: String,
    pub locker_id: String,
    pub action: LockAction,
    /// Unix epoch milliseconds at which the command was issued.
    pub timestamp: u64,
}

impl Command {
    pub fn new(
        module_id: impl Into<String>,
        locker_id: impl Into<String>,
        action: LockAction,
        timestamp: u64,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            locker_id: locker_id.into(),
            action,
            timestamp,
        }
    }

    /// Checks the payload shape.
    ///
    /// # Errors
    ///
    /// Returns the first [`CommandError`] found, checking `moduleId` before
    /// `lockerId`.
    pub fn validate(&self) -> Result<(), CommandError> {
        validate_identifier("moduleId", &self.module_id)?;
        validate_identifier("lockerId", &self.locker_id)
    }

    /// Builds the frame sent to the module.  The module id is implied by the
    /// connection the frame travels on.
    pub fn to_frame(&self) -> OutboundMsg {
        let locker_id = self.locker_id.clone();
        let timestamp = self.timestamp;
        match self.action {
            LockAction::Lock => OutboundMsg::Lock {
                locker_id,
                timestamp,
            },
            LockAction::Unlock => OutboundMsg::Unlock {
                locker_id,
                timestamp,
            },
        }
    }
}

/// Checks one identifier: non-blank, at most [`MAX_ID_LEN`] characters, no
/// control characters.  `field` is the wire name used in the error.
///
/// # Errors
///
/// Returns the matching [`CommandError`] variant.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), CommandError> {
    if value.trim().is_empty() {
        return Err(CommandError::Empty { field });
    }
    if value.chars().count() > MAX_ID_LEN {
        return Err(CommandError::TooLong { field });
    }
    if value.chars().any(char::is_control) {
        return Err(CommandError::ControlCharacters { field });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
