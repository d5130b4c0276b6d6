//! Command dispatcher: lock/unlock on behalf of the rental layer.
//!
//! Delivery is *send-confirmed*.  A successful dispatch means the frame was
//! queued on the module's live connection, nothing more; whether the bolt
//! moved is learned later from telemetry.  Failures are returned to the
//! caller and never retried here.

use locker_core::{Command, CommandError, LockAction};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::hub::Hub;
use crate::application::registry::Registry;

/// Reasons a command did not reach the module's connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The command payload failed validation.
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] CommandError),

    /// No connection is bound to the module id.
    #[error("module {0} is offline")]
    ModuleOffline(String),

    /// A connection is bound but no longer writable.
    #[error("connection of module {0} is closed")]
    ConnectionClosed(String),
}

/// Validates `command` and queues its frame on the module's connection.
///
/// Runs under the hub lock; touches nothing but the target connection.
///
/// # Errors
///
/// See [`DispatchError`].
pub(crate) fn dispatch_locked(
    registry: &Registry,
    command: &Command,
) -> Result<(), DispatchError> {
    command.validate()?;
    let handle = registry
        .module_handle(&command.module_id)
        .ok_or_else(|| DispatchError::ModuleOffline(command.module_id.clone()))?;
    if !handle.send(command.to_frame()) {
        return Err(DispatchError::ConnectionClosed(command.module_id.clone()));
    }
    debug!(
        module_id = %command.module_id,
        locker_id = %command.locker_id,
        action = command.action.as_str(),
        "command queued"
    );
    Ok(())
}

impl Hub {
    /// Sends a lock or unlock to one locker.
    ///
    /// Returns `true` once the frame is queued on the module's connection,
    /// `false` if the command is invalid or the module is unreachable.  A
    /// failure has no side effect on the status cache.
    pub async fn send_command(&self, module_id: &str, locker_id: &str, action: LockAction) -> bool {
        let command = Command::new(module_id, locker_id, action, self.clock.now_ms());
        match self.dispatch(&command).await {
            Ok(()) => true,
            Err(err) => {
                warn!("command {} not delivered: {err}", action.as_str());
                false
            }
        }
    }

    /// Like [`Hub::send_command`], but reports why delivery failed.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidCommand`] for a malformed id.
    /// - [`DispatchError::ModuleOffline`] if no connection is bound.
    /// - [`DispatchError::ConnectionClosed`] if the bound connection is gone.
    pub async fn dispatch(&self, command: &Command) -> Result<(), DispatchError> {
        let state = self.state.lock().await;
        dispatch_locked(&state.registry, command)?;
        info!(
            module_id = %command.module_id,
            locker_id = %command.locker_id,
            action = command.action.as_str(),
            "command sent"
        );
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
