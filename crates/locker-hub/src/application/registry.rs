//! Connection registry: who is reachable right now.
//!
//! The registry is the only component that binds identities to connection
//! handles.  It tracks three populations:
//!
//! - **Sessions**: every attached connection with its current
//!   [`ConnectionRole`].  Observers are the sessions whose role is
//!   `Observer`; they form the broadcast set.
//! - **Modules**: `moduleId → ModuleConnection`, created by `register`.
//! - **Available devices**: `macAddress → AvailableModule`, created by
//!   `announce` from a connection that has no module identity yet.
//!
//! ```text
//!               announce                 register
//!   session ─────────────► available ─────────────► module
//!      │                      │                        │
//!      └──────── unbind ──────┴──────── unbind ────────┘
//! ```
//!
//! # Invariants
//!
//! - At most one connection is bound to a module id, and a connection is
//!   bound to at most one module id (`module_by_connection` mirrors
//!   `modules`).
//! - A connection bound to a module never also backs an available device:
//!   `register` removes the connection's available entries in the same call,
//!   and `announce` refuses bound connections.
//!
//! A session classified as a module that never gains an identity (no
//! `register`, no live `announce`) is an *idle module session*; the
//! heartbeat sweep closes those once they have been silent too long.
//!
//! The registry is plain data.  It never sends frames or closes handles; the
//! hub does that with the values returned here, while still holding the core
//! lock.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use locker_core::{classify, AvailableDeviceView, ClientHint, ConnectionRole, MessageKind};
use thiserror::Error;

use crate::domain::{ConnectionHandle, ConnectionId};

/// Errors returned by registry mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The connection was never attached, or has already been unbound.
    #[error("connection {0} is not attached")]
    UnknownConnection(ConnectionId),

    /// The connection already carries a module identity.
    #[error("connection {connection_id} is already bound to module {module_id}")]
    BoundConnection {
        connection_id: ConnectionId,
        module_id: String,
    },
}

// ── Entries ───────────────────────────────────────────────────────────────────

/// A registered module and the connection it lives on.
#[derive(Debug, Clone)]
pub struct ModuleConnection {
    pub module_id: String,
    pub handle: ConnectionHandle,
    /// Unix epoch milliseconds of the last heartbeat (or of registration).
    pub last_heartbeat: u64,
}

/// A device that announced itself and waits to be paired.
#[derive(Debug, Clone)]
pub struct AvailableModule {
    pub mac_address: String,
    pub handle: ConnectionHandle,
    pub device_info: String,
    pub version: String,
    pub capabilities: u32,
    pub discovered_at: u64,
    pub last_seen: u64,
}

impl AvailableModule {
    /// Observer-facing projection without the connection handle.
    pub fn view(&self) -> AvailableDeviceView {
        AvailableDeviceView {
            mac_address: self.mac_address.clone(),
            device_info: self.device_info.clone(),
            version: self.version.clone(),
            capabilities: self.capabilities,
            discovered_at: self.discovered_at,
            last_seen: self.last_seen,
        }
    }
}

/// Payload of an `announce` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceInfo {
    pub mac_address: String,
    pub device_info: String,
    pub version: String,
    pub capabilities: u32,
}

/// Whether an announcement added a device or refreshed a known one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceOutcome {
    Discovered,
    Refreshed,
}

/// What a `register` changed.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    /// The connection that held this module id before, if it was a
    /// different one.
    pub superseded: Option<ConnectionHandle>,
    /// The module id this connection carried before, if it differed.
    pub previous_module_id: Option<String>,
    /// Available devices that were backed by this connection and left the
    /// available set.
    pub promoted_macs: Vec<String>,
}

/// What an `unbind` removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unbound {
    pub module_id: Option<String>,
    pub removed_macs: Vec<String>,
    pub was_observer: bool,
    pub was_attached: bool,
}

impl Unbound {
    /// `true` when the connection was already gone.
    pub fn is_noop(&self) -> bool {
        !self.was_attached && self.module_id.is_none() && self.removed_macs.is_empty()
    }
}

#[derive(Debug)]
struct Session {
    handle: ConnectionHandle,
    role: ConnectionRole,
    hint: ClientHint,
    /// Last attach or inbound message, milliseconds since the epoch.
    last_activity: u64,
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// In-memory registry of connections, modules and available devices.
///
/// # Map choice
///
/// Module lookups by id are `HashMap`s (O(1)).  The available set is a
/// `BTreeMap` so the list broadcast to observers is ordered by MAC address
/// and two broadcasts of the same set are identical.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: HashMap<ConnectionId, Session>,
    modules: HashMap<String, ModuleConnection>,
    module_by_connection: HashMap<ConnectionId, String>,
    available: BTreeMap<String, AvailableModule>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Sessions and roles ────────────────────────────────────────────────────

    /// Adds a freshly accepted connection and gives it its initial role.
    ///
    /// Attaching an id twice keeps the original session.
    pub fn attach(
        &mut self,
        handle: ConnectionHandle,
        hint: ClientHint,
        now: u64,
    ) -> ConnectionRole {
        let session = self.sessions.entry(handle.id()).or_insert_with(|| Session {
            role: classify(ConnectionRole::Unclassified, hint, None),
            handle,
            hint,
            last_activity: now,
        });
        session.role
    }

    pub fn role(&self, connection_id: ConnectionId) -> Option<ConnectionRole> {
        self.sessions.get(&connection_id).map(|s| s.role)
    }

    /// Applies the classifier to an incoming message kind.
    ///
    /// Returns `(previous, current)` role.  Moving to `Module` takes the
    /// connection out of the observer broadcast set.  Every call counts as
    /// activity on the session.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownConnection`] if the connection is not attached.
    pub fn reclassify(
        &mut self,
        connection_id: ConnectionId,
        kind: MessageKind,
        now: u64,
    ) -> Result<(ConnectionRole, ConnectionRole), RegistryError> {
        let session = self
            .sessions
            .get_mut(&connection_id)
            .ok_or(RegistryError::UnknownConnection(connection_id))?;
        session.last_activity = session.last_activity.max(now);
        let previous = session.role;
        session.role = classify(previous, session.hint, Some(kind));
        Ok((previous, session.role))
    }

    pub fn handle(&self, connection_id: ConnectionId) -> Option<&ConnectionHandle> {
        self.sessions.get(&connection_id).map(|s| &s.handle)
    }

    /// Handles of every observer connection that is still open.
    pub fn observers(&self) -> Vec<ConnectionHandle> {
        self.sessions
            .values()
            .filter(|s| s.role == ConnectionRole::Observer && s.handle.is_open())
            .map(|s| s.handle.clone())
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Open module sessions with no module id and no available entry whose
    /// last activity is more than `idle_after` in the past.
    ///
    /// The sessions stay attached; the caller closes the handles and the
    /// normal detach path removes them.
    pub fn idle_module_sessions(&self, now: u64, idle_after: Duration) -> Vec<ConnectionHandle> {
        let limit = duration_ms(idle_after);
        let backing: BTreeSet<ConnectionId> =
            self.available.values().map(|d| d.handle.id()).collect();
        self.sessions
            .iter()
            .filter(|(id, s)| {
                s.role == ConnectionRole::Module
                    && s.handle.is_open()
                    && !self.module_by_connection.contains_key(id)
                    && !backing.contains(id)
                    && now.saturating_sub(s.last_activity) > limit
            })
            .map(|(_, s)| s.handle.clone())
            .collect()
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    /// Records an announcement from an unbound connection.
    ///
    /// A known MAC keeps its `discovered_at`; `last_seen`, the handle and the
    /// device details are refreshed.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownConnection`] if the connection is not attached.
    /// - [`RegistryError::BoundConnection`] if it already carries a module id.
    pub fn announce(
        &mut self,
        connection_id: ConnectionId,
        info: AnnounceInfo,
        now: u64,
    ) -> Result<AnnounceOutcome, RegistryError> {
        let handle = self
            .sessions
            .get(&connection_id)
            .map(|s| s.handle.clone())
            .ok_or(RegistryError::UnknownConnection(connection_id))?;
        if let Some(module_id) = self.module_by_connection.get(&connection_id) {
            return Err(RegistryError::BoundConnection {
                connection_id,
                module_id: module_id.clone(),
            });
        }

        match self.available.get_mut(&info.mac_address) {
            Some(entry) => {
                entry.handle = handle;
                entry.device_info = info.device_info;
                entry.version = info.version;
                entry.capabilities = info.capabilities;
                entry.last_seen = now;
                Ok(AnnounceOutcome::Refreshed)
            }
            None => {
                self.available.insert(
                    info.mac_address.clone(),
                    AvailableModule {
                        mac_address: info.mac_address,
                        handle,
                        device_info: info.device_info,
                        version: info.version,
                        capabilities: info.capabilities,
                        discovered_at: now,
                        last_seen: now,
                    },
                );
                Ok(AnnounceOutcome::Discovered)
            }
        }
    }

    pub fn available(&self, mac_address: &str) -> Option<&AvailableModule> {
        self.available.get(mac_address)
    }

    /// Removes and returns an available device.
    pub fn take_available(&mut self, mac_address: &str) -> Option<AvailableModule> {
        self.available.remove(mac_address)
    }

    /// Removes every available device whose `last_seen` is more than
    /// `stale_after` in the past.
    pub fn evict_stale_available(
        &mut self,
        now: u64,
        stale_after: Duration,
    ) -> Vec<AvailableModule> {
        let limit = duration_ms(stale_after);
        let stale: Vec<String> = self
            .available
            .values()
            .filter(|d| now.saturating_sub(d.last_seen) > limit)
            .map(|d| d.mac_address.clone())
            .collect();
        stale
            .iter()
            .filter_map(|mac| self.available.remove(mac))
            .collect()
    }

    /// Snapshot of the available set, ordered by MAC address.
    pub fn available_views(&self) -> Vec<AvailableDeviceView> {
        self.available.values().map(AvailableModule::view).collect()
    }

    // ── Modules ───────────────────────────────────────────────────────────────

    /// Binds a connection to `module_id`.
    ///
    /// Any other connection holding `module_id` is replaced and returned in
    /// [`Registration::superseded`].  Available entries backed by this
    /// connection are removed in the same step, so the device is never both
    /// available and registered.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownConnection`] if the connection is not attached.
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        module_id: &str,
        now: u64,
    ) -> Result<Registration, RegistryError> {
        let session = self
            .sessions
            .get_mut(&connection_id)
            .ok_or(RegistryError::UnknownConnection(connection_id))?;
        session.role = ConnectionRole::Module;
        let handle = session.handle.clone();

        let mut registration = Registration::default();

        // This connection changes identity.
        if let Some(previous) = self.module_by_connection.get(&connection_id).cloned() {
            if previous != module_id {
                self.modules.remove(&previous);
                registration.previous_module_id = Some(previous);
            }
        }

        // Another connection loses this identity.
        if let Some(existing) = self.modules.get(module_id) {
            if existing.handle.id() != connection_id {
                self.module_by_connection.remove(&existing.handle.id());
                registration.superseded = Some(existing.handle.clone());
            }
        }

        self.modules.insert(
            module_id.to_string(),
            ModuleConnection {
                module_id: module_id.to_string(),
                handle,
                last_heartbeat: now,
            },
        );
        self.module_by_connection
            .insert(connection_id, module_id.to_string());

        registration.promoted_macs = self.remove_available_for(connection_id);
        Ok(registration)
    }

    /// Removes every trace of a connection.
    ///
    /// Safe to call any number of times; later calls return an
    /// [`Unbound`] for which `is_noop()` is `true`.
    pub fn unbind(&mut self, connection_id: ConnectionId) -> Unbound {
        let session = self.sessions.remove(&connection_id);
        let module_id = self
            .module_by_connection
            .remove(&connection_id)
            .and_then(|module_id| {
                let owned = self
                    .modules
                    .get(&module_id)
                    .is_some_and(|m| m.handle.id() == connection_id);
                owned.then(|| {
                    self.modules.remove(&module_id);
                    module_id
                })
            });

        Unbound {
            module_id,
            removed_macs: self.remove_available_for(connection_id),
            was_observer: session
                .as_ref()
                .is_some_and(|s| s.role == ConnectionRole::Observer),
            was_attached: session.is_some(),
        }
    }

    /// Records a heartbeat from the module bound to `connection_id`.
    ///
    /// Returns the module id, or `None` if the connection has no module
    /// identity.
    pub fn touch_heartbeat(&mut self, connection_id: ConnectionId, now: u64) -> Option<&str> {
        let module_id = self.module_by_connection.get(&connection_id)?;
        let module = self.modules.get_mut(module_id)?;
        module.last_heartbeat = now;
        Some(module.module_id.as_str())
    }

    /// `true` if `module_id` is bound to a connection that is still open.
    pub fn is_online(&self, module_id: &str) -> bool {
        self.modules
            .get(module_id)
            .is_some_and(|m| m.handle.is_open())
    }

    pub fn online_module_ids(&self) -> BTreeSet<String> {
        self.modules
            .values()
            .filter(|m| m.handle.is_open())
            .map(|m| m.module_id.clone())
            .collect()
    }

    pub fn module(&self, module_id: &str) -> Option<&ModuleConnection> {
        self.modules.get(module_id)
    }

    pub fn module_handle(&self, module_id: &str) -> Option<&ConnectionHandle> {
        self.modules.get(module_id).map(|m| &m.handle)
    }

    pub fn module_id_of(&self, connection_id: ConnectionId) -> Option<&str> {
        self.module_by_connection
            .get(&connection_id)
            .map(String::as_str)
    }

    /// `(module_id, handle)` for every registered module.
    pub fn module_handles(&self) -> Vec<(String, ConnectionHandle)> {
        self.modules
            .values()
            .map(|m| (m.module_id.clone(), m.handle.clone()))
            .collect()
    }

    /// Removes every module whose last heartbeat is more than `timeout` in
    /// the past.  The sessions stay attached until their socket closes.
    pub fn evict_expired_modules(&mut self, now: u64, timeout: Duration) -> Vec<ModuleConnection> {
        let limit = duration_ms(timeout);
        let expired: Vec<String> = self
            .modules
            .values()
            .filter(|m| now.saturating_sub(m.last_heartbeat) > limit)
            .map(|m| m.module_id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|module_id| {
                let module = self.modules.remove(module_id)?;
                self.module_by_connection.remove(&module.handle.id());
                Some(module)
            })
            .collect()
    }

    fn remove_available_for(&mut self, connection_id: ConnectionId) -> Vec<String> {
        let macs: Vec<String> = self
            .available
            .values()
            .filter(|d| d.handle.id() == connection_id)
            .map(|d| d.mac_address.clone())
            .collect();
        for mac in &macs {
            self.available.remove(mac);
        }
        macs
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
