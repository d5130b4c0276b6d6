//! Connection role classification.
//!
//! Devices and dashboards share one listening endpoint, so every connection
//! starts without a role.  The role is decided by a pure transition function:
//!
//! ```text
//!              hint = module                 module-originated kind
//! Unclassified ───────────────► Module ◄─────────────────────────── Observer
//!      │                                                              ▲
//!      └──────────────────── anything else ──────────────────────────┘
//! ```
//!
//! An explicit transport hint always wins.  Without one, the connection is an
//! observer until the first module-originated message arrives.  The move from
//! observer to module is one-directional: a module never becomes an observer
//! again.

use crate::protocol::messages::MessageKind;

/// Role hint declared by the client at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientHint {
    Module,
    Observer,
    #[default]
    Unspecified,
}

impl ClientHint {
    /// Interprets a declared client type such as `module` or `web`.
    ///
    /// Matching is case-insensitive; unrecognised values yield
    /// [`ClientHint::Unspecified`].
    pub fn from_declared(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "module" | "device" | "esp32" => ClientHint::Module,
            "web" | "observer" | "dashboard" | "admin" => ClientHint::Observer,
            _ => ClientHint::Unspecified,
        }
    }

    /// Derives the hint from the parts of a WebSocket upgrade request.
    ///
    /// Precedence: the `X-Client-Type` header, then a `clientType` / `client`
    /// query parameter, then a request path ending in `/module`.
    pub fn from_request(path: &str, query: Option<&str>, header: Option<&str>) -> Self {
        if let Some(declared) = header.map(Self::from_declared) {
            if declared != ClientHint::Unspecified {
                return declared;
            }
        }

        let from_query = query
            .into_iter()
            .flat_map(|q| q.split('&'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "clientType" || *key == "client")
            .map(|(_, value)| Self::from_declared(value))
            .unwrap_or_default();
        if from_query != ClientHint::Unspecified {
            return from_query;
        }

        if path.trim_end_matches('/').ends_with("/module") {
            return ClientHint::Module;
        }
        ClientHint::Unspecified
    }
}

/// The role a connection currently plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionRole {
    #[default]
    Unclassified,
    Module,
    Observer,
}

/// Computes the next role of a connection.
///
/// `kind` is `None` when the connection has just opened and no message has
/// arrived yet.  The function is total and never moves a module back to
/// observer.
pub fn classify(
    current: ConnectionRole,
    hint: ClientHint,
    kind: Option<MessageKind>,
) -> ConnectionRole {
    if current == ConnectionRole::Module || hint == ClientHint::Module {
        return ConnectionRole::Module;
    }
    match kind {
        Some(kind) if kind.is_module_originated() => ConnectionRole::Module,
        _ => ConnectionRole::Observer,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
