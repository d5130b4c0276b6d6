//! JSON codec for the shared module/observer endpoint.
//!
//! Wire format: one JSON object per WebSocket text frame, discriminated by its
//! `"type"` field.
//!
//! Decoding is done in two steps so the hub can tell the two failure classes
//! apart:
//!
//! 1. Parse the frame as a generic JSON value and read `"type"`.  Anything that
//!    is not an object with a string `"type"` is [`ProtocolError::Malformed`].
//! 2. If `"type"` is outside [`MessageKind`], the frame is
//!    [`ProtocolError::UnknownKind`] (logged and dropped by the hub).  Otherwise
//!    the payload is deserialized into [`InboundMsg`]; a shape mismatch is again
//!    `Malformed` (answered with an `error` frame).

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use thiserror::Error;

use crate::protocol::messages::{InboundMsg, MessageKind, OutboundMsg};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The frame is not a JSON object with a string `"type"`, or its payload
    /// does not match the declared kind.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The `"type"` discriminant is not part of the protocol.
    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    /// An outbound message could not be serialized.
    #[error("failed to encode {kind} frame: {reason}")]
    Encode { kind: &'static str, reason: String },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one inbound text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownKind`] for a well-formed object with an
/// unrecognised `"type"`, and [`ProtocolError::Malformed`] for everything
/// else that cannot be turned into an [`InboundMsg`].
///
/// # Examples
///
/// ```rust
/// use locker_core::protocol::{decode_inbound, InboundMsg};
///
/// let msg = decode_inbound(r#"{"type":"register","moduleId":"mod-1"}"#).unwrap();
/// assert_eq!(msg, InboundMsg::Register { module_id: "mod-1".to_string() });
/// ```
pub fn decode_inbound(text: &str) -> Result<InboundMsg, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind,
        Some(_) => return Err(ProtocolError::Malformed("\"type\" must be a string".into())),
        None if value.is_object() => {
            return Err(ProtocolError::Malformed("missing \"type\" field".into()))
        }
        None => return Err(ProtocolError::Malformed("frame is not a JSON object".into())),
    };

    if MessageKind::from_wire(kind).is_none() {
        return Err(ProtocolError::UnknownKind(kind.clone()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Encodes an outbound message into a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.  With the types
/// in this crate that cannot happen in practice, but the error is propagated
/// rather than unwrapped.
pub fn encode_outbound(msg: &OutboundMsg) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|e| ProtocolError::Encode {
        kind: msg.type_name(),
        reason: e.to_string(),
    })
}

/// Returns the current time as milliseconds since the Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
