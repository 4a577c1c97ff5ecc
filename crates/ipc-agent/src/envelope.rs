//! # Message Envelope
//!
//! Wire representation of one payload crossing the transport.
//!
//! ```text
//! {"channel":"ping","data":{"n":1},"isResponse":false,"isError":false}
//! ```
//!
//! `data` is omitted entirely for [`Payload::Absent`] and written as `null`
//! for `Payload::Value(Value::Null)`, so the two survive the round-trip as
//! different values. Error payloads travel as `{"name":..,"message":..}`
//! with `isError` set and are rebuilt into a [`RemoteError`] on receipt.

use crate::error::{IpcError, IpcResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Serialized form of an [`Envelope`] as handed to the transport.
pub type WireMessage = String;

/// An error-like value that can cross the transport.
///
/// Carries a type tag (`name`) and a human readable `message`, which is
/// everything the receiving side needs to rebuild it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct RemoteError {
    /// Type tag of the error (e.g. `TypeError`).
    pub name: String,
    /// Error message.
    pub message: String,
}

impl RemoteError {
    /// Tag used when the sender did not supply a more specific one.
    pub const DEFAULT_NAME: &'static str = "Error";

    /// Tag of the error sent in place of a response that could not be encoded.
    pub const SERIALIZATION_NAME: &'static str = "SerializationError";

    /// Create an error with an explicit type tag.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an error tagged with [`RemoteError::DEFAULT_NAME`].
    pub fn from_message(message: impl Into<String>) -> Self {
        Self::new(Self::DEFAULT_NAME, message)
    }

    /// Capture a local error as a remote one.
    pub fn from_error(err: &dyn std::error::Error) -> Self {
        Self::from_message(err.to_string())
    }

    /// Turn an arbitrary value into an error-like value.
    ///
    /// Objects that already carry string `name`/`message` fields are reused;
    /// strings become the message; anything else is rendered as JSON text.
    #[must_use]
    pub fn coerce(value: &Value) -> Self {
        match value {
            Value::String(message) => Self::from_message(message.clone()),
            Value::Object(fields) => {
                let message = fields.get("message").and_then(Value::as_str);
                let name = fields
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(Self::DEFAULT_NAME);
                match message {
                    Some(message) => Self::new(name, message),
                    None => Self::from_message(value.to_string()),
                }
            }
            other => Self::from_message(other.to_string()),
        }
    }

    fn to_value(&self) -> Value {
        json!({ "name": self.name, "message": self.message })
    }

    /// Rebuild an error from an error-flagged `data` field.
    fn reconstruct(channel: &str, data: Option<&Value>) -> IpcResult<Self> {
        let Some(Value::Object(fields)) = data else {
            return Err(IpcError::malformed(channel, "error payload is not an object"));
        };
        let message = fields
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| IpcError::malformed(channel, "error payload has no message"))?;
        let name = fields
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| IpcError::malformed(channel, "error payload has no name"))?;
        Ok(Self::new(name, message))
    }
}

/// Data carried by an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Payload {
    /// No payload at all, distinct from an explicit `null`.
    #[default]
    Absent,
    /// Any JSON value, `null` included.
    Value(Value),
    /// An error value.
    Error(RemoteError),
}

impl Payload {
    /// Whether there is no payload.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Whether the payload is an error value.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Borrow the JSON value, if any.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Split into the error-first shape used by node-style callbacks.
    pub fn into_result(self) -> Result<Option<Value>, RemoteError> {
        match self {
            Self::Absent => Ok(None),
            Self::Value(value) => Ok(Some(value)),
            Self::Error(err) => Err(err),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<RemoteError> for Payload {
    fn from(err: RemoteError) -> Self {
        Self::Error(err)
    }
}

impl From<Option<Value>> for Payload {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Absent, Self::Value)
    }
}

impl From<()> for Payload {
    fn from((): ()) -> Self {
        Self::Absent
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "<absent>"),
            Self::Value(value) => write!(f, "{}", value),
            Self::Error(err) => write!(f, "{}", err),
        }
    }
}

/// Keeps an explicit `"data": null` as `Some(Value::Null)`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    channel: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    data: Option<Value>,
    #[serde(default)]
    is_response: bool,
    #[serde(default)]
    is_error: bool,
}

/// One message on the wire.
///
/// `channel` is the logical topic, not the physical request/response
/// sub-channel the envelope travels on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Logical topic.
    pub channel: String,
    /// Payload.
    pub data: Payload,
    /// Whether this envelope answers a request.
    pub is_response: bool,
}

impl Envelope {
    /// Construct an envelope. The error flag is derived from `data`.
    pub fn new(channel: impl Into<String>, data: impl Into<Payload>, is_response: bool) -> Self {
        Self {
            channel: channel.into(),
            data: data.into(),
            is_response,
        }
    }

    /// Construct a request envelope.
    pub fn request(channel: impl Into<String>, data: impl Into<Payload>) -> Self {
        Self::new(channel, data, false)
    }

    /// Construct a response envelope.
    pub fn response(channel: impl Into<String>, data: impl Into<Payload>) -> Self {
        Self::new(channel, data, true)
    }

    /// Whether the payload is an error value.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.data.is_error()
    }

    /// Encode for the transport.
    ///
    /// # Errors
    ///
    /// - `IpcError::MalformedError` - error payload without a type tag
    /// - `IpcError::Serialization` - the JSON encoder failed
    pub fn serialize(&self) -> IpcResult<WireMessage> {
        let data = match &self.data {
            Payload::Absent => None,
            Payload::Value(value) => Some(value.clone()),
            Payload::Error(err) if err.name.is_empty() => {
                return Err(IpcError::malformed(&self.channel, "error payload has no name"));
            }
            Payload::Error(err) => Some(err.to_value()),
        };
        let wire = WireEnvelope {
            channel: self.channel.clone(),
            data,
            is_response: self.is_response,
            is_error: self.is_error(),
        };
        Ok(serde_json::to_string(&wire)?)
    }

    /// Decode a message received from the transport.
    ///
    /// # Errors
    ///
    /// - `IpcError::Serialization` - not a valid envelope
    /// - `IpcError::MalformedError` - `isError` set but the data cannot be
    ///   rebuilt into a [`RemoteError`]
    pub fn deserialize(wire: &str) -> IpcResult<Self> {
        let wire: WireEnvelope = serde_json::from_str(wire)?;
        let data = if wire.is_error {
            Payload::Error(RemoteError::reconstruct(&wire.channel, wire.data.as_ref())?)
        } else {
            Payload::from(wire.data)
        };
        Ok(Self {
            channel: wire.channel,
            data,
            is_response: wire.is_response,
        })
    }
}
