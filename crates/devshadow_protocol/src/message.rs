//! Shadow message methods and inbound message decoding.

use crate::ack::AckCode;
use crate::error::{ProtocolError, ProtocolResult};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// Keys of the message envelope that never name an attribute.
pub const ENVELOPE_KEYS: &[&str] = &["method", "clientToken", "version", "timestamp", "payload"];

/// The `method` field of a shadow message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Report attribute values.
    Update,
    /// Request the whole document.
    Get,
    /// Remove attributes from the document.
    Delete,
    /// Acknowledgment of a request.
    Reply,
    /// Desired state pushed by the cloud.
    Control,
}

impl Method {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Update => "update",
            Method::Get => "get",
            Method::Delete => "delete",
            Method::Reply => "reply",
            Method::Control => "control",
        }
    }

    /// Parses a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "update" => Some(Method::Update),
            "get" => Some(Method::Get),
            "delete" => Some(Method::Delete),
            "reply" => Some(Method::Reply),
            "control" => Some(Method::Control),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ReplyPayload {
    status: Option<String>,
    content: Option<ErrorContent>,
}

#[derive(Debug, Deserialize)]
struct ErrorContent {
    errorcode: Option<Value>,
}

/// A decoded message received on the shadow topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    document: Map<String, Value>,
}

impl InboundMessage {
    /// Parses raw message bytes.
    pub fn parse(bytes: &[u8]) -> ProtocolResult<Self> {
        match serde_json::from_slice(bytes)? {
            Value::Object(document) => Ok(Self { document }),
            _ => Err(ProtocolError::invalid_structure("expected a JSON object")),
        }
    }

    /// Returns the raw `method` value.
    pub fn method_name(&self) -> Option<&str> {
        self.document.get("method").and_then(Value::as_str)
    }

    /// Returns the parsed method, if known.
    pub fn method(&self) -> Option<Method> {
        self.method_name().and_then(Method::from_name)
    }

    /// Returns the correlation token.
    pub fn client_token(&self) -> Option<&str> {
        self.document.get("clientToken").and_then(Value::as_str)
    }

    /// Returns the document version, if present.
    pub fn version(&self) -> Option<u64> {
        self.document.get("version").and_then(as_u64_lenient)
    }

    /// Returns the cloud timestamp, if present.
    pub fn timestamp(&self) -> Option<u64> {
        self.document.get("timestamp").and_then(as_u64_lenient)
    }

    /// Returns the `payload` object, if present.
    pub fn payload(&self) -> Option<&Value> {
        self.document.get("payload")
    }

    /// Decodes the acknowledgment outcome of a reply.
    ///
    /// `payload.status` of `success` maps to [`AckCode::Success`]; `error`
    /// maps to `payload.content.errorcode`. A bare numeric top-level `code`
    /// is accepted as well.
    pub fn ack_code(&self) -> AckCode {
        if let Some(payload) = self.payload() {
            if let Ok(reply) = ReplyPayload::deserialize(payload) {
                match reply.status.as_deref() {
                    Some("success") => return AckCode::Success,
                    Some("error") => {
                        return reply
                            .content
                            .and_then(|c| c.errorcode)
                            .as_ref()
                            .and_then(as_i32_lenient)
                            .map(AckCode::from_wire)
                            .unwrap_or(AckCode::InvalidReply);
                    }
                    _ => {}
                }
            }
        }

        self.document
            .get("code")
            .and_then(as_i32_lenient)
            .map(AckCode::from_wire)
            .unwrap_or(AckCode::InvalidReply)
    }

    /// Returns the desired-state entries carried by the message.
    ///
    /// `payload.state.desired` is preferred. A control message without it is
    /// read flat: every top-level key outside the envelope is an entry.
    pub fn desired_entries(&self) -> Vec<(&str, &Value)> {
        if let Some(desired) = self.payload().and_then(desired_state) {
            return desired.iter().map(|(k, v)| (k.as_str(), v)).collect();
        }

        if self.method() != Some(Method::Control) {
            return Vec::new();
        }

        self.document
            .iter()
            .filter(|(k, _)| !ENVELOPE_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }
}

/// Returns `state.desired` of a reply or control payload.
pub fn desired_state(payload: &Value) -> Option<&Map<String, Value>> {
    payload.get("state")?.get("desired")?.as_object()
}

/// Reads a payload's `clientToken` without decoding the rest of the message.
pub fn extract_client_token(bytes: &[u8]) -> ProtocolResult<String> {
    #[derive(Deserialize)]
    struct TokenOnly {
        #[serde(rename = "clientToken")]
        client_token: Option<String>,
    }

    let parsed: TokenOnly = serde_json::from_slice(bytes)?;
    parsed
        .client_token
        .ok_or(ProtocolError::MissingField("clientToken"))
}

fn as_u64_lenient(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_i32_lenient(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
