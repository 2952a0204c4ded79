//! Envelope codec
//!
//! Builds outbound envelopes around a fresh server header and decodes
//! inbound text into an [`Envelope`]. Pure: no shared state beyond the
//! immutable [`ServerIdentity`].

use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::Error as _;
use serde_json::Value;

use crate::error::AppError;
use crate::message::{Envelope, Header, Payload, DEFAULT_SOURCE};

/// Sender class written into every server-built header
pub const SERVER_KIND: &str = "Server";

/// Process-wide server identity, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    /// `S_{creation_ms}_{version}`
    pub id: String,
    pub version: String,
    /// Human-readable system/service name
    pub system: String,
}

impl ServerIdentity {
    pub fn new(version: impl Into<String>, system: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            id: format!("S_{}_{}", now_millis(), version),
            version,
            system: system.into(),
        }
    }
}

/// Milliseconds since the Unix epoch (0 if the clock is before it)
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct Codec {
    identity: ServerIdentity,
}

impl Codec {
    pub fn new(identity: ServerIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Build a fresh header
    ///
    /// Not cached: two headers built in the same millisecond share a
    /// `messageID`.
    pub fn header(&self) -> Header {
        let timestamp = now_millis();
        Header {
            from_id: self.identity.id.clone(),
            timestamp,
            version: self.identity.version.clone(),
            kind: SERVER_KIND.to_string(),
            active: true,
            message_id: timestamp,
            recipients: Vec::new(),
            system: self.identity.system.clone(),
        }
    }

    /// Wrap `payload` in a fresh header and serialize it to wire text
    pub fn encode(&self, payload: &Payload) -> Result<String, AppError> {
        let envelope = Envelope {
            header: self.header(),
            payload: payload.clone(),
            kind: None,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Parse wire text into an envelope
    ///
    /// Fails with [`AppError::MalformedEnvelope`] when the text is not JSON
    /// or `payload` is missing or not an object. A missing `payload.source`
    /// is filled with `"default"`.
    pub fn decode(&self, raw: &str) -> Result<Envelope, AppError> {
        let value: Value = serde_json::from_str(raw).map_err(AppError::MalformedEnvelope)?;

        match value.get("payload") {
            Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(AppError::MalformedEnvelope(serde_json::Error::custom(
                    "payload is not an object",
                )))
            }
            None => {
                return Err(AppError::MalformedEnvelope(serde_json::Error::custom(
                    "missing field `payload`",
                )))
            }
        }

        let mut envelope: Envelope =
            serde_json::from_value(value).map_err(AppError::MalformedEnvelope)?;
        if envelope.payload.source.is_none() {
            envelope.payload.source = Some(DEFAULT_SOURCE.to_string());
        }
        Ok(envelope)
    }
}
