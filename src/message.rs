//! Message protocol definitions
//!
//! JSON envelope exchanged in both directions: a `header` describing the
//! sender and a `payload` carrying the command. Field names follow the wire
//! format exactly (`fromID`, `messageID`, `type`).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Module tag used on payloads the server originates itself
pub const CORE_MODULE: &str = "core";

/// Source assigned to decoded payloads that carry none
pub const DEFAULT_SOURCE: &str = "default";

/// Envelope header
///
/// Every field is optional on decode so that clients may omit the header
/// entirely, and a field of the wrong type falls back to its default; the
/// server always fills every field on encode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
    #[serde(rename = "fromID", deserialize_with = "lenient")]
    pub from_id: String,
    /// Milliseconds since the Unix epoch
    #[serde(deserialize_with = "lenient")]
    pub timestamp: u64,
    #[serde(deserialize_with = "lenient")]
    pub version: String,
    /// Sender class, "Server" for everything this crate emits
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub kind: String,
    #[serde(deserialize_with = "lenient")]
    pub active: bool,
    /// Equal to `timestamp` on server-built headers
    #[serde(rename = "messageID", deserialize_with = "lenient")]
    pub message_id: u64,
    #[serde(deserialize_with = "lenient")]
    pub recipients: Vec<String>,
    #[serde(deserialize_with = "lenient")]
    pub system: String,
}

/// Envelope payload
///
/// `command` is the only required field. Anything not modelled here is kept
/// in `extra` and written back out unchanged. Non-string `module`, `source`
/// and `error` values are stringified; an explicit `"data": null` survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub command: String,
    #[serde(
        default,
        deserialize_with = "stringified",
        skip_serializing_if = "Option::is_none"
    )]
    pub module: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
    #[serde(
        default,
        deserialize_with = "stringified",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<String>,
    #[serde(
        default,
        deserialize_with = "stringified",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Payload {
    /// Create a payload carrying only a command
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            module: None,
            data: None,
            source: None,
            error: None,
            extra: Map::new(),
        }
    }

    /// Create a server control payload (`module: "core"`)
    pub fn control(command: ControlCommand) -> Self {
        Self::new(command.as_str()).with_module(CORE_MODULE)
    }

    /// Set the module tag
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Attach application data
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Reserved command carried by this payload, if any
    pub fn control_command(&self) -> Option<ControlCommand> {
        ControlCommand::parse(&self.command)
    }

    /// True for `ping`/`pong`, which are too chatty to trace
    pub fn is_heartbeat(&self) -> bool {
        matches!(
            self.control_command(),
            Some(ControlCommand::Ping | ControlCommand::Pong)
        )
    }
}

/// The `{header, payload}` unit exchanged between server and connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// `null` or a non-object header reads as absent
    #[serde(default, deserialize_with = "lenient")]
    pub header: Header,
    pub payload: Payload,
    /// Legacy top-level tag some clients still send
    #[serde(
        default,
        rename = "type",
        deserialize_with = "stringified",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
}

/// Take the value if it has the expected shape, the default otherwise
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn stringified<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

/// Keeps `null` as `Some(Value::Null)`; only a missing key is `None`
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Commands interpreted by the server instead of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Ping,
    Pong,
    Disconnect,
    Error,
}

impl ControlCommand {
    /// Exact, case-sensitive match against the reserved names
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            "ping" => Some(Self::Ping),
            "pong" => Some(Self::Pong),
            "disconnect" => Some(Self::Disconnect),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Disconnect => "disconnect",
            Self::Error => "error",
        }
    }
}
