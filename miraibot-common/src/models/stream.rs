// File: miraibot-common/src/models/stream.rs

use std::fmt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An inbound notification from the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "threadID", default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(rename = "senderID", default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Everything else the platform sent along.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StreamMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            thread_id: None,
            sender_id: None,
            body: None,
            extra: Map::new(),
        }
    }
}

/// An error delivered by (or about) the realtime channel.
///
/// `code` carries a structured identifier when the transport or platform
/// exposes one; `payload` keeps the raw error object for diagnosis and for
/// signature matching.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamError {
    pub code: Option<String>,
    pub message: String,
    pub payload: Value,
}

impl StreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            payload: Value::Null,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Builds an error from a platform error object such as
    /// `{"error": 1357001, "errorSummary": "Not logged in."}`.
    pub fn from_payload(payload: Value) -> Self {
        let code = match payload.get("error").or_else(|| payload.get("code")) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let message = ["errorSummary", "message", "error_description", "description"]
            .iter()
            .find_map(|k| payload.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string());
        Self { code, message, payload }
    }

    /// The raw error rendered as one string, used as the haystack for
    /// signature matching.
    pub fn raw(&self) -> String {
        let mut raw = self.message.clone();
        if let Some(code) = &self.code {
            raw.push(' ');
            raw.push_str(code);
        }
        if !self.payload.is_null() {
            raw.push(' ');
            raw.push_str(&self.payload.to_string());
        }
        raw
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for StreamError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClassification {
    /// Momentary transport failure; reopen the channel.
    Transient,
    /// Anti-automation warning; needs a clearance request first.
    Challenge,
    /// The platform dropped the login; only re-authentication helps.
    SessionInvalid,
    Unknown,
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClassification::Transient => write!(f, "transient"),
            ErrorClassification::Challenge => write!(f, "challenge"),
            ErrorClassification::SessionInvalid => write!(f, "session-invalid"),
            ErrorClassification::Unknown => write!(f, "unknown"),
        }
    }
}

/// Lifecycle of the stream supervisor, published for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Connecting,
    Listening,
    Recovering,
    Rotating,
    Stopped,
}

/// Why `StreamSupervisor::run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The shared cancellation token fired.
    Cancelled,
    /// The platform reported "not logged in"; a fresh login is required.
    SessionInvalidated,
    /// A challenge was raised and clearing it failed.
    ChallengeFailed,
}
