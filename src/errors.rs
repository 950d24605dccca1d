use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias for fallible results across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Structured validation error raised before any network or connector call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Names of declared-required fields absent from the input, when that is
    /// what failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
            missing: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Build the uniform missing-required-parameters error. The message
    /// enumerates every missing field name.
    pub fn missing_fields(missing: Vec<String>) -> Self {
        Self {
            message: format!("missing required parameters: {}", missing.join(", ")),
            field: None,
            missing,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "{}: {}", field, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Error returned when a plugin id is not present in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginNotFoundError {
    pub plugin: String,
    pub available: Vec<String>,
}

impl fmt::Display for PluginNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.available.is_empty() {
            write!(f, "unknown plugin: '{}'. No plugins registered.", self.plugin)
        } else {
            write!(
                f,
                "unknown plugin: '{}'. Available: {}",
                self.plugin,
                self.available.join(", ")
            )
        }
    }
}

impl std::error::Error for PluginNotFoundError {}

/// Error returned when a known plugin has no action with the given name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionNotFoundError {
    pub plugin: String,
    pub action: String,
    pub available: Vec<String>,
}

impl fmt::Display for ActionNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.available.is_empty() {
            write!(
                f,
                "unsupported action: '{}'. Plugin '{}' declares no actions.",
                self.action, self.plugin
            )
        } else {
            write!(
                f,
                "unsupported action: '{}' for plugin '{}'. Available: {}",
                self.action,
                self.plugin,
                self.available.join(", ")
            )
        }
    }
}

impl std::error::Error for ActionNotFoundError {}

/// Failure surfaced by the wrapped vendor API, carrying the vendor's own
/// message and, where available, the HTTP status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamError {
    /// Human-readable integration label, e.g. "GitHub API" or "S3 Storage".
    pub plugin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    /// Raw response body for debugging (when available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
}

impl UpstreamError {
    pub fn new(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            status: None,
            code: None,
            message: message.into(),
            raw_body: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} error ({}): {}", self.plugin, status, self.message),
            None => write!(f, "{} error: {}", self.plugin, self.message),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Transport-level error (timeouts, DNS/TLS/connectivity).
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<reqwest::Error>,
}

/// Broad transport error kinds for classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Other => "transport",
        };
        write!(f, "{label}")
    }
}

/// Unified error type surfaced by dispatch and the service modules.
///
/// Callers branch on the variant, never on message text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    PluginNotFound(#[from] PluginNotFoundError),

    #[error("{0}")]
    ActionNotFound(#[from] ActionNotFoundError),

    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
