//! Wire contract between remote loggers and the aggregation server.
//!
//! Transport is newline-delimited JSON over TCP: one request per line,
//! answered by one response line. Every request carries the caller's
//! credential metadata next to the entry payload, so the server can gate
//! each request before touching it.

use crate::types::Entry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata keys every request must carry exactly once
pub const METADATA_KEYS: [&str; 4] = ["service", "instance", "token", "ip"];

/// A single log submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRequest {
    /// Credential metadata: `service`, `instance`, `token`, `ip`
    pub metadata: HashMap<String, String>,
    /// The column-keyed entry
    pub entry: Entry,
}

/// Acknowledgment of a log submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogResponse {
    /// Whether the entry was accepted
    pub ok: bool,
    /// Failure description, absent on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogResponse {
    /// An accepting acknowledgment
    pub fn ack() -> Self {
        LogResponse {
            ok: true,
            error: None,
        }
    }

    /// A rejecting acknowledgment
    pub fn nack(error: impl Into<String>) -> Self {
        LogResponse {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Per-request credentials attached by a remote logger
#[derive(Debug, Clone)]
pub struct TokenCredentials {
    /// Service name
    pub service: String,
    /// Instance name
    pub instance: String,
    /// Access token issued by the server
    pub token: String,
    /// Caller's own IP address
    pub ip: String,
}

impl TokenCredentials {
    /// The request metadata these credentials expand to
    pub fn metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            ("service".to_string(), self.service.clone()),
            ("instance".to_string(), self.instance.clone()),
            ("token".to_string(), self.token.clone()),
            ("ip".to_string(), self.ip.clone()),
        ])
    }
}
