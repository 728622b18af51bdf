//! # Message Envelope
//!
//! The wire format every Bus Port publish wraps a payload in: a JSON body
//! plus the header set named in spec §6 ("Message headers on every
//! outbound record").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Headers attached to every outbound record (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageHeaders {
    #[serde(rename = "x-request-id", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "x-correlation-id", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(rename = "x-user-id", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "x-assignment-id", skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    #[serde(rename = "x-service-name")]
    pub service_name: String,
    #[serde(rename = "x-timestamp-ms")]
    pub timestamp_ms: i64,
}

impl MessageHeaders {
    pub fn new(service_name: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            request_id: None,
            correlation_id: None,
            user_id: None,
            assignment_id: None,
            service_name: service_name.into(),
            timestamp_ms,
        }
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_assignment_id(mut self, assignment_id: impl Into<String>) -> Self {
        self.assignment_id = Some(assignment_id.into());
        self
    }
}

/// A published record: JSON body plus headers, as it travels over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    pub headers: MessageHeaders,
    pub body: serde_json::Value,
}

impl BusMessage {
    pub fn new(headers: MessageHeaders, body: serde_json::Value) -> Self {
        Self { headers, body }
    }
}
