//! Envelope type, validation, and wire encoding

use crate::error::ValidationError;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A validated analytics event
///
/// `timestamp` is normalized to UTC on construction so envelopes compare and
/// sort by instant regardless of the offset the client sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub site_id: String,
    pub event_type: String,
    pub path: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Build an envelope from already-typed parts, enforcing the field invariants
    pub fn new(
        site_id: impl Into<String>,
        event_type: impl Into<String>,
        path: impl Into<String>,
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let envelope = Self {
            site_id: site_id.into(),
            event_type: event_type.into(),
            path: path.into(),
            user_id: user_id.into(),
            timestamp,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Parse and validate an untrusted request body
    ///
    /// Errors name the first violated field in wire order.
    pub fn from_request_body(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let site_id = required_string(object, "site_id")?;
        let event_type = required_string(object, "event_type")?;
        let path = required_string(object, "path")?;
        let user_id = required_string(object, "user_id")?;
        let timestamp = parse_timestamp(&required_string(object, "timestamp")?)?;

        Self::new(site_id, event_type, path, user_id, timestamp)
    }

    /// Check the invariants that typed construction cannot express
    pub fn validate(&self) -> Result<()> {
        if self.site_id.trim().is_empty() {
            return Err(ValidationError::EmptyField("site_id"));
        }
        Ok(())
    }

    /// Encode to the queue wire form (flat JSON object, RFC 3339 timestamp)
    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a queue item produced by [`EventEnvelope::to_wire`]
    pub fn from_wire(payload: &str) -> std::result::Result<Self, DecodeError> {
        let envelope: Self = serde_json::from_str(payload)?;
        envelope.validate()?;
        Ok(envelope)
    }
}

/// Failure to turn a queue item back into an envelope
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("invalid wire payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decoded envelope is invalid: {0}")]
    Invalid(#[from] ValidationError),
}

fn required_string(object: &Map<String, Value>, field: &'static str) -> Result<String> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::InvalidType { field }),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ValidationError::InvalidTimestamp(format!("{raw:?} ({e})")))
}
