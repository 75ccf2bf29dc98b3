//! Validation errors for incoming events

use thiserror::Error;

/// Reasons an untrusted payload cannot become an [`EventEnvelope`](crate::EventEnvelope)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("body must be a JSON object")]
    NotAnObject,

    #[error("field `{0}` is required")]
    MissingField(&'static str),

    #[error("field `{field}` must be a string")]
    InvalidType { field: &'static str },

    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    #[error("field `timestamp` must be an ISO-8601 date-time with a UTC offset: {0}")]
    InvalidTimestamp(String),
}

impl ValidationError {
    /// Name of the offending field, if the error is tied to one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField(field) | Self::EmptyField(field) => Some(field),
            Self::InvalidType { field } => Some(field),
            Self::InvalidTimestamp(_) => Some("timestamp"),
            Self::MalformedJson(_) | Self::NotAnObject => None,
        }
    }

    /// Whether the body itself could not be parsed (as opposed to a schema violation)
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedJson(_))
    }
}
