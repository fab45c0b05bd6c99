//! Error types for the gateway protocol core.
//!
//! Everything here is raised locally, before any network exchange.

use std::fmt;

use crate::environment::Environment;

/// Errors produced by the protocol core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required request field is missing or invalid.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The operation is not available in the current environment.
    #[error("{0}")]
    UnsupportedMode(#[from] UnsupportedModeError),

    /// A base URL or endpoint path could not be turned into a URL.
    #[error("invalid gateway URL `{url}`: {source}")]
    Url {
        /// The offending input.
        url: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// A gateway XML document could not be parsed.
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// A required field is missing or carries a value the gateway rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation, when a single field is to blame.
    pub field: Option<String>,
    /// Human-readable reason.
    pub reason: String,
}

impl ValidationError {
    /// Creates a validation error that is not tied to a single field.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            field: None,
            reason: reason.into(),
        }
    }

    /// Creates the error reported when `field` is absent or empty.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            reason: format!("missing required field `{field}`"),
            field: Some(field),
        }
    }

    /// Creates the error reported when `field` holds a value outside `allowed`.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, value: &str, allowed: &[&str]) -> Self {
        let field = field.into();
        Self {
            reason: format!(
                "field `{field}` has unsupported value `{value}`, expected one of: {}",
                allowed.join(", ")
            ),
            field: Some(field),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed: {}", self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// The requested operation is invalid for the client's environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedModeError {
    /// Logical name of the operation.
    pub operation: String,
    /// Environment the client is running against.
    pub environment: Environment,
    /// Why the combination is refused.
    pub reason: String,
}

impl UnsupportedModeError {
    /// Creates a new unsupported-mode error.
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        environment: Environment,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            environment,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for UnsupportedModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` is not supported in {} mode: {}",
            self.operation, self.environment, self.reason
        )
    }
}

impl std::error::Error for UnsupportedModeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_the_field() {
        let err = ValidationError::missing("out_trade_no");
        assert_eq!(err.field.as_deref(), Some("out_trade_no"));
        assert_eq!(
            err.to_string(),
            "validation failed: missing required field `out_trade_no`"
        );
    }

    #[test]
    fn invalid_value_lists_allowed_values() {
        let err = ValidationError::invalid_value("bill_type", "NOPE", &["ALL", "SUCCESS"]);
        assert!(err.to_string().contains("expected one of: ALL, SUCCESS"));
    }

    #[test]
    fn unsupported_mode_display() {
        let err = UnsupportedModeError::new(
            "downloadfundflow",
            Environment::Sandbox,
            "HMAC-SHA256 signing is unavailable",
        );
        assert_eq!(
            err.to_string(),
            "`downloadfundflow` is not supported in sandbox mode: HMAC-SHA256 signing is unavailable"
        );
    }
}
