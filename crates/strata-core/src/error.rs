//! Error types shared across the Strata workspace

use serde_json::Value;
use std::borrow::Cow;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy. Each kind corresponds to one HTTP status when an error
/// reaches the route layer; the mapping itself lives in the server crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed filter, bad envelope, missing required field, validation failure
    BadRequest,
    /// Absent or invalid principal claims
    Unauthenticated,
    /// ACL denial, protected-model mutation without elevation
    Forbidden,
    /// Record, schema, or model not found
    NotFound,
    /// Unique-constraint collision
    Conflict,
    /// Unsupported operation or operator
    Unprocessable,
    /// Adapter errors and unclassified failures
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Unprocessable => "UNPROCESSABLE",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Main error type for Strata operations.
///
/// Every error carries a stable string `code` suitable for clients to match
/// on, a human-readable message, and an optional structured `details` value
/// (e.g. the per-constraint list produced by record validation).
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub code: Cow<'static, str>,
    pub message: String,
    pub details: Option<Value>,
}

impl Error {
    pub fn new(
        kind: ErrorKind,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, code, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, "UNAUTHENTICATED", message)
    }

    pub fn forbidden(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, code, message)
    }

    pub fn not_found(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    pub fn conflict(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, message)
    }

    pub fn unprocessable(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unprocessable, code, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "INTERNAL", message)
    }

    /// Record lookup produced no rows where one was demanded
    pub fn record_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, "RECORD_NOT_FOUND", message)
    }

    /// Schema registry lookup missed (missing or soft-deleted entry)
    pub fn schema_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::NotFound,
            "SCHEMA_NOT_FOUND",
            format!("schema not found: {name}"),
        )
    }

    pub fn model_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::NotFound,
            "MODEL_NOT_FOUND",
            format!("model not found: {name}"),
        )
    }

    /// Mutation of a `status = 'system'` model without the elevation claim
    pub fn model_requires_sudo(name: &str) -> Self {
        Self::new(
            ErrorKind::Forbidden,
            "MODEL_REQUIRES_SUDO",
            format!("model '{name}' is a system model and requires elevation"),
        )
    }

    pub fn model_protected(name: &str) -> Self {
        Self::new(
            ErrorKind::Forbidden,
            "MODEL_PROTECTED",
            format!("model '{name}' is protected and cannot be modified"),
        )
    }

    pub fn validation_failed(message: impl Into<String>, details: Value) -> Self {
        Self::new(ErrorKind::BadRequest, "VALIDATION_FAILED", message).with_details(details)
    }

    pub fn unsupported_operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unprocessable, "UNSUPPORTED_OPERATION", message)
    }

    /// Driver failure surfaced through the SQL adapter; the original driver
    /// message is preserved verbatim.
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "ADAPTER_ERROR", message)
    }

    /// Transaction scope misuse (double begin, commit without begin)
    pub fn transaction_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "TRANSACTION_STATE", message)
    }

    /// Check if the error is a not found error
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Check if the error is a validation-class error
    pub fn is_bad_request(&self) -> bool {
        self.kind == ErrorKind::BadRequest
    }

    pub fn is_forbidden(&self) -> bool {
        self.kind == ErrorKind::Forbidden
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request("INVALID_JSON", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display_includes_code() {
        let err = Error::record_not_found("no such record");
        assert_eq!(err.to_string(), "[RECORD_NOT_FOUND] no such record");
    }

    #[test]
    fn test_kind_predicates() {
        assert!(Error::schema_not_found("account").is_not_found());
        assert!(Error::model_requires_sudo("schemas").is_forbidden());
        assert!(Error::bad_request("FILTER_INVALID_FIELD", "bad field").is_bad_request());
        assert!(!Error::adapter("boom").is_not_found());
    }

    #[test]
    fn test_details_attach() {
        let err = Error::validation_failed("3 constraints failed", json!([{"field": "email"}]));
        assert_eq!(err.code, "VALIDATION_FAILED");
        assert!(err.details.is_some());
    }
}
