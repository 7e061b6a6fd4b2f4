use std::backtrace::Backtrace;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use crate::status::HttpStatus;

/// Error-domain tag stamped on every structured error response that does
/// not declare its own.
pub const ERROR_KIND: &str = "polyroute";

/// Construction- and bind-time failures. These are fatal: they bubble to
/// whoever wired the controller, never into a request response.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("wrong handler for {action}")]
    Handler { action: String },

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A request-time failure on its way to becoming a structured response.
///
/// Anything a handler can fail with is normalized into this shape; the
/// controller's `set_res_error` turns it into the uniform
/// `{type, status, error, message, details}` body.
#[derive(Debug, Clone)]
pub struct ActionError {
    /// Error-domain tag, `ERROR_KIND` unless the producer set its own.
    pub kind: String,
    /// Attached status; absence routes the error through `parse_error`.
    pub http_status: Option<HttpStatus>,
    /// Machine-readable error token, if any.
    pub error: Option<Value>,
    pub message: Option<String>,
    pub details: Option<Value>,
    /// Captured stack text, used only for diagnostics logging.
    pub stack: Option<String>,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        ActionError {
            kind: ERROR_KIND.to_string(),
            http_status: None,
            error: None,
            message: Some(message.into()),
            details: None,
            stack: Some(Backtrace::force_capture().to_string()),
        }
    }

    /// The generic internal error synthesized when a handler fails with
    /// nothing usable.
    pub fn internal() -> Self {
        ActionError::new(HttpStatus::INTERNAL_SERVER_ERROR.reason)
            .status(HttpStatus::INTERNAL_SERVER_ERROR)
    }

    pub fn with_status(status: HttpStatus, message: impl Into<String>) -> Self {
        ActionError::new(message).status(status)
    }

    /// Wrap an arbitrary value that is not an error. A string becomes the
    /// message; an object contributes its `message` and `details` fields;
    /// anything else lands in `details` whole.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(message) => ActionError::new(message),
            Value::Object(ref map) => {
                let mut err = match map.get("message").and_then(Value::as_str) {
                    Some(message) => ActionError::new(message.to_string()),
                    None => {
                        let mut e = ActionError::new("");
                        e.message = None;
                        e
                    }
                };
                err.details = map.get("details").cloned();
                err
            }
            other => {
                let mut err = ActionError::new("");
                err.message = None;
                err.details = Some(other);
                err
            }
        }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn status(mut self, status: HttpStatus) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn error_value(mut self, error: Value) -> Self {
        self.error = Some(error);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Resolved status code and uniform response body, used by transports
    /// that must answer at their own boundary (unknown route, failed auth
    /// gate) in the same shape the controller produces.
    pub fn to_response(&self) -> (u16, Value) {
        let status = self
            .http_status
            .unwrap_or(HttpStatus::INTERNAL_SERVER_ERROR)
            .code;
        let message = self
            .message
            .clone()
            .or_else(|| HttpStatus::reason_for(status).map(str::to_string));
        let body = json!({
            "type": self.kind,
            "status": status,
            "error": self.error,
            "message": message,
            "details": self.details,
        });
        (status, body)
    }
}

/// Hook consulted when an error reaches translation with no attached
/// status: may contribute any part of the structured response.
pub type ParseErrorFn =
    Arc<dyn Fn(&ActionError) -> Option<ErrorPatch> + Send + Sync>;

/// Partial response contributed by a `ParseErrorFn`.
#[derive(Debug, Clone, Default)]
pub struct ErrorPatch {
    pub kind: Option<String>,
    pub status: Option<StatusPatch>,
    pub error: Option<Value>,
    pub message: Option<String>,
    pub details: Option<Value>,
}

/// A patch status is either a bare numeric code or a status descriptor;
/// both collapse to the numeric code in the response.
#[derive(Debug, Clone, Copy)]
pub enum StatusPatch {
    Code(u16),
    Status(HttpStatus),
}

impl StatusPatch {
    pub fn code(self) -> u16 {
        match self {
            StatusPatch::Code(code) => code,
            StatusPatch::Status(status) => status.code,
        }
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}", message),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ActionError {}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        ActionError::new(message)
    }
}

impl From<&str> for ActionError {
    fn from(message: &str) -> Self {
        ActionError::new(message)
    }
}
