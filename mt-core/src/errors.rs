//! # Errors (Feathers-style)
//!
//! mt-core provides a Feathers-inspired set of structured errors.
//! Core goals:
//! - consistent status codes + class names
//! - can be carried through anyhow::Error (for the hook pipeline)
//! - transport-agnostic (the HTTP crate decides how to serialize)
//!
//! Two kinds are specific to tenancy enforcement:
//! - `DataScopeViolation`: a tenant reached for data outside its ownership
//!   boundary, or a tenant-only collection was used from global context.
//! - `Configuration`: the caller misused the tenancy API (for example asking
//!   for the current tenant on the primary domain).
//!
//! Silent refusals are not errors and never show up here; see
//! [`crate::hooks::Decision`].

use std::fmt;

use anyhow::Error as AnyError;
use serde_json::Value;

/// A convenience result type for mt-core APIs.
pub type MtResult<T> = std::result::Result<T, AnyError>;

/// Default message of a data scope violation raised without one.
pub const DATA_SCOPE_VIOLATION: &str = "DataScopeViolation";

/// Feathers-ish error class names + status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,         // 400
    NotAuthenticated,   // 401
    Forbidden,          // 403
    NotFound,           // 404
    MethodNotAllowed,   // 405
    Conflict,           // 409
    Unprocessable,      // 422
    GeneralError,       // 500
    NotImplemented,     // 501
    Unavailable,        // 503
    DataScopeViolation, // 400
    Configuration,      // 500
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotAuthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::MethodNotAllowed => 405,
            ErrorKind::Conflict => 409,
            ErrorKind::Unprocessable => 422,
            ErrorKind::GeneralError => 500,
            ErrorKind::NotImplemented => 501,
            ErrorKind::Unavailable => 503,
            ErrorKind::DataScopeViolation => 400,
            ErrorKind::Configuration => 500,
        }
    }

    /// Feathers error `name` (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotAuthenticated => "NotAuthenticated",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::MethodNotAllowed => "MethodNotAllowed",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Unprocessable => "Unprocessable",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::NotImplemented => "NotImplemented",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::DataScopeViolation => "DataScopeViolation",
            ErrorKind::Configuration => "ConfigurationError",
        }
    }

    /// Feathers error `className` (kebab-cased)
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::NotAuthenticated => "not-authenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::MethodNotAllowed => "method-not-allowed",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unprocessable => "unprocessable",
            ErrorKind::GeneralError => "general-error",
            ErrorKind::NotImplemented => "not-implemented",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::DataScopeViolation => "data-scope-violation",
            ErrorKind::Configuration => "configuration-error",
        }
    }
}

/// A structured error that can live inside `anyhow::Error`.
///
/// Mirrors Feathers-style fields:
/// - name
/// - message
/// - code (HTTP status, overridable per error)
/// - class_name
/// - data (optional)
#[derive(Debug)]
pub struct MtError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub data: Option<Value>,
    pub source: Option<AnyError>,
}

impl MtError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            data: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    /// Override the status code reported for this error.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn code(&self) -> u16 {
        self.status.unwrap_or_else(|| self.kind.status_code())
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Convert into `anyhow::Error` so it flows through the hook pipeline.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Find an `MtError` anywhere in an `anyhow::Error` chain.
    pub fn from_anyhow(err: &AnyError) -> Option<&MtError> {
        err.chain().find_map(|e| e.downcast_ref::<MtError>())
    }

    /// Turn any error into an MtError:
    /// - if it's already an MtError, keep it (lossless)
    /// - otherwise wrap as GeneralError
    pub fn normalize(err: AnyError) -> MtError {
        match err.downcast::<MtError>() {
            Ok(mt) => mt,
            Err(other) => MtError::new(ErrorKind::GeneralError, other.to_string()).with_source(other),
        }
    }

    /// A "safe" copy suitable for returning to clients: drops the inner `source`.
    pub fn sanitize_for_client(&self) -> MtError {
        MtError {
            kind: self.kind,
            message: self.message.clone(),
            status: self.status,
            data: self.data.clone(),
            source: None,
        }
    }

    /// Feathers-ish JSON payload.
    pub fn to_json(&self) -> Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        base
    }

    // ---- Constructors (Feathers-style) ----

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn method_not_allowed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MethodNotAllowed, msg)
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unprocessable, msg)
    }
    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }

    /// An unauthorized cross-tenant operation. An empty message becomes
    /// `"DataScopeViolation"`.
    pub fn data_scope_violation(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let msg = if msg.is_empty() {
            DATA_SCOPE_VIOLATION.to_string()
        } else {
            msg
        };
        Self::new(ErrorKind::DataScopeViolation, msg)
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, msg)
    }
}

impl fmt::Display for MtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for MtError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// True when `err` carries an [`MtError`] of the given kind.
pub fn is_kind(err: &AnyError, kind: ErrorKind) -> bool {
    MtError::from_anyhow(err).is_some_and(|e| e.is_kind(kind))
}
