//! Unified application error model and mapping helpers.
//! One error enum is shared by the repository layer and the HTTP frontend,
//! with a stable machine-readable code per condition and a mapper to HTTP
//! status codes. Field-validation failures are aggregated, so one round trip
//! reports every violation in a request rather than the first.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A single field-validation failure with a stable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub code: String,
    pub message: String,
}

impl Violation {
    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Violation { code: code.into(), message: message.into() }
    }
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// One or more request fields failed validation. Carries every violation.
    InvalidInput { code: String, message: String, violations: Vec<Violation> },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Unauthorized { code: String, message: String },
    Forbidden { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::InvalidInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Unauthorized { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::InvalidInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Unauthorized { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    /// Single-field invalid input.
    pub fn invalid<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        Self::invalid_many(vec![Violation::new(code, msg)])
    }

    /// Aggregate of every validation failure in one request.
    pub fn invalid_many(violations: Vec<Violation>) -> Self {
        let message = violations
            .iter()
            .map(|v| v.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        AppError::InvalidInput { code: "invalid-input".into(), message, violations }
    }

    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::NotFound { code: code.into(), message: msg.into() }
    }
    pub fn conflict<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Conflict { code: code.into(), message: msg.into() }
    }
    pub fn unauthorized<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Unauthorized { code: code.into(), message: msg.into() }
    }
    pub fn forbidden<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Forbidden { code: code.into(), message: msg.into() }
    }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Internal { code: code.into(), message: msg.into() }
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            AppError::InvalidInput { violations, .. } => violations,
            _ => &[],
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::InvalidInput { .. } => 400,
            AppError::Unauthorized { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::invalid("bad-input", "oops").http_status(), 400);
        assert_eq!(AppError::unauthorized("unauthenticated", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("insufficient-level", "no").http_status(), 403);
        assert_eq!(AppError::not_found("user-not-found", "missing").http_status(), 404);
        assert_eq!(AppError::conflict("login-in-use", "dup").http_status(), 409);
        assert_eq!(AppError::internal("hash-failure", "boom").http_status(), 500);
    }

    #[test]
    fn aggregated_violations_join_messages() {
        let err = AppError::invalid_many(vec![
            Violation::new("name-empty", "name cannot be empty"),
            Violation::new("login-empty", "login cannot be empty"),
        ]);
        assert_eq!(err.code_str(), "invalid-input");
        assert_eq!(err.violations().len(), 2);
        assert_eq!(err.message(), "name cannot be empty; login cannot be empty");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn serializes_with_type_tag() {
        let err = AppError::not_found("session-not-found", "session not found");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "not_found");
        assert_eq!(json["code"], "session-not-found");
    }
}
