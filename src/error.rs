//! Unified application error model and mapping helpers.
//! One error enum shared by the server and client flows, with a mapper to
//! HTTP status codes for the server's response path.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Config { code: String, message: String },
    Auth { code: String, message: String },
    Network { code: String, message: String },
    Io { code: String, message: String },
    Integrity { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Config { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Network { code, .. }
            | AppError::Io { code, .. }
            | AppError::Integrity { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Config { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Network { message, .. }
            | AppError::Io { message, .. }
            | AppError::Integrity { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn config<S: Into<String>>(code: S, msg: S) -> Self { AppError::Config { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn network<S: Into<String>>(code: S, msg: S) -> Self { AppError::Network { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn integrity<S: Into<String>>(code: S, msg: S) -> Self { AppError::Integrity { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Config { .. } => 500,
            AppError::Auth { .. } => 403,
            AppError::Network { .. } => 502,
            AppError::Io { .. } => 503,
            AppError::Integrity { .. } => 502,
            AppError::Internal { .. } => 500,
        }
    }

    /// Whether the client run may retry the specific failing operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Network { .. } | AppError::Integrity { .. })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: format!("{err:#}") }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io { code: "io_error".into(), message: err.to_string() }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network { code: "network_error".into(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::auth("auth_failed", "no").http_status(), 403);
        assert_eq!(AppError::config("bad_salt", "short").http_status(), 500);
        assert_eq!(AppError::network("timeout", "slow peer").http_status(), 502);
        assert_eq!(AppError::io("io_error", "disk").http_status(), 503);
        assert_eq!(AppError::internal("oops", "bug").http_status(), 500);
    }

    #[test]
    fn retryability() {
        assert!(AppError::network("timeout", "slow").is_retryable());
        assert!(AppError::integrity("hash_mismatch", "corrupt").is_retryable());
        assert!(!AppError::auth("auth_failed", "no").is_retryable());
        assert!(!AppError::config("bad_salt", "short").is_retryable());
    }

    #[test]
    fn display_includes_code_and_message() {
        let e = AppError::integrity("hash_mismatch", "digest differs");
        assert_eq!(e.to_string(), "hash_mismatch: digest differs");
    }
}
