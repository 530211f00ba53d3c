//! Appliance-reported errors
//!
//! The management API reports failures as a JSON body carrying a symbolic
//! `code` (errno-style, e.g. `ENOENT`) plus a human-readable message. Only a
//! handful of codes drive control flow on the client side; everything else is
//! carried through as [`ErrorCode::Other`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbolic error code reported by the appliance
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `ENOENT`
    NotFound,
    /// `EEXIST`; on destroy this means the resource still has dependent clones
    AlreadyExists,
    /// `EBUSY`; on destroy this means snapshots exist and were not included
    Busy,
    /// `EAUTH`
    Auth,
    Other(String),
}

impl ErrorCode {
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "ENOENT" => Self::NotFound,
            "EEXIST" => Self::AlreadyExists,
            "EBUSY" => Self::Busy,
            "EAUTH" => Self::Auth,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotFound => "ENOENT",
            Self::AlreadyExists => "EEXIST",
            Self::Busy => "EBUSY",
            Self::Auth => "EAUTH",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body returned by the appliance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} [{code}]")]
pub struct ApplianceError {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
}

impl ApplianceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            name: String::new(),
            message: message.into(),
        }
    }

    /// Create a not-found error for a resource the appliance returned no record for
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Parse an error response body
    ///
    /// Returns `None` unless the body is a JSON object with a non-empty `code`.
    #[must_use]
    pub fn parse(body: &[u8]) -> Option<Self> {
        let err: Self = serde_json::from_slice(body).ok()?;
        if err.code.trim().is_empty() {
            return None;
        }
        Some(err)
    }

    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from_code(&self.code)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.error_code() == ErrorCode::NotFound
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.error_code() == ErrorCode::AlreadyExists
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.error_code() == ErrorCode::Busy
    }

    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.error_code() == ErrorCode::Auth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classified_body() {
        let err = ApplianceError::parse(
            br#"{"name":"ExistError","message":"Dataset has clones","code":"EEXIST"}"#,
        )
        .unwrap();
        assert!(err.is_already_exists());
        assert!(!err.is_busy());
        assert_eq!(err.to_string(), "Dataset has clones [EEXIST]");
    }

    #[test]
    fn test_parse_codes() {
        for (code, expected) in [
            ("ENOENT", ErrorCode::NotFound),
            ("EEXIST", ErrorCode::AlreadyExists),
            ("EBUSY", ErrorCode::Busy),
            ("EAUTH", ErrorCode::Auth),
            ("EINVAL", ErrorCode::Other("EINVAL".to_string())),
        ] {
            let body = format!(r#"{{"code":"{code}"}}"#);
            let err = ApplianceError::parse(body.as_bytes()).unwrap();
            assert_eq!(err.error_code(), expected);
            assert_eq!(err.error_code().as_str(), code);
        }
    }

    #[test]
    fn test_parse_rejects_unexpected_shapes() {
        assert!(ApplianceError::parse(b"").is_none());
        assert!(ApplianceError::parse(b"<html>502</html>").is_none());
        assert!(ApplianceError::parse(br#"{"message":"no code"}"#).is_none());
        assert!(ApplianceError::parse(br#"{"code":"  "}"#).is_none());
        assert!(ApplianceError::parse(br#"[1,2]"#).is_none());
    }

    #[test]
    fn test_not_found_constructor() {
        let err = ApplianceError::not_found("Filesystem 'p/fs' not found");
        assert!(err.is_not_found());
        assert_eq!(err.code, "ENOENT");
    }
}
