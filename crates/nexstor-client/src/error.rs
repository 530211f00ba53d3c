//! Error types for the appliance client

use nexstor_common::ApplianceError;
use nexstor_common::types::{InvalidTxg, ResourcePathError};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Client error
///
/// Validation errors are raised before any request is sent. Appliance
/// failures are either classified (the body carried a symbolic code) or
/// unclassified (raw status and body kept for diagnosis).
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid resource path '{path}': {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: ResourcePathError,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to decode response of {context}: {source}")]
    Decode {
        context: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    InvalidTxg(#[from] InvalidTxg),

    #[error(transparent)]
    Appliance(#[from] ApplianceError),

    #[error("{context}: appliance returned {status} without an error description: {body}")]
    Unclassified {
        context: String,
        status: u16,
        body: String,
    },

    #[error("login response carries no token: {body}")]
    MissingToken { body: String },

    #[error("job {job_id} did not finish within {timeout:?}")]
    JobTimeout { job_id: String, timeout: Duration },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn transport(
        url: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Transport {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Wrap an error with a description of the operation that failed
    pub fn context(context: impl Into<String>, source: Self) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Classified appliance error, looking through added context
    ///
    /// For diagnosis only: a wrapped error describes a failed sub-step, not
    /// the outcome of the operation, so the `is_*` predicates ignore it.
    #[must_use]
    pub fn appliance(&self) -> Option<&ApplianceError> {
        match self {
            Self::Appliance(err) => Some(err),
            Self::Context { source, .. } => source.appliance(),
            _ => None,
        }
    }

    /// Whether this error is itself a classified appliance error
    #[must_use]
    pub const fn is_appliance_error(&self) -> bool {
        matches!(self, Self::Appliance(_))
    }

    const fn classified(&self) -> Option<&ApplianceError> {
        match self {
            Self::Appliance(err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.classified().is_some_and(ApplianceError::is_not_found)
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.classified()
            .is_some_and(ApplianceError::is_already_exists)
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.classified().is_some_and(ApplianceError::is_busy)
    }

    /// Authentication failure, classified or a bare 401
    #[must_use]
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Unclassified { status, .. } => *status == 401,
            _ => self.classified().is_some_and(ApplianceError::is_auth),
        }
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::InvalidPath { .. })
    }

    #[must_use]
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Context { source, .. } => source.is_transport(),
            _ => false,
        }
    }
}

/// Turn a non-success response into an error
///
/// A body with the appliance error shape becomes [`Error::Appliance`];
/// anything else keeps the raw status and body.
#[must_use]
pub fn classify(context: &str, status: u16, body: &[u8]) -> Error {
    ApplianceError::parse(body).map_or_else(
        || Error::Unclassified {
            context: context.to_string(),
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        },
        Error::Appliance,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexstor_common::ErrorCode;

    #[test]
    fn test_classify_parses_appliance_body() {
        let err = classify(
            "DELETE storage/filesystems/p%2Ffs",
            500,
            br#"{"code":"EBUSY","message":"Dataset has snapshots"}"#,
        );
        assert!(err.is_busy());
        assert!(err.is_appliance_error());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_classify_keeps_raw_status_and_body() {
        let err = classify("GET storage/pools", 502, b"Bad Gateway");
        match &err {
            Error::Unclassified {
                context,
                status,
                body,
            } => {
                assert_eq!(context, "GET storage/pools");
                assert_eq!(*status, 502);
                assert_eq!(body, "Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_appliance_error());
        assert!(err.to_string().contains("Bad Gateway"));
    }

    #[test]
    fn test_predicates_stop_at_context() {
        let err = Error::context(
            "failed to promote clone 'p/clone'",
            Error::Appliance(ApplianceError::new(ErrorCode::NotFound, "gone")),
        );
        assert!(!err.is_not_found());
        assert!(!err.is_appliance_error());
        assert_eq!(err.appliance().map(|e| e.code.as_str()), Some("ENOENT"));
        assert!(err.to_string().starts_with("failed to promote clone"));

        let err = Error::context("login", classify("login", 401, b""));
        assert!(!err.is_auth());
    }

    #[test]
    fn test_auth_predicate() {
        assert!(classify("login", 401, b"").is_auth());
        assert!(classify("login", 401, br#"{"code":"EAUTH"}"#).is_auth());
        assert!(!classify("login", 500, b"").is_auth());
    }

    #[test]
    fn test_validation_predicate() {
        assert!(Error::invalid_argument("limit").is_validation());
        assert!(!Error::transport("http://x", "refused").is_validation());
        assert!(Error::transport("http://x", "refused").is_transport());
    }
}
