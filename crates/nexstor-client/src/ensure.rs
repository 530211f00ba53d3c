//! Idempotent create and destroy
//!
//! Cleanup paths and repeated provisioning treat "already gone" and "already
//! there" as success. These helpers make that explicit: the outcome says
//! whether the call changed anything, and every other error still propagates.

use crate::error::Result;
use tracing::debug;

/// `Ok(true)` if the resource was destroyed now, `Ok(false)` if it was already gone
pub fn ensure_destroyed(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_not_found() => {
            debug!(error = %err, "resource already absent");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// `Ok(true)` if the resource was created now, `Ok(false)` if it already existed
pub fn ensure_created(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_already_exists() => {
            debug!(error = %err, "resource already present");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use nexstor_common::{ApplianceError, ErrorCode};

    fn appliance(code: ErrorCode) -> Error {
        Error::Appliance(ApplianceError::new(code, "scripted"))
    }

    #[test]
    fn test_ensure_destroyed() {
        assert!(ensure_destroyed(Ok(())).unwrap());
        let missing = appliance(ErrorCode::NotFound);
        assert!(!ensure_destroyed(Err(missing)).unwrap());
        let busy = appliance(ErrorCode::Busy);
        assert!(ensure_destroyed(Err(busy)).unwrap_err().is_busy());
        assert!(
            ensure_destroyed(Err(appliance(ErrorCode::AlreadyExists)))
                .unwrap_err()
                .is_already_exists()
        );
    }

    #[test]
    fn test_ensure_created() {
        assert!(ensure_created(Ok(())).unwrap());
        let existing = appliance(ErrorCode::AlreadyExists);
        assert!(!ensure_created(Err(existing)).unwrap());
        assert!(
            ensure_created(Err(appliance(ErrorCode::NotFound)))
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            ensure_created(Err(Error::invalid_argument("empty name")))
                .unwrap_err()
                .is_validation()
        );
    }
}
