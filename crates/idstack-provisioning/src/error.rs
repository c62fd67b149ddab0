//! Error types for tenant provisioning

use crate::compensation::Compensation;
use crate::platform::Operation;
use thiserror::Error;

/// Failure reported by the identity platform.
///
/// The `code` is the platform's own error code (`EntityAlreadyExists`,
/// `ResourceNotFoundException`, `AccessDenied`, ...). It is carried through
/// untouched: nothing in this crate retries or classifies platform errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {code}: {message}")]
pub struct PlatformError {
    /// Remote call that failed
    pub operation: Operation,
    /// Platform error code
    pub code: String,
    /// Human readable detail
    pub message: String,
}

impl PlatformError {
    /// Create a platform error
    pub fn new(operation: Operation, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Platform error code
    pub fn code(&self) -> &str {
        &self.code
    }
}

/// Result type for platform calls
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Tenant provisioning error
#[derive(Error, Debug)]
pub enum ProvisioningError {
    /// Request rejected before any remote call was made
    #[error("invalid request: {0}")]
    Validation(String),

    /// A step failed and every recorded compensation ran successfully
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// A step failed, then one of the compensations failed as well.
    ///
    /// Unwinding stops at the failing compensation; `pending` holds the
    /// compensations that were never attempted, newest first.
    #[error("rollback failed: {rollback}")]
    RollbackFailed {
        /// Error that triggered the rollback
        #[source]
        cause: PlatformError,
        /// Error raised by the failing compensation
        rollback: PlatformError,
        /// Compensations left unexecuted
        pending: Vec<Compensation>,
    },
}

impl ProvisioningError {
    /// The error that made provisioning fail in the first place
    pub fn original(&self) -> Option<&PlatformError> {
        match self {
            Self::Validation(_) => None,
            Self::Platform(e) => Some(e),
            Self::RollbackFailed { cause, .. } => Some(cause),
        }
    }

    /// The platform error surfaced to the caller.
    ///
    /// For a failed rollback this is the compensation's error, not the
    /// triggering one.
    pub fn platform_error(&self) -> Option<&PlatformError> {
        match self {
            Self::Validation(_) => None,
            Self::Platform(e) => Some(e),
            Self::RollbackFailed { rollback, .. } => Some(rollback),
        }
    }

    /// Whether a partially created stack existed and was fully torn down.
    ///
    /// `false` for a rejected request: nothing was created.
    pub fn rolled_back(&self) -> bool {
        matches!(self, Self::Platform(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_platform_error_display() {
        let err = PlatformError::new(Operation::CreatePolicy, "EntityAlreadyExists", "policy exists");
        assert_eq!(err.to_string(), "CreatePolicy failed: EntityAlreadyExists: policy exists");
        assert_eq!(err.code(), "EntityAlreadyExists");
    }

    #[test]
    fn test_rollback_failure_keeps_both_errors() {
        let cause = PlatformError::new(Operation::CreatePolicy, "AlreadyExists", "boom");
        let rollback = PlatformError::new(Operation::DeleteIdentityPool, "AccessDenied", "nope");
        let err = ProvisioningError::RollbackFailed {
            cause: cause.clone(),
            rollback: rollback.clone(),
            pending: vec![],
        };

        assert_eq!(err.platform_error(), Some(&rollback));
        assert_eq!(err.original(), Some(&cause));
        assert!(err.to_string().contains("DeleteIdentityPool"));
        assert_eq!(err.source().map(|s| s.to_string()), Some(cause.to_string()));
        assert!(!err.rolled_back());
    }

    #[test]
    fn test_rolled_back_only_after_teardown() {
        let cause = PlatformError::new(Operation::CreateRole, "EntityAlreadyExists", "role exists");
        assert!(ProvisioningError::Platform(cause).rolled_back());
        assert!(!ProvisioningError::Validation("tenant id is empty".into()).rolled_back());
    }
}
