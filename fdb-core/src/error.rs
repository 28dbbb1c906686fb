//! FoundationDB operator error abstractions.

use std::time::Duration;

use thiserror::Error;

/// Application error variants.
#[derive(Debug, Error)]
pub enum AppError {
    /// A call to the object store or to the database's admin interface failed, but may succeed
    /// if retried.
    #[error("transient error: {0}")]
    Transient(anyhow::Error),
    /// An optimistic-concurrency write was rejected because the stored object changed since it
    /// was fetched.
    #[error("write conflict: {0}")]
    Conflict(String),
    /// The requested resource was not found.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    /// Not enough eligible processes to satisfy the selection constraints.
    #[error("could only select {chosen} processes, but {desired} are required")]
    ConstraintUnsatisfiable { desired: usize, chosen: usize },
    /// The desired process counts could not be computed from the cluster spec.
    #[error("invalid cluster spec: {0}")]
    InvalidSpec(String),
    /// The cluster did not reach the target state before the deadline.
    #[error("timed out after {0:?} waiting for reconciliation")]
    Timeout(Duration),
    /// An invalid combination of options was given.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl AppError {
    /// Check if this error is expected to clear up on its own when the operation is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Conflict(_) | Self::ResourceNotFound(_))
    }
}

impl From<kube::Error> for AppError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(api_err) if api_err.code == http::StatusCode::CONFLICT => Self::Conflict(api_err.message),
            kube::Error::Api(api_err) if api_err.code == http::StatusCode::NOT_FOUND => Self::ResourceNotFound(api_err.message),
            err => Self::Transient(err.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(AppError::Transient(anyhow::anyhow!("boom")).is_transient());
        assert!(AppError::Conflict("stale".into()).is_transient());
        assert!(AppError::ResourceNotFound("fdb".into()).is_transient());
        assert!(!AppError::InvalidSpec("bad".into()).is_transient());
        assert!(!AppError::ConstraintUnsatisfiable { desired: 3, chosen: 2 }.is_transient());
        assert!(!AppError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!AppError::Configuration("bad".into()).is_transient());
    }

    #[test]
    fn kube_conflict_maps_to_conflict() {
        let err = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".into(),
            message: "the object has been modified".into(),
            reason: "Conflict".into(),
            code: 409,
        });
        let err = AppError::from(err);
        assert!(matches!(err, AppError::Conflict(_)), "expected a conflict error, got {:?}", err);
    }
}
