//! # Error Types
//!
//! Failure taxonomy for test environment setup and teardown.
//!
//! The harness performs no local recovery: every failure aborts the current
//! test case and is reported upward with a message identifying the resource
//! and test involved. The only tolerated failures are transient fetch errors
//! during a readiness wait, and only until the wait budget is exhausted.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the harness.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while provisioning or tearing down a test environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The address backend failed to allocate. Allocation failures are not
    /// expected to be transient, so the setup aborts without retrying.
    #[error("address allocation failed for {test_name}: {source}")]
    Allocation {
        /// Test case the allocation belonged to.
        test_name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A resource the setup requires was not established before the suite
    /// started (e.g. the simulator singleton).
    #[error("required dependency {name} not found")]
    DependencyNotFound {
        /// Human-readable identity of the missing dependency.
        name: String,
    },

    /// A readiness wait exhausted its full budget.
    #[error("{what} was not ready after {timeout:?}")]
    ReadinessTimeout {
        /// Identity of the object that never became ready.
        what: String,
        /// Budget that was exhausted.
        timeout: Duration,
    },

    /// The base config file is missing or malformed.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The per-test config overlay could not be persisted.
    #[error("failed to write config {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Claim release failed. An unreleased claim is an address leak and is
    /// never swallowed, even when the test body already failed.
    #[error("cleanup failed for {test_name}: {source}")]
    Cleanup {
        /// Test case whose claims leaked.
        test_name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The test body returned an error.
    #[error("test body failed: {0}")]
    Body(#[source] anyhow::Error),

    /// Setup or the test body failed, and teardown failed as well. Both
    /// failures must stay visible.
    #[error("{failure}; cleanup also failed: {cleanup}")]
    CleanupAfterFailure {
        /// The original setup or body failure.
        failure: Box<Error>,
        /// The teardown failure that followed it.
        cleanup: anyhow::Error,
    },

    /// The harness refused to start another test case after an earlier
    /// cleanup failure under [`crate::setup::CleanupPolicy::Halt`].
    #[error("test environment halted after an earlier cleanup failure")]
    Halted,

    /// Kubernetes API error outside the claim and cleanup paths.
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl Error {
    /// Create a `DependencyNotFound` error for the given dependency.
    pub fn dependency_not_found(name: impl Into<String>) -> Self {
        Self::DependencyNotFound { name: name.into() }
    }

    /// Create a `ReadinessTimeout` error for the given subject.
    pub fn readiness_timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Self::ReadinessTimeout {
            what: what.into(),
            timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_error_names_the_test_case() {
        let err = Error::Allocation {
            test_name: "quick-start".to_string(),
            source: anyhow::anyhow!("pool exhausted"),
        };
        assert!(err.to_string().contains("quick-start"));
        assert!(err.to_string().contains("pool exhausted"));
    }

    #[test]
    fn readiness_timeout_names_the_subject_and_budget() {
        let err = Error::readiness_timeout(
            "TestEnvironment default/quick-start",
            Duration::from_secs(30),
        );
        assert!(err.to_string().contains("TestEnvironment default/quick-start"));
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn cleanup_after_failure_keeps_both_failures_visible() {
        let err = Error::CleanupAfterFailure {
            failure: Box::new(Error::Body(anyhow::anyhow!("assertion failed"))),
            cleanup: anyhow::anyhow!("leaked address claims: e2e-ipam/quick-start-node-ip"),
        };
        let message = err.to_string();
        assert!(message.contains("assertion failed"));
        assert!(message.contains("leaked address claims"));
    }

    #[test]
    fn dependency_not_found_is_a_hard_setup_error() {
        let err = Error::dependency_not_found("Simulator");
        assert_eq!(err.to_string(), "required dependency Simulator not found");
    }
}
