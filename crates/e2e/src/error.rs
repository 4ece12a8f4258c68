//! Error types for scenario execution

use serde::{Deserialize, Serialize};
use shopcheck_common::{EnvironmentError, ProjectKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("{operation} timed out after {bound_ms}ms: {target}")]
    Timeout {
        operation: String,
        target: String,
        bound_ms: u64,
    },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Scenario '{scenario}' belongs to project '{expected}', not '{actual}'")]
    ProjectMismatch {
        scenario: String,
        expected: ProjectKind,
        actual: ProjectKind,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Coarse classification used for retry decisions, reporting and artifact names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Environment,
    Assertion,
    Timeout,
    Navigation,
    Interaction,
    Harness,
}

impl FailureKind {
    /// File name prefix for artifacts diagnosing a failure of this kind
    pub fn artifact_prefix(&self) -> &'static str {
        match self {
            FailureKind::Environment => "environment-error",
            FailureKind::Assertion => "assertion-error",
            FailureKind::Timeout => "timeout-error",
            FailureKind::Navigation => "navigation-error",
            FailureKind::Interaction => "interaction-error",
            FailureKind::Harness => "harness-error",
        }
    }
}

impl E2eError {
    pub fn timeout(operation: impl Into<String>, target: impl Into<String>, bound: std::time::Duration) -> Self {
        E2eError::Timeout {
            operation: operation.into(),
            target: target.into(),
            bound_ms: bound.as_millis() as u64,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            E2eError::Environment(_) => FailureKind::Environment,
            E2eError::AssertionFailed(_) => FailureKind::Assertion,
            E2eError::Timeout { .. } => FailureKind::Timeout,
            E2eError::Navigation(_) => FailureKind::Navigation,
            E2eError::Interaction(_) => FailureKind::Interaction,
            E2eError::Http(e) if e.is_timeout() => FailureKind::Timeout,
            _ => FailureKind::Harness,
        }
    }

    /// Environment errors abort the run; everything else only fails the attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, E2eError::Environment(_) | E2eError::ProjectMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use test_case::test_case;

    #[test]
    fn test_timeout_message_names_bound() {
        let err = E2eError::timeout("Request", "GET /users?delay=1", Duration::from_millis(1));
        assert!(err.to_string().contains("Request timed out after 1ms"));
        assert_eq!(err.kind(), FailureKind::Timeout);
    }

    #[test_case(E2eError::Navigation("net::ERR_NAME_NOT_RESOLVED".into()), "navigation-error" ; "navigation")]
    #[test_case(E2eError::AssertionFailed("badge".into()), "assertion-error" ; "assertion")]
    #[test_case(E2eError::Interaction("element detached".into()), "interaction-error" ; "interaction")]
    #[test_case(E2eError::timeout("Click", "#login", Duration::from_millis(5)), "timeout-error" ; "timeout")]
    #[test_case(E2eError::Config("bad settings".into()), "harness-error" ; "harness")]
    fn test_kinds_pick_distinct_prefixes(err: E2eError, prefix: &str) {
        assert_eq!(err.kind().artifact_prefix(), prefix);
    }

    #[test]
    fn test_environment_errors_not_retryable() {
        let err = E2eError::from(EnvironmentError::Missing { key: "WORKERS" });
        assert!(!err.is_retryable());
        assert!(E2eError::AssertionFailed("x".into()).is_retryable());
    }
}
