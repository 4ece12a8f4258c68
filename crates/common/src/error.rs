//! Error types for the environment contract

use thiserror::Error;

/// Result type alias using [`EnvironmentError`]
pub type Result<T> = std::result::Result<T, EnvironmentError>;

/// One variant per violated pre-flight check. Every variant names the offending key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("{key} is required")]
    Missing { key: &'static str },

    #[error("{key} must not be empty")]
    Empty { key: &'static str },

    #[error("{key} must be an http(s) URL, got {value:?}")]
    InvalidUrl { key: &'static str, value: String },

    #[error("{key} must contain {fragment:?}, got {value:?}")]
    WrongHost {
        key: &'static str,
        fragment: String,
        value: String,
    },

    #[error("{key} must be a number, got {value:?}")]
    NotNumeric { key: &'static str, value: String },

    #[error("{key} must be greater than 0, got {value}")]
    NotPositive { key: &'static str, value: i64 },

    #[error("{key} must be at most {max}, got {value}")]
    TooLarge { key: &'static str, value: i64, max: usize },

    #[error("{key} must be \"true\" or \"false\", got {value:?}")]
    InvalidFlag { key: &'static str, value: String },
}

impl EnvironmentError {
    /// The configuration key this error is about
    pub fn key(&self) -> &'static str {
        match self {
            Self::Missing { key }
            | Self::Empty { key }
            | Self::InvalidUrl { key, .. }
            | Self::WrongHost { key, .. }
            | Self::NotNumeric { key, .. }
            | Self::NotPositive { key, .. }
            | Self::TooLarge { key, .. }
            | Self::InvalidFlag { key, .. } => key,
        }
    }
}
