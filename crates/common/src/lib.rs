//! shopcheck common library
//!
//! The environment contract every run is gated on, plus the project and outcome
//! vocabulary shared by the harness crates.

pub mod env;
pub mod error;
pub mod types;

pub use env::{Credentials, EnvSnapshot, EnvironmentConfig, Validator};
pub use error::{EnvironmentError, Result};
pub use types::{Outcome, ProjectKind};

/// shopcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
