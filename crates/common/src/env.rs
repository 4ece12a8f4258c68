//! Environment contract
//!
//! The run's configuration is read from the process environment exactly once into an
//! [`EnvSnapshot`], then validated into an immutable [`EnvironmentConfig`] that every
//! other component receives explicitly. Validation stops at the first violated check
//! and reports it by key, so misconfigurations can be fixed one at a time.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{EnvironmentError, Result};
use crate::types::ProjectKind;

pub const STANDARD_USER: &str = "STANDARD_USER";
pub const STANDARD_PASSWORD: &str = "STANDARD_PASSWORD";
pub const API_BASE_URL: &str = "API_BASE_URL";
pub const UI_BASE_URL: &str = "UI_BASE_URL";
pub const HEADLESS: &str = "HEADLESS";
pub const WORKERS: &str = "WORKERS";

/// Every key the contract requires, in check order
pub const REQUIRED_KEYS: [&str; 6] = [
    STANDARD_USER,
    STANDARD_PASSWORD,
    API_BASE_URL,
    UI_BASE_URL,
    HEADLESS,
    WORKERS,
];

/// Upper bound on `WORKERS`; each worker may hold a browser process
pub const MAX_WORKERS: usize = 64;

pub const DEFAULT_API_HOST_FRAGMENT: &str = "reqres.in/api";
pub const DEFAULT_UI_HOST_FRAGMENT: &str = "saucedemo.com";

static URL_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://.+$").expect("valid regex"));

/// Raw, unvalidated view of the configuration keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the required keys from the process environment
    pub fn from_process() -> Self {
        let vars = REQUIRED_KEYS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }
}

/// Authentication identity pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub principal: String,
    secret: String,
}

impl Credentials {
    pub fn new(principal: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Validated run configuration. Constructed once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    credentials: Credentials,
    api_base_url: String,
    ui_base_url: String,
    headless: bool,
    workers: usize,
}

impl EnvironmentConfig {
    /// Snapshot the process environment and validate it with the default host fragments
    pub fn from_env() -> Result<Self> {
        Validator::default().validate(&EnvSnapshot::from_process())
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn headless(&self) -> bool {
        self.headless
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Base address of the given project kind. The env project has none.
    pub fn target(&self, kind: ProjectKind) -> Option<&str> {
        match kind {
            ProjectKind::Env => None,
            ProjectKind::Ui => Some(&self.ui_base_url),
            ProjectKind::Api => Some(&self.api_base_url),
        }
    }
}

/// Pre-flight checks turning an [`EnvSnapshot`] into an [`EnvironmentConfig`]
#[derive(Debug, Clone)]
pub struct Validator {
    api_host_fragment: String,
    ui_host_fragment: String,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            api_host_fragment: DEFAULT_API_HOST_FRAGMENT.to_string(),
            ui_host_fragment: DEFAULT_UI_HOST_FRAGMENT.to_string(),
        }
    }
}

impl Validator {
    /// Override the substrings each target address must contain
    pub fn with_host_fragments(ui: impl Into<String>, api: impl Into<String>) -> Self {
        Self {
            api_host_fragment: api.into(),
            ui_host_fragment: ui.into(),
        }
    }

    pub fn validate(&self, env: &EnvSnapshot) -> Result<EnvironmentConfig> {
        // Presence first, in declaration order, then format checks.
        for key in REQUIRED_KEYS {
            required(env, key)?;
        }

        let principal = required(env, STANDARD_USER)?;
        let secret = required(env, STANDARD_PASSWORD)?;
        let api_base_url = target_url(env, API_BASE_URL, &self.api_host_fragment)?;
        let ui_base_url = target_url(env, UI_BASE_URL, &self.ui_host_fragment)?;
        let workers = positive_count(env, WORKERS, MAX_WORKERS)?;
        let headless = flag(env, HEADLESS)?;

        debug!(workers, headless, "environment contract satisfied");

        Ok(EnvironmentConfig {
            credentials: Credentials::new(principal, secret),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            ui_base_url: ui_base_url.trim_end_matches('/').to_string(),
            headless,
            workers,
        })
    }
}

fn required<'a>(env: &'a EnvSnapshot, key: &'static str) -> Result<&'a str> {
    match env.get(key) {
        None => Err(EnvironmentError::Missing { key }),
        Some(v) if v.trim().is_empty() => Err(EnvironmentError::Empty { key }),
        Some(v) => Ok(v),
    }
}

fn target_url<'a>(env: &'a EnvSnapshot, key: &'static str, fragment: &str) -> Result<&'a str> {
    let value = required(env, key)?.trim();
    if !URL_SHAPE.is_match(value) {
        return Err(EnvironmentError::InvalidUrl {
            key,
            value: value.to_string(),
        });
    }
    if !value.contains(fragment) {
        return Err(EnvironmentError::WrongHost {
            key,
            fragment: fragment.to_string(),
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn positive_count(env: &EnvSnapshot, key: &'static str, max: usize) -> Result<usize> {
    let raw = required(env, key)?.trim();
    let value: i64 = raw.parse().map_err(|_| EnvironmentError::NotNumeric {
        key,
        value: raw.to_string(),
    })?;
    if value <= 0 {
        return Err(EnvironmentError::NotPositive { key, value });
    }
    match usize::try_from(value) {
        Ok(count) if count <= max => Ok(count),
        _ => Err(EnvironmentError::TooLarge { key, value, max }),
    }
}

fn flag(env: &EnvSnapshot, key: &'static str) -> Result<bool> {
    let raw = required(env, key)?.trim();
    match raw.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(EnvironmentError::InvalidFlag {
            key,
            value: raw.to_string(),
        }),
    }
}
