//! Harness settings
//!
//! Non-secret knobs (timeouts, browser, output directory). Targets and credentials
//! never live here; they come from the validated environment contract.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{E2eError, E2eResult};
use crate::playwright::Browser;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// Where results and diagnostic artifacts are written
    pub output_dir: PathBuf,

    pub browser: Browser,

    pub viewport: Viewport,

    /// Bound on each page step and each request
    pub step_timeout_ms: u64,

    /// Bound on a whole scenario attempt
    pub scenario_timeout_ms: u64,

    /// How long page expectations keep polling before failing
    pub expect_timeout_ms: u64,

    /// Record a browser trace on the first retry of a page scenario
    pub trace_on_first_retry: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        // Desktop Chrome
        Self { width: 1280, height: 720 }
    }
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("test-results"),
            browser: Browser::Chromium,
            viewport: Viewport::default(),
            step_timeout_ms: 15_000,
            scenario_timeout_ms: 30_000,
            expect_timeout_ms: 5_000,
            trace_on_first_retry: true,
        }
    }
}

impl HarnessSettings {
    /// Load settings from a TOML file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| E2eError::Config(format!("{}: {}", path.display(), e)))
        } else {
            Ok(Self::default())
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_millis(self.scenario_timeout_ms)
    }

    pub fn expect_timeout(&self) -> Duration {
        Duration::from_millis(self.expect_timeout_ms)
    }
}
