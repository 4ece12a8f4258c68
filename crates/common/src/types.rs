//! Project and outcome vocabulary

use serde::{Deserialize, Serialize};

/// The three execution partitions of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    /// Hosts the environment check as a scenario; has no target
    Env,
    /// Page-driven scenarios against `UI_BASE_URL`
    Ui,
    /// Request-driven scenarios against `API_BASE_URL`
    Api,
}

impl ProjectKind {
    pub const ALL: [ProjectKind; 3] = [ProjectKind::Env, ProjectKind::Ui, ProjectKind::Api];

    pub fn name(&self) -> &'static str {
        match self {
            ProjectKind::Env => "env",
            ProjectKind::Ui => "ui",
            ProjectKind::Api => "api",
        }
    }

    /// The only configuration key a project of this kind may resolve its target from
    pub fn target_key(&self) -> Option<&'static str> {
        match self {
            ProjectKind::Env => None,
            ProjectKind::Ui => Some(crate::env::UI_BASE_URL),
            ProjectKind::Api => Some(crate::env::API_BASE_URL),
        }
    }
}

impl std::fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ProjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "env" => Ok(ProjectKind::Env),
            "ui" => Ok(ProjectKind::Ui),
            "api" => Ok(ProjectKind::Api),
            other => Err(format!("unknown project '{}' (expected env, ui or api)", other)),
        }
    }
}

/// Final or per-attempt outcome of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    /// Passed, but only after at least one failed attempt
    Flaky,
    Failed,
    TimedOut,
    /// Never executed
    Skipped,
}

impl Outcome {
    /// Whether this outcome makes the run exit non-zero
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed | Outcome::TimedOut)
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Passed | Outcome::Flaky)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Passed => write!(f, "passed"),
            Outcome::Flaky => write!(f, "flaky"),
            Outcome::Failed => write!(f, "failed"),
            Outcome::TimedOut => write!(f, "timed out"),
            Outcome::Skipped => write!(f, "skipped"),
        }
    }
}
