//! Scenario contract
//!
//! A scenario is one of three variants sharing a single identity and diagnosis contract:
//!
//! - [`Scenario::Environment`] runs the environment validator as a reportable scenario.
//! - [`Scenario::Interactive`] drives a [`Page`] and asserts on rendered state.
//! - [`Scenario::Contract`] issues requests through an [`ApiClient`] and asserts on responses.
//!
//! Scenario bodies only return errors. Diagnosis (screenshot or structured log) happens
//! exactly once per failing attempt, through [`ScenarioContext`], and never changes the
//! error that propagates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shopcheck_common::{Credentials, EnvSnapshot, EnvironmentConfig, ProjectKind, Validator};
use tracing::{debug, error, warn};

use crate::api::ApiClient;
use crate::artifacts::{Artifact, ArtifactStore};
use crate::error::{E2eError, E2eResult, FailureKind};
use crate::expect::PageExpect;
use crate::playwright::Page;

/// Page-driven scenario
#[async_trait]
pub trait InteractiveScenario: Send + Sync {
    fn name(&self) -> &str;

    /// Per-step bound overriding the policy default
    fn step_timeout(&self) -> Option<Duration> {
        None
    }

    /// Runs with the page already positioned on the target's root
    async fn run(&self, page: &mut dyn Page, ctx: &ScenarioContext) -> E2eResult<()>;
}

/// Request-driven scenario
#[async_trait]
pub trait ContractScenario: Send + Sync {
    fn name(&self) -> &str;

    fn step_timeout(&self) -> Option<Duration> {
        None
    }

    async fn run(&self, api: &ApiClient, ctx: &ScenarioContext) -> E2eResult<()>;
}

/// The environment validator, hosted as a scenario of the `env` project
#[derive(Debug, Clone)]
pub struct EnvironmentCheck {
    snapshot: Arc<EnvSnapshot>,
    validator: Validator,
}

impl EnvironmentCheck {
    pub const NAME: &'static str = "environment variables are valid";

    pub fn new(snapshot: Arc<EnvSnapshot>, validator: Validator) -> Self {
        Self { snapshot, validator }
    }

    pub fn run(&self) -> E2eResult<()> {
        self.validator.validate(&self.snapshot)?;
        Ok(())
    }
}

#[derive(Clone)]
pub enum Scenario {
    Environment(EnvironmentCheck),
    Interactive(Arc<dyn InteractiveScenario>),
    Contract(Arc<dyn ContractScenario>),
}

impl Scenario {
    pub fn interactive(scenario: impl InteractiveScenario + 'static) -> Self {
        Scenario::Interactive(Arc::new(scenario))
    }

    pub fn contract(scenario: impl ContractScenario + 'static) -> Self {
        Scenario::Contract(Arc::new(scenario))
    }

    pub fn name(&self) -> &str {
        match self {
            Scenario::Environment(_) => EnvironmentCheck::NAME,
            Scenario::Interactive(s) => s.name(),
            Scenario::Contract(s) => s.name(),
        }
    }

    /// The only project this scenario may run under
    pub fn project(&self) -> ProjectKind {
        match self {
            Scenario::Environment(_) => ProjectKind::Env,
            Scenario::Interactive(_) => ProjectKind::Ui,
            Scenario::Contract(_) => ProjectKind::Api,
        }
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        match self {
            Scenario::Environment(_) => None,
            Scenario::Interactive(s) => s.step_timeout(),
            Scenario::Contract(s) => s.step_timeout(),
        }
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name())
            .field("project", &self.project())
            .finish()
    }
}

/// Evidence attached to a failed attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub kind: FailureKind,
    /// Sub-case that failed, for multi-case scenarios
    pub case: Option<String>,
    pub artifact: Option<Artifact>,
    /// Why no artifact could be captured, when one was expected
    pub note: Option<String>,
}

/// Per-attempt state handed to a scenario body
pub struct ScenarioContext {
    scenario: String,
    project: ProjectKind,
    attempt: u32,
    env: Arc<EnvironmentConfig>,
    artifacts: ArtifactStore,
    expect_timeout: Duration,
    diagnosis: Mutex<Option<Diagnosis>>,
}

impl ScenarioContext {
    pub fn new(
        scenario: &Scenario,
        attempt: u32,
        env: Arc<EnvironmentConfig>,
        artifacts: ArtifactStore,
        expect_timeout: Duration,
    ) -> Self {
        Self {
            scenario: scenario.name().to_string(),
            project: scenario.project(),
            attempt,
            env,
            artifacts,
            expect_timeout,
            diagnosis: Mutex::new(None),
        }
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Zero-based attempt index; 1 is the first retry
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Base URL of this scenario's own project. Other projects' targets are not reachable
    /// from a scenario.
    pub fn target(&self) -> Option<&str> {
        self.env.target(self.project)
    }

    pub fn credentials(&self) -> &Credentials {
        self.env.credentials()
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn expect<'p>(&self, page: &'p mut dyn Page) -> PageExpect<'p> {
        PageExpect::new(page, self.expect_timeout)
    }

    pub fn is_diagnosed(&self) -> bool {
        self.diagnosis.lock().is_some()
    }

    pub fn take_diagnosis(&self) -> Option<Diagnosis> {
        self.diagnosis.lock().take()
    }

    /// Capture a full-page snapshot for a failure. A second call in the same attempt is
    /// a no-op, so the first (most specific) diagnosis wins.
    pub async fn diagnose_page(&self, page: &mut dyn Page, case: Option<&str>, err: &E2eError) {
        if self.is_diagnosed() {
            return;
        }
        let kind = err.kind();
        let path = self
            .artifacts
            .reserve(kind.artifact_prefix(), &self.scenario, case, self.attempt, "png");

        error!(
            scenario = %self.scenario,
            project = %self.project,
            attempt = self.attempt,
            case = case.unwrap_or(""),
            kind = ?kind,
            error = %err,
            "interactive scenario failed"
        );

        let (artifact, note) = match page.screenshot(&path, true).await {
            Ok(()) => (Some(self.artifacts.record(&path)), None),
            Err(capture) => {
                warn!(scenario = %self.scenario, "Could not capture failure snapshot: {}", capture);
                (None, Some(format!("snapshot capture failed: {}", capture)))
            }
        };

        *self.diagnosis.lock() = Some(Diagnosis {
            kind,
            case: case.map(str::to_string),
            artifact,
            note,
        });
    }

    /// Record a failure as a structured log event
    pub fn diagnose_logged(&self, err: &E2eError) {
        if self.is_diagnosed() {
            return;
        }
        let kind = err.kind();
        error!(
            scenario = %self.scenario,
            project = %self.project,
            attempt = self.attempt,
            kind = ?kind,
            error = %err,
            "contract scenario failed"
        );
        *self.diagnosis.lock() = Some(Diagnosis {
            kind,
            case: None,
            artifact: None,
            note: None,
        });
    }

    /// Record that a page-driven failure could not be snapshotted because no page exists
    pub fn diagnose_without_page(&self, err: &E2eError) {
        if self.is_diagnosed() {
            return;
        }
        let kind = err.kind();
        error!(
            scenario = %self.scenario,
            project = %self.project,
            attempt = self.attempt,
            kind = ?kind,
            error = %err,
            "interactive scenario failed before a page was available"
        );
        *self.diagnosis.lock() = Some(Diagnosis {
            kind,
            case: None,
            artifact: None,
            note: Some("no page session to snapshot".to_string()),
        });
    }
}

/// One entry of a multi-case scenario
#[async_trait]
pub trait SubCase: Send + Sync {
    /// Identity used in logs and artifact names
    fn label(&self) -> String;

    async fn run(&self, page: &mut dyn Page, ctx: &ScenarioContext) -> E2eResult<()>;

    /// Clear state this case left behind before the next case starts
    async fn reset(&self, page: &mut dyn Page, ctx: &ScenarioContext) -> E2eResult<()>;
}

/// Run sub-cases in order, resetting between them. The first failure is diagnosed
/// under the sub-case's identity and returned unchanged.
pub async fn run_sub_cases<C: SubCase>(page: &mut dyn Page, ctx: &ScenarioContext, cases: &[C]) -> E2eResult<()> {
    for case in cases {
        let label = case.label();
        debug!(scenario = %ctx.scenario(), case = %label, "running sub-case");

        let result = match case.run(page, ctx).await {
            Ok(()) => case.reset(page, ctx).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            ctx.diagnose_page(page, Some(&label), &e).await;
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopcheck_common::env::{API_BASE_URL, HEADLESS, STANDARD_PASSWORD, STANDARD_USER, UI_BASE_URL, WORKERS};

    fn snapshot() -> EnvSnapshot {
        EnvSnapshot::from_pairs([
            (STANDARD_USER, "standard_user"),
            (STANDARD_PASSWORD, "secret_sauce"),
            (API_BASE_URL, "https://reqres.in/api"),
            (UI_BASE_URL, "https://www.saucedemo.com"),
            (HEADLESS, "true"),
            (WORKERS, "2"),
        ])
    }

    #[test]
    fn test_environment_check_is_env_project() {
        let scenario = Scenario::Environment(EnvironmentCheck::new(Arc::new(snapshot()), Validator::default()));
        assert_eq!(scenario.project(), ProjectKind::Env);
        assert_eq!(scenario.name(), EnvironmentCheck::NAME);
    }

    #[test]
    fn test_environment_check_reports_key() {
        let mut env = snapshot();
        env.remove(WORKERS);
        let check = EnvironmentCheck::new(Arc::new(env), Validator::default());
        let err = check.run().unwrap_err();
        assert_eq!(err.to_string(), "Environment error: WORKERS is required");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_logged_diagnosis_happens_once() {
        let dir = tempfile::tempdir().unwrap();
        let env = Arc::new(Validator::default().validate(&snapshot()).unwrap());
        let scenario = Scenario::Environment(EnvironmentCheck::new(Arc::new(snapshot()), Validator::default()));
        let ctx = ScenarioContext::new(&scenario, 0, env, ArtifactStore::new(dir.path()).unwrap(), Duration::from_secs(1));

        ctx.diagnose_logged(&E2eError::AssertionFailed("first".into()));
        ctx.diagnose_logged(&E2eError::Navigation("second".into()));

        let diagnosis = ctx.take_diagnosis().unwrap();
        assert_eq!(diagnosis.kind, FailureKind::Assertion);
        assert!(diagnosis.artifact.is_none());
        assert!(!ctx.is_diagnosed());
    }

    struct UsersLookup;

    #[async_trait]
    impl ContractScenario for UsersLookup {
        fn name(&self) -> &str {
            "users lookup"
        }

        async fn run(&self, _api: &ApiClient, _ctx: &ScenarioContext) -> E2eResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_context_exposes_only_own_target() {
        let dir = tempfile::tempdir().unwrap();
        let env = Arc::new(Validator::default().validate(&snapshot()).unwrap());
        let store = ArtifactStore::new(dir.path()).unwrap();

        let api = Scenario::contract(UsersLookup);
        let ctx = ScenarioContext::new(&api, 0, env.clone(), store.clone(), Duration::from_secs(1));
        assert_eq!(ctx.target(), Some("https://reqres.in/api"));

        let check = Scenario::Environment(EnvironmentCheck::new(Arc::new(snapshot()), Validator::default()));
        let ctx = ScenarioContext::new(&check, 0, env, store, Duration::from_secs(1));
        assert_eq!(ctx.target(), None);
    }
}
