//! Scenario execution policy
//!
//! [`Executor`] wraps every scenario, whatever its variant, in the same governance:
//! a fresh primitive session per attempt, a bound on each attempt, one diagnosis per
//! failing attempt, and re-execution from the first step until the retry budget is
//! spent. Scenario bodies contain none of this logic.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use shopcheck_common::{EnvironmentConfig, Outcome, ProjectKind};
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::artifacts::{Artifact, ArtifactStore};
use crate::error::{E2eError, E2eResult, FailureKind};
use crate::playwright::{Page, PageFactory};
use crate::project::Project;
use crate::runner::TestResult;
use crate::scenario::{ContractScenario, Diagnosis, EnvironmentCheck, InteractiveScenario, Scenario, ScenarioContext};
use crate::settings::HarnessSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Interactive use: configured worker count, no retries
    Local,
    /// Continuous integration: one worker, two retries
    Ci,
}

#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    pub mode: RunMode,
    /// Maximum number of scenarios executing at once
    pub workers: usize,
    /// Extra attempts after a failed first attempt
    pub retries: u32,
    pub step_timeout: Duration,
    pub scenario_timeout: Duration,
    pub expect_timeout: Duration,
    pub trace_on_first_retry: bool,
}

impl ExecutionPolicy {
    pub fn new(mode: RunMode, env: &EnvironmentConfig, settings: &HarnessSettings) -> Self {
        // The remote targets are shared fixtures; CI runs them one scenario at a time.
        let (workers, retries) = match mode {
            RunMode::Local => (env.workers(), 0),
            RunMode::Ci => (1, 2),
        };
        Self {
            mode,
            workers,
            retries,
            step_timeout: settings.step_timeout(),
            scenario_timeout: settings.scenario_timeout(),
            expect_timeout: settings.expect_timeout(),
            trace_on_first_retry: settings.trace_on_first_retry,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}

/// One execution of a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    /// Zero-based; 0 is the first attempt
    pub attempt: u32,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub error_kind: Option<FailureKind>,
    pub error: Option<String>,
    pub diagnosis: Option<Diagnosis>,
    /// Browser trace recorded on the first retry, kept only when it failed
    pub trace: Option<Artifact>,
}

impl AttemptResult {
    fn passed(attempt: u32, duration: Duration) -> Self {
        Self {
            attempt,
            outcome: Outcome::Passed,
            duration_ms: duration.as_millis() as u64,
            error_kind: None,
            error: None,
            diagnosis: None,
            trace: None,
        }
    }

    fn failed(attempt: u32, duration: Duration, err: &E2eError, diagnosis: Option<Diagnosis>) -> Self {
        let kind = err.kind();
        Self {
            attempt,
            outcome: if kind == FailureKind::Timeout {
                Outcome::TimedOut
            } else {
                Outcome::Failed
            },
            duration_ms: duration.as_millis() as u64,
            error_kind: Some(kind),
            error: Some(err.to_string()),
            diagnosis,
            trace: None,
        }
    }
}

/// Run the environment check once. It is never retried: a broken environment stays
/// broken for the whole run.
pub fn run_environment_check(check: &EnvironmentCheck) -> TestResult {
    let start = Instant::now();
    let attempt = match check.run() {
        Ok(()) => AttemptResult::passed(0, start.elapsed()),
        Err(e) => {
            error!(
                scenario = EnvironmentCheck::NAME,
                project = %ProjectKind::Env,
                attempt = 0,
                kind = ?e.kind(),
                error = %e,
                "environment contract violated"
            );
            let diagnosis = Diagnosis {
                kind: e.kind(),
                case: None,
                artifact: None,
                note: None,
            };
            AttemptResult::failed(0, start.elapsed(), &e, Some(diagnosis))
        }
    };
    TestResult::from_attempts(EnvironmentCheck::NAME, ProjectKind::Env, vec![attempt], start.elapsed())
}

/// Applies an [`ExecutionPolicy`] around scenario attempts
#[derive(Clone)]
pub struct Executor {
    policy: Arc<ExecutionPolicy>,
    env: Arc<EnvironmentConfig>,
    pages: Arc<dyn PageFactory>,
    artifacts: ArtifactStore,
}

impl Executor {
    pub fn new(
        policy: ExecutionPolicy,
        env: Arc<EnvironmentConfig>,
        pages: Arc<dyn PageFactory>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            env,
            pages,
            artifacts,
        }
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Run a scenario to its final outcome
    pub async fn execute(&self, project: &Project, scenario: &Scenario) -> TestResult {
        if let Scenario::Environment(check) = scenario {
            return run_environment_check(check);
        }

        let start = Instant::now();
        let mut attempts = Vec::new();

        for attempt in 0..self.policy.max_attempts() {
            let (result, retryable) = self.attempt(project, scenario, attempt).await;
            let passed = result.outcome.is_pass();
            attempts.push(result);

            if passed || !retryable {
                break;
            }
            if attempt + 1 < self.policy.max_attempts() {
                info!(
                    scenario = %scenario.name(),
                    attempt = attempt + 1,
                    "Retrying {} ({} of {})",
                    scenario.name(),
                    attempt + 1,
                    self.policy.retries
                );
            }
        }

        TestResult::from_attempts(scenario.name(), project.kind, attempts, start.elapsed())
    }

    async fn attempt(&self, project: &Project, scenario: &Scenario, attempt: u32) -> (AttemptResult, bool) {
        let ctx = ScenarioContext::new(
            scenario,
            attempt,
            self.env.clone(),
            self.artifacts.clone(),
            self.policy.expect_timeout,
        );
        let step_timeout = scenario.step_timeout().unwrap_or(self.policy.step_timeout);
        let start = Instant::now();
        debug!(scenario = %scenario.name(), attempt, "attempt started");

        let mut trace = None;
        let result = match scenario {
            Scenario::Environment(check) => check.run(),
            Scenario::Interactive(s) => {
                self.attempt_interactive(project, s.as_ref(), &ctx, step_timeout, &mut trace)
                    .await
            }
            Scenario::Contract(s) => self.attempt_contract(project, s.as_ref(), &ctx, step_timeout).await,
        };

        match result {
            Ok(()) => (AttemptResult::passed(attempt, start.elapsed()), false),
            Err(e) => {
                let mut failed = AttemptResult::failed(attempt, start.elapsed(), &e, ctx.take_diagnosis());
                failed.trace = trace;
                (failed, e.is_retryable())
            }
        }
    }

    async fn attempt_interactive(
        &self,
        project: &Project,
        scenario: &dyn InteractiveScenario,
        ctx: &ScenarioContext,
        step_timeout: Duration,
        trace: &mut Option<Artifact>,
    ) -> E2eResult<()> {
        let base_url = project.base_url()?;
        let mut page = match self.pages.open(base_url, step_timeout).await {
            Ok(page) => page,
            Err(e) => {
                ctx.diagnose_without_page(&e);
                return Err(e);
            }
        };

        let tracing_attempt = self.policy.trace_on_first_retry && ctx.attempt() == 1;
        if tracing_attempt {
            if let Err(e) = page.start_trace().await {
                warn!(scenario = %ctx.scenario(), "Could not start trace: {}", e);
            }
        }

        let result = self.drive(page.as_mut(), scenario, ctx).await;

        if let Err(e) = &result {
            ctx.diagnose_page(page.as_mut(), None, e).await;
        }

        if tracing_attempt {
            let path = result
                .is_err()
                .then(|| ctx.artifacts().reserve("trace", ctx.scenario(), None, ctx.attempt(), "zip"));
            match page.stop_trace(path.as_deref()).await {
                Ok(()) => *trace = path.map(|p| ctx.artifacts().record(&p)),
                Err(e) => warn!(scenario = %ctx.scenario(), "Could not save trace: {}", e),
            }
        }

        if let Err(e) = page.close().await {
            warn!(scenario = %ctx.scenario(), "Failed to close page session: {}", e);
        }
        result
    }

    /// Setup hook plus scenario body, bounded as one attempt
    async fn drive(&self, page: &mut dyn Page, scenario: &dyn InteractiveScenario, ctx: &ScenarioContext) -> E2eResult<()> {
        let run = async {
            page.goto("/").await?;
            scenario.run(&mut *page, ctx).await
        };
        self.bounded(ctx.scenario(), run).await
    }

    async fn attempt_contract(
        &self,
        project: &Project,
        scenario: &dyn ContractScenario,
        ctx: &ScenarioContext,
        step_timeout: Duration,
    ) -> E2eResult<()> {
        let result = match project.base_url().and_then(|base| ApiClient::new(base, step_timeout)) {
            Ok(api) => self.bounded(ctx.scenario(), scenario.run(&api, ctx)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            ctx.diagnose_logged(e);
        }
        result
    }

    async fn bounded<F>(&self, name: &str, run: F) -> E2eResult<()>
    where
        F: Future<Output = E2eResult<()>>,
    {
        match tokio::time::timeout(self.policy.scenario_timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(E2eError::timeout("Scenario", name, self.policy.scenario_timeout)),
        }
    }
}
