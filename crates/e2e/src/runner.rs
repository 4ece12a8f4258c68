//! Runner that schedules planned scenarios across a bounded worker pool

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use shopcheck_common::{EnvSnapshot, EnvironmentConfig, Outcome, ProjectKind, Validator};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::E2eResult;
use crate::policy::{run_environment_check, AttemptResult, Executor, RunMode};
use crate::project::{ProjectPlan, ScenarioRegistry, Selection};
use crate::scenario::EnvironmentCheck;

/// Final result of one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub project: ProjectKind,
    pub outcome: Outcome,
    /// Attempts beyond the first
    pub retries: u32,
    pub duration_ms: u64,
    pub attempts: Vec<AttemptResult>,
    /// Error of the last failed attempt
    pub error: Option<String>,
    /// Snapshot of the last failed attempt, if one was captured
    pub artifact: Option<PathBuf>,
}

impl TestResult {
    pub fn from_attempts(name: &str, project: ProjectKind, attempts: Vec<AttemptResult>, elapsed: Duration) -> Self {
        let last_failure = attempts.iter().rev().find(|a| a.outcome.is_failure());
        let error = last_failure.and_then(|a| a.error.clone());
        let artifact = last_failure
            .and_then(|a| a.diagnosis.as_ref())
            .and_then(|d| d.artifact.as_ref())
            .map(|a| a.path.clone());

        let outcome = match attempts.last() {
            Some(last) if last.outcome.is_pass() && attempts.len() > 1 => Outcome::Flaky,
            Some(last) => last.outcome,
            None => Outcome::Skipped,
        };

        Self {
            name: name.to_string(),
            project,
            outcome,
            retries: attempts.len().saturating_sub(1) as u32,
            duration_ms: elapsed.as_millis() as u64,
            attempts,
            error,
            artifact,
        }
    }

    pub fn skipped(name: &str, project: ProjectKind, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            project,
            outcome: Outcome::Skipped,
            retries: 0,
            duration_ms: 0,
            attempts: vec![],
            error: Some(reason.into()),
            artifact: None,
        }
    }

    /// A scenario whose task died before producing a result
    fn aborted(name: &str, project: ProjectKind, reason: String) -> Self {
        Self {
            name: name.to_string(),
            project,
            outcome: Outcome::Failed,
            retries: 0,
            duration_ms: 0,
            attempts: vec![],
            error: Some(reason),
            artifact: None,
        }
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub workers: usize,
    pub total: usize,
    pub passed: usize,
    pub flaky: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(mode: RunMode, workers: usize, results: Vec<TestResult>, elapsed: Duration) -> Self {
        let count = |o: Outcome| results.iter().filter(|r| r.outcome == o).count();
        Self {
            run_id: Uuid::new_v4(),
            mode,
            workers,
            total: results.len(),
            passed: count(Outcome::Passed),
            flaky: count(Outcome::Flaky),
            failed: count(Outcome::Failed),
            timed_out: count(Outcome::TimedOut),
            skipped: count(Outcome::Skipped),
            duration_ms: elapsed.as_millis() as u64,
            results,
        }
    }

    /// True when no scenario failed or timed out
    pub fn success(&self) -> bool {
        self.failed == 0 && self.timed_out == 0
    }

    pub fn result(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

pub struct TestRunner {
    executor: Executor,
}

impl TestRunner {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Run every planned scenario. At most `workers` scenarios execute at once;
    /// results keep plan order regardless of completion order.
    pub async fn run(&self, plans: Vec<ProjectPlan>) -> TestSuiteResult {
        let start = Instant::now();
        let policy = self.executor.policy();
        let workers = policy.workers.clamp(1, Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut handles = Vec::new();
        for plan in plans {
            for scenario in plan.scenarios {
                let name = scenario.name().to_string();
                let project = plan.project.clone();
                let executor = self.executor.clone();
                let semaphore = semaphore.clone();
                let kind = project.kind;

                let handle = tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return TestResult::skipped(scenario.name(), project.kind, "worker pool closed"),
                    };
                    executor.execute(&project, &scenario).await
                });
                handles.push((name, kind, handle));
            }
        }

        info!("Running {} scenario(s) with {} worker(s)...", handles.len(), workers);

        let (scenarios, tasks): (Vec<_>, Vec<_>) = handles
            .into_iter()
            .map(|(name, kind, handle)| ((name, kind), handle))
            .unzip();
        let joined = futures::future::join_all(tasks).await;

        let mut results = Vec::with_capacity(joined.len());
        for ((name, kind), outcome) in scenarios.into_iter().zip(joined) {
            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    warn!(scenario = %name, "Scenario task aborted: {}", e);
                    TestResult::aborted(&name, kind, format!("scenario task aborted: {}", e))
                }
            };
            log_result(&result);
            results.push(result);
        }

        let suite = TestSuiteResult::from_results(policy.mode, workers, results, start.elapsed());
        log_summary(&suite);
        suite
    }
}

/// Result of gating a run on the environment contract
pub enum Gate {
    /// The contract holds; scenarios may run against this configuration
    Open(Arc<EnvironmentConfig>),
    /// The contract is violated; nothing may be launched
    Closed(TestSuiteResult),
}

/// Validate the snapshot once before anything is planned or launched
pub fn gate(
    snapshot: Arc<EnvSnapshot>,
    validator: Validator,
    registry: &ScenarioRegistry,
    selection: &Selection,
    mode: RunMode,
) -> Gate {
    match validator.validate(&snapshot) {
        Ok(env) => Gate::Open(Arc::new(env)),
        Err(e) => {
            error!("Environment contract violated: {}", e);
            let check = EnvironmentCheck::new(snapshot, validator);
            Gate::Closed(gate_failure(&check, registry, selection, mode))
        }
    }
}

/// Report for a run rejected by the environment gate: the check itself fails and
/// every other selected scenario is skipped without touching a target.
pub fn gate_failure(
    check: &EnvironmentCheck,
    registry: &ScenarioRegistry,
    selection: &Selection,
    mode: RunMode,
) -> TestSuiteResult {
    let start = Instant::now();
    let mut results = vec![run_environment_check(check)];
    for (kind, scenario) in registry.selected(selection) {
        if *kind == ProjectKind::Env {
            continue;
        }
        results.push(TestResult::skipped(
            scenario.name(),
            *kind,
            "environment contract violated",
        ));
    }
    for result in &results {
        log_result(result);
    }

    let suite = TestSuiteResult::from_results(mode, 0, results, start.elapsed());
    log_summary(&suite);
    suite
}

/// Write test results to JSON file
pub fn write_results(output_dir: &Path, results: &TestSuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("test-results.json");
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}

fn log_result(result: &TestResult) {
    let error = result.error.as_deref().unwrap_or("unknown error");
    match result.outcome {
        Outcome::Passed => info!("✓ [{}] {} ({} ms)", result.project, result.name, result.duration_ms),
        Outcome::Flaky => warn!(
            "✓ [{}] {} ({} ms, flaky after {} retries)",
            result.project, result.name, result.duration_ms, result.retries
        ),
        Outcome::Skipped => info!("- [{}] {} - skipped: {}", result.project, result.name, error),
        Outcome::Failed | Outcome::TimedOut => {
            error!("✗ [{}] {} - {}", result.project, result.name, error);
            if let Some(path) = &result.artifact {
                error!("  snapshot: {}", path.display());
            }
        }
    }
}

fn log_summary(suite: &TestSuiteResult) {
    info!("");
    info!(
        "Test Results: {} passed, {} flaky, {} failed, {} timed out, {} skipped ({} ms)",
        suite.passed, suite.flaky, suite.failed, suite.timed_out, suite.skipped, suite.duration_ms
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn attempt(n: u32, outcome: Outcome) -> AttemptResult {
        AttemptResult {
            attempt: n,
            outcome,
            duration_ms: 10,
            error_kind: outcome.is_failure().then_some(FailureKind::Assertion),
            error: outcome.is_failure().then(|| format!("attempt {} failed", n)),
            diagnosis: None,
            trace: None,
        }
    }

    #[test]
    fn test_pass_after_failure_is_flaky() {
        let result = TestResult::from_attempts(
            "cart",
            ProjectKind::Ui,
            vec![attempt(0, Outcome::Failed), attempt(1, Outcome::Passed)],
            Duration::from_millis(20),
        );
        assert_eq!(result.outcome, Outcome::Flaky);
        assert_eq!(result.retries, 1);
        assert_eq!(result.error.as_deref(), Some("attempt 0 failed"));
    }

    #[test]
    fn test_last_attempt_decides_failure_kind() {
        let result = TestResult::from_attempts(
            "create user",
            ProjectKind::Api,
            vec![attempt(0, Outcome::Failed), attempt(1, Outcome::TimedOut)],
            Duration::from_millis(20),
        );
        assert_eq!(result.outcome, Outcome::TimedOut);
    }

    #[test]
    fn test_suite_counts_and_success() {
        let results = vec![
            TestResult::from_attempts("a", ProjectKind::Api, vec![attempt(0, Outcome::Passed)], Duration::ZERO),
            TestResult::skipped("b", ProjectKind::Ui, "filtered"),
        ];
        let suite = TestSuiteResult::from_results(RunMode::Local, 2, results, Duration::ZERO);
        assert_eq!((suite.total, suite.passed, suite.skipped), (2, 1, 1));
        assert!(suite.success());
        assert!(suite.result("b").is_some());
    }

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let suite = TestSuiteResult::from_results(RunMode::Ci, 1, vec![], Duration::ZERO);
        let path = write_results(dir.path(), &suite).unwrap();
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["mode"], "ci");
        assert_eq!(written["workers"], 1);
    }
}
