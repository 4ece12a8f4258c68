//! Shopcheck scenario harness
//!
//! This crate runs the storefront verification suite:
//! - Gates the run on a validated environment contract
//! - Partitions scenarios into the `env`, `ui` and `api` projects
//! - Drives the storefront UI through Playwright and the users API through reqwest
//! - Applies one execution policy (retries, bounds, diagnosis) to every scenario
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    shopcheck (binary)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Validator (shopcheck-common)                               │
//! │    └── EnvSnapshot -> EnvironmentConfig | EnvironmentError  │
//! │  Partitioner                                                │
//! │    └── ScenarioRegistry + Selection -> [ProjectPlan]        │
//! │  TestRunner (Semaphore, `workers` permits)                  │
//! │    └── Executor (ExecutionPolicy)                           │
//! │          ├── attempt 0..=retries, each bounded              │
//! │          ├── Interactive -> PageFactory -> Page             │
//! │          ├── Contract    -> ApiClient                       │
//! │          └── ScenarioContext: one diagnosis per attempt     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ArtifactStore: <prefix>-<scenario>[-<case>]-attemptN-*.png │
//! │  test-results.json: TestSuiteResult                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod artifacts;
pub mod error;
pub mod expect;
pub mod playwright;
pub mod policy;
pub mod project;
pub mod runner;
pub mod scenario;
pub mod scenarios;
pub mod settings;

pub use api::{ApiClient, ApiResponse};
pub use artifacts::{Artifact, ArtifactStore};
pub use error::{E2eError, E2eResult, FailureKind};
pub use playwright::{Page, PageFactory, PlaywrightLauncher};
pub use policy::{ExecutionPolicy, Executor, RunMode};
pub use project::{Partitioner, Project, ProjectPlan, ScenarioRegistry, Selection};
pub use runner::{Gate, TestResult, TestRunner, TestSuiteResult};
pub use scenario::{ContractScenario, EnvironmentCheck, InteractiveScenario, Scenario, ScenarioContext, SubCase};
pub use settings::HarnessSettings;
