//! Project partitioning
//!
//! Scenarios are registered under a project. At plan time every selected project is
//! bound to the single target address its kind is allowed to read, and every scenario
//! is checked to belong to the primitive set of the project it was registered under.

use serde::Serialize;
use shopcheck_common::{EnvironmentConfig, ProjectKind};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::scenario::Scenario;

/// Which driving API scenarios of a project receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveSet {
    /// No target; the environment check only
    None,
    Page,
    Request,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub name: String,
    pub kind: ProjectKind,
    /// The one address visible to scenarios of this project
    pub base_url: Option<String>,
}

impl Project {
    /// Bind a project to its target, reading only the key designated for its kind
    pub fn resolve(kind: ProjectKind, env: &EnvironmentConfig) -> Self {
        Self {
            name: kind.name().to_string(),
            kind,
            base_url: env.target(kind).map(str::to_string),
        }
    }

    pub fn primitives(&self) -> PrimitiveSet {
        match self.kind {
            ProjectKind::Env => PrimitiveSet::None,
            ProjectKind::Ui => PrimitiveSet::Page,
            ProjectKind::Api => PrimitiveSet::Request,
        }
    }

    pub fn base_url(&self) -> E2eResult<&str> {
        self.base_url
            .as_deref()
            .ok_or_else(|| E2eError::Config(format!("project '{}' has no target address", self.name)))
    }
}

/// Static list of scenarios grouped by project
#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    entries: Vec<(ProjectKind, Scenario)>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, project: ProjectKind, scenario: Scenario) -> &mut Self {
        self.entries.push((project, scenario));
        self
    }

    pub fn entries(&self) -> &[(ProjectKind, Scenario)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered entries passing `selection`, in registration order
    pub fn selected<'a>(&'a self, selection: &'a Selection) -> impl Iterator<Item = &'a (ProjectKind, Scenario)> + 'a {
        self.entries
            .iter()
            .filter(move |(kind, scenario)| selection.includes(*kind) && selection.matches_name(scenario.name()))
    }
}

/// Which projects and scenario names a run covers
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Empty means every project
    pub projects: Vec<ProjectKind>,
    /// Case-insensitive substring of the scenario name
    pub grep: Option<String>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn includes(&self, kind: ProjectKind) -> bool {
        self.projects.is_empty() || self.projects.contains(&kind)
    }

    pub fn matches_name(&self, name: &str) -> bool {
        match &self.grep {
            Some(pattern) => name.to_lowercase().contains(&pattern.to_lowercase()),
            None => true,
        }
    }
}

/// A project and the scenarios that will run under it
#[derive(Debug, Clone)]
pub struct ProjectPlan {
    pub project: Project,
    pub scenarios: Vec<Scenario>,
}

pub struct Partitioner;

impl Partitioner {
    pub fn partition(
        env: &EnvironmentConfig,
        registry: &ScenarioRegistry,
        selection: &Selection,
    ) -> E2eResult<Vec<ProjectPlan>> {
        for (kind, scenario) in registry.entries() {
            if scenario.project() != *kind {
                return Err(E2eError::ProjectMismatch {
                    scenario: scenario.name().to_string(),
                    expected: scenario.project(),
                    actual: *kind,
                });
            }
        }

        let mut plans = Vec::new();
        for kind in ProjectKind::ALL {
            if !selection.includes(kind) {
                continue;
            }
            let scenarios: Vec<Scenario> = registry
                .selected(selection)
                .filter(|(k, _)| *k == kind)
                .map(|(_, s)| s.clone())
                .collect();
            if scenarios.is_empty() {
                continue;
            }

            let project = Project::resolve(kind, env);
            debug!(
                project = %project.name,
                target = project.base_url.as_deref().unwrap_or("-"),
                scenarios = scenarios.len(),
                "project planned"
            );
            plans.push(ProjectPlan { project, scenarios });
        }
        Ok(plans)
    }
}
