//! The scenario suite, registered by project

pub mod reqres;
pub mod swaglabs;

use std::sync::Arc;

use shopcheck_common::{EnvSnapshot, ProjectKind, Validator};

use crate::project::ScenarioRegistry;
use crate::scenario::{EnvironmentCheck, Scenario};

/// Every scenario of the suite, grouped under the project it runs in
pub fn registry(snapshot: Arc<EnvSnapshot>, validator: Validator) -> ScenarioRegistry {
    let mut registry = ScenarioRegistry::new();
    registry
        .register(
            ProjectKind::Env,
            Scenario::Environment(EnvironmentCheck::new(snapshot, validator)),
        )
        .register(ProjectKind::Ui, Scenario::interactive(swaglabs::Login))
        .register(ProjectKind::Ui, Scenario::interactive(swaglabs::InvalidLogins))
        .register(ProjectKind::Ui, Scenario::interactive(swaglabs::Cart))
        .register(ProjectKind::Ui, Scenario::interactive(swaglabs::CheckoutWithoutCustomerInfo))
        .register(ProjectKind::Api, Scenario::contract(reqres::ListUsers))
        .register(ProjectKind::Api, Scenario::contract(reqres::CreateAndUpdateUser))
        .register(ProjectKind::Api, Scenario::contract(reqres::FailureHandling));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_scenario_registered_under_its_own_project() {
        let registry = registry(Arc::new(EnvSnapshot::default()), Validator::default());
        assert_eq!(registry.len(), 8);
        for (kind, scenario) in registry.entries() {
            assert_eq!(scenario.project(), *kind, "{}", scenario.name());
        }
    }

    #[test]
    fn test_scenario_names_are_unique() {
        let registry = registry(Arc::new(EnvSnapshot::default()), Validator::default());
        let names: HashSet<&str> = registry.entries().iter().map(|(_, s)| s.name()).collect();
        assert_eq!(names.len(), registry.len());
    }
}
