//! Reqres users API scenarios

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::api::ApiClient;
use crate::error::{E2eError, E2eResult};
use crate::expect::{array_field, field, is_email, latency_within, number_field, status, string_field, timestamp};
use crate::scenario::{ContractScenario, ScenarioContext};
use crate::{ensure, ensure_eq};

/// Round-trip budget for create and update calls
pub const WRITE_LATENCY_BUDGET: Duration = Duration::from_millis(3000);

#[derive(Debug, Serialize)]
struct UserPayload<'a> {
    name: &'a str,
    job: &'a str,
}

const CREATED: UserPayload<'static> = UserPayload {
    name: "User Test",
    job: "QA Engineer",
};

const UPDATED: UserPayload<'static> = UserPayload {
    name: "User Test (Updated)",
    job: "Senior QA Engineer",
};

pub struct ListUsers;

#[async_trait]
impl ContractScenario for ListUsers {
    fn name(&self) -> &str {
        "C1 - list users"
    }

    async fn run(&self, api: &ApiClient, _ctx: &ScenarioContext) -> E2eResult<()> {
        let response = api.get("/users?page=2").await?;
        status(&response, 200)?;

        let users = array_field(&response.body, "data")?;
        debug!(count = users.len(), "listed users");

        for user in users {
            number_field(user, "id")?;
            let email = string_field(user, "email")?;
            ensure!(is_email(email), "malformed email {:?}", email);
            for key in ["first_name", "last_name"] {
                let value = string_field(user, key)?;
                ensure!(!value.is_empty(), "`{}` is empty in {}", key, user);
            }
        }
        Ok(())
    }
}

pub struct CreateAndUpdateUser;

#[async_trait]
impl ContractScenario for CreateAndUpdateUser {
    fn name(&self) -> &str {
        "C2 - create and update user"
    }

    async fn run(&self, api: &ApiClient, _ctx: &ScenarioContext) -> E2eResult<()> {
        let created = api.post_json("/users", &CREATED).await?;
        latency_within(&created, WRITE_LATENCY_BUDGET)?;
        status(&created, 201)?;

        let body = &created.body;
        ensure_eq!(string_field(body, "name")?, CREATED.name, "created name");
        ensure_eq!(string_field(body, "job")?, CREATED.job, "created job");
        timestamp(string_field(body, "createdAt")?)?;
        let id = match field(body, "id")? {
            serde_json::Value::String(id) => id.clone(),
            other => {
                return Err(E2eError::AssertionFailed(format!(
                    "field `id` should be a string, got {}",
                    other
                )))
            }
        };

        let updated = api.put_json(&format!("/users/{}", id), &UPDATED).await?;
        latency_within(&updated, WRITE_LATENCY_BUDGET)?;
        status(&updated, 200)?;

        let name = string_field(&updated.body, "name")?;
        let job = string_field(&updated.body, "job")?;
        ensure_eq!(name, UPDATED.name, "updated name");
        ensure_eq!(job, UPDATED.job, "updated job");
        ensure!(
            name != CREATED.name && job != CREATED.job,
            "update did not change the user: {}",
            updated.body
        );
        Ok(())
    }
}

pub struct FailureHandling;

impl FailureHandling {
    pub const MISSING_USER: u32 = 999;
    pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1);
}

#[async_trait]
impl ContractScenario for FailureHandling {
    fn name(&self) -> &str {
        "C3 - API failure handling"
    }

    async fn run(&self, api: &ApiClient, _ctx: &ScenarioContext) -> E2eResult<()> {
        let deleted = api.delete(&format!("/users/{}", Self::MISSING_USER)).await?;
        // Known quirk: the service answers 204 for any id, including ones that never existed.
        // A 404 here would mean the quirk was fixed and this expectation needs revisiting.
        ensure!(deleted.status != 404, "DELETE of unknown user returned 404");
        status(&deleted, 204)?;

        match api.get_with_timeout("/users?delay=1", Self::PROBE_TIMEOUT).await {
            Ok(response) => Err(E2eError::AssertionFailed(format!(
                "expected a timeout error, got status {}",
                response.status
            ))),
            Err(e @ E2eError::Timeout { .. }) => {
                let message = e.to_string();
                ensure!(
                    message.contains("Request timed out after 1ms"),
                    "timeout error does not name its bound: {}",
                    message
                );
                Ok(())
            }
            Err(other) => Err(E2eError::AssertionFailed(format!(
                "expected a timeout error, got: {}",
                other
            ))),
        }
    }
}
