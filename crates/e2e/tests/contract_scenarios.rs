//! Users API scenarios against an in-process stand-in for the Reqres service
//!
//! Run with: cargo test --package shopcheck-e2e --test contract_scenarios

mod support;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use shopcheck_common::{EnvSnapshot, Outcome, ProjectKind, Validator};
use shopcheck_e2e::scenarios::{self, reqres};
use shopcheck_e2e::{
    ApiClient, ArtifactStore, E2eError, Executor, FailureKind, Partitioner, Project, Scenario, Selection, TestRunner,
};
use tokio::net::TcpListener;

use support::{local_api_env, policy, NoBrowser};

#[derive(Clone, Copy)]
struct Behaviour {
    delete_status: StatusCode,
    bad_email: bool,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            delete_status: StatusCode::NO_CONTENT,
            bad_email: false,
        }
    }
}

async fn list_users(State(behaviour): State<Behaviour>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    if let Some(delay) = query.get("delay").and_then(|d| d.parse::<u64>().ok()) {
        tokio::time::sleep(Duration::from_secs(delay)).await;
    }
    let email = if behaviour.bad_email {
        "lindsay ferguson@reqres.in"
    } else {
        "lindsay.ferguson@reqres.in"
    };
    Json(json!({
        "page": 2,
        "per_page": 6,
        "data": [
            { "id": 7, "email": "michael.lawson@reqres.in", "first_name": "Michael", "last_name": "Lawson" },
            { "id": 8, "email": email, "first_name": "Lindsay", "last_name": "Ferguson" },
        ]
    }))
}

async fn create_user(Json(body): Json<Value>) -> impl IntoResponse {
    let mut created = body;
    created["id"] = json!("421");
    created["createdAt"] = json!(chrono::Utc::now().to_rfc3339());
    (StatusCode::CREATED, Json(created))
}

async fn update_user(Path(_id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    let mut updated = body;
    updated["updatedAt"] = json!(chrono::Utc::now().to_rfc3339());
    Json(updated)
}

async fn delete_user(State(behaviour): State<Behaviour>, Path(_id): Path<String>) -> StatusCode {
    behaviour.delete_status
}

async fn serve(behaviour: Behaviour) -> SocketAddr {
    let app = Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/:id", axum::routing::put(update_user).delete(delete_user))
        .with_state(behaviour);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

fn api_url(addr: SocketAddr) -> String {
    format!("http://{}/api", addr)
}

fn executor(api_url: &str, dir: &std::path::Path) -> Executor {
    Executor::new(
        policy(2, 0, Duration::from_secs(10)),
        local_api_env(api_url),
        Arc::new(NoBrowser),
        ArtifactStore::new(dir).unwrap(),
    )
}

#[tokio::test]
async fn test_api_project_passes_against_conforming_service() {
    let addr = serve(Behaviour::default()).await;
    let url = api_url(addr);
    let dir = tempfile::tempdir().unwrap();

    let env = local_api_env(&url);
    let registry = scenarios::registry(Arc::new(EnvSnapshot::default()), Validator::default());
    let selection = Selection {
        projects: vec![ProjectKind::Api],
        grep: None,
    };
    let plans = Partitioner::partition(&env, &registry, &selection).unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].project.base_url.as_deref(), Some(url.as_str()));

    let suite = TestRunner::new(executor(&url, dir.path())).run(plans).await;

    assert_eq!(suite.total, 3);
    for result in &suite.results {
        assert_eq!(result.outcome, Outcome::Passed, "{}: {:?}", result.name, result.error);
    }
    assert!(suite.success());
    // Contract scenarios are diagnosed through logs, never files.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_fixed_delete_quirk_is_reported() {
    let addr = serve(Behaviour {
        delete_status: StatusCode::NOT_FOUND,
        ..Default::default()
    })
    .await;
    let url = api_url(addr);
    let dir = tempfile::tempdir().unwrap();
    let project = Project::resolve(ProjectKind::Api, &local_api_env(&url));

    let result = executor(&url, dir.path())
        .execute(&project, &Scenario::contract(reqres::FailureHandling))
        .await;

    assert_eq!(result.outcome, Outcome::Failed);
    assert_eq!(
        result.error.as_deref(),
        Some("Assertion failed: DELETE of unknown user returned 404")
    );
    let diagnosis = result.attempts[0].diagnosis.as_ref().unwrap();
    assert_eq!(diagnosis.kind, FailureKind::Assertion);
    assert!(diagnosis.artifact.is_none());
}

#[tokio::test]
async fn test_malformed_email_fails_listing() {
    let addr = serve(Behaviour {
        bad_email: true,
        ..Default::default()
    })
    .await;
    let url = api_url(addr);
    let dir = tempfile::tempdir().unwrap();
    let project = Project::resolve(ProjectKind::Api, &local_api_env(&url));

    let result = executor(&url, dir.path())
        .execute(&project, &Scenario::contract(reqres::ListUsers))
        .await;

    assert_eq!(result.outcome, Outcome::Failed);
    assert!(result.error.unwrap().contains("malformed email"));
}

#[tokio::test]
async fn test_one_millisecond_bound_surfaces_as_timeout() {
    let addr = serve(Behaviour::default()).await;
    let api = ApiClient::new(&api_url(addr), Duration::from_secs(5)).unwrap();

    let err = api
        .get_with_timeout("/users?delay=1", Duration::from_millis(1))
        .await
        .unwrap_err();

    assert!(matches!(err, E2eError::Timeout { bound_ms: 1, .. }), "{:?}", err);
    assert!(err.to_string().contains("Request timed out after 1ms"));
    assert_eq!(err.kind(), FailureKind::Timeout);
}

#[tokio::test]
async fn test_no_content_response_has_null_body() {
    let addr = serve(Behaviour::default()).await;
    let api = ApiClient::new(&api_url(addr), Duration::from_secs(5)).unwrap();

    let response = api.delete("/users/999").await.unwrap();
    assert_eq!(response.status, 204);
    assert!(response.body.is_null());
}
