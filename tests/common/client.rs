//! HTTP test client
//!
//! Sends requests straight into the router and decodes JSON responses.

use super::constants::JOB_WAIT_ATTEMPTS;
use super::server::TestServer;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

pub struct TestClient {
    app: Router,
}

impl TestClient {
    pub fn new(server: &TestServer) -> Self {
        Self {
            app: server.app.clone(),
        }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<String>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let request = builder
            .body(body.map(Body::from).unwrap_or_default())
            .expect("Failed to build request");
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    pub async fn list_jobs(&self) -> Value {
        let (status, body) = self.send("GET", "/v1/admin/jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    pub async fn get_job(&self, job_id: &str) -> (StatusCode, Value) {
        self.send("GET", &format!("/v1/admin/jobs/{}", job_id), None)
            .await
    }

    pub async fn job_history(&self, job_id: &str) -> Value {
        let (status, body) = self
            .send("GET", &format!("/v1/admin/jobs/{}/history", job_id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    pub async fn trigger_job(&self, job_id: &str, params: Option<Value>) -> StatusCode {
        let (status, _) = self
            .send(
                "POST",
                &format!("/v1/admin/jobs/{}/trigger", job_id),
                params.map(|p| p.to_string()),
            )
            .await;
        status
    }

    /// Polls the history until the job has `count` finished runs, the latest
    /// with `status`. Panics on timeout.
    pub async fn wait_for_runs(&self, job_id: &str, count: usize, status: &str) -> Value {
        for _ in 0..JOB_WAIT_ATTEMPTS {
            let history = self.job_history(job_id).await;
            let runs = history.as_array().cloned().unwrap_or_default();
            let finished = runs.iter().filter(|r| r["status"] != "running").count();
            if finished >= count && runs.first().map(|r| &r["status"]) == Some(&Value::from(status))
            {
                return runs[0].clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Timed out waiting for {} run(s) of {} with status {}", count, job_id, status);
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub async fn get_configuration(&self) -> Value {
        let (status, body) = self.send("GET", "/v1/admin/configuration", None).await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    pub async fn put_configuration(&self, configuration: Value) -> (StatusCode, Value) {
        self.send(
            "PUT",
            "/v1/admin/configuration",
            Some(configuration.to_string()),
        )
        .await
    }

    pub async fn metrics(&self) -> String {
        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .expect("Failed to build request");
        let response = self.app.clone().oneshot(request).await.expect("Request failed");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        String::from_utf8_lossy(&bytes).to_string()
    }
}
