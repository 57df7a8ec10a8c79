//! HTTP client for end-to-end tests
//!
//! When webhook routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

pub struct TestClient {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// POST / with the configured token
    pub async fn submit_now_playing(&self, message: &str) -> Response {
        self.submit_with_key(WEBHOOK_TOKEN, message).await
    }

    pub async fn submit_with_key(&self, key: &str, message: &str) -> Response {
        self.client
            .post(format!("{}/", self.base_url))
            .json(&json!({ "key": key, "message": message }))
            .send()
            .await
            .expect("Webhook request failed")
    }

    /// POST / with an arbitrary body
    pub async fn submit_raw(&self, body: &'static str) -> Response {
        self.client
            .post(format!("{}/", self.base_url))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Webhook request failed")
    }

    pub async fn health(&self) -> Response {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .expect("Health request failed")
    }
}
