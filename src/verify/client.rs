//! HTTP client for the verification service

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::CheckService;
use crate::error::{KeyforgeError, Result};
use crate::types::CheckVerdict;

const SUCCESS_MESSAGE: &str = "Success";

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TargetResponse {
    password: Option<serde_json::Value>,
}

/// `CheckService` over HTTP: `GET /get_password`, `POST /check_password`
#[derive(Debug, Clone)]
pub struct HttpCheckService {
    client: Client,
    base_url: String,
}

impl HttpCheckService {
    /// Create a client sized for `max_connections` concurrent requests
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        max_connections: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("keyforge/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(max_connections)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| KeyforgeError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_body(&self, response: reqwest::Response, url: &str) -> Result<String> {
        let status = response.status();
        if !status.is_success() {
            return Err(KeyforgeError::transient(
                format!("Service responded with status {}", status),
                Some(status.as_u16()),
                Some(url.to_string()),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| KeyforgeError::transient(e.to_string(), None, Some(url.to_string())))
    }
}

#[async_trait]
impl CheckService for HttpCheckService {
    async fn fetch_target(&self) -> Result<String> {
        let url = format!("{}/get_password", self.base_url);
        let response = self.client.get(&url).send().await?;
        let text = self.read_body(response, &url).await?;

        let target: TargetResponse = serde_json::from_str(&text)
            .map_err(|e| KeyforgeError::protocol(e.to_string(), Some(text.clone())))?;

        match target.password {
            Some(serde_json::Value::String(s)) => Ok(s),
            Some(other) => Ok(other.to_string()),
            None => Err(KeyforgeError::protocol(
                "Target response has no 'password' field",
                Some(text),
            )),
        }
    }

    async fn check(&self, candidate: &str) -> Result<CheckVerdict> {
        let url = format!("{}/check_password", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CheckRequest { password: candidate })
            .send()
            .await?;

        tracing::trace!(
            candidate = %candidate,
            status = %response.status(),
            "Check request returned"
        );

        let text = self.read_body(response, &url).await?;
        parse_check_response(&text)
    }
}

/// Interpret a 2xx check response body
///
/// `{"message": "Success"}` is a success, any other string message is a
/// failure, everything else is a protocol error.
pub fn parse_check_response(text: &str) -> Result<CheckVerdict> {
    let body: CheckResponse = serde_json::from_str(text)
        .map_err(|e| KeyforgeError::protocol(e.to_string(), Some(text.to_string())))?;

    match body.message {
        Some(serde_json::Value::String(message)) if message == SUCCESS_MESSAGE => {
            Ok(CheckVerdict::Success)
        }
        Some(serde_json::Value::String(_)) => Ok(CheckVerdict::Failure),
        _ => Err(KeyforgeError::protocol(
            "Check response has no string 'message' field",
            Some(text.to_string()),
        )),
    }
}
