use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::HintConfig;
use crate::error::CollaboratorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HintRequest {
    pub title: String,
    pub description: String,
    pub code: String,
}

/// Generates a short nudge for a player stuck on a problem.
pub trait HintProvider: Send + Sync {
    fn hint(&self, request: HintRequest) -> BoxFuture<'_, Result<String, CollaboratorError>>;
}

#[derive(Deserialize)]
struct HintResponse {
    hint: String,
}

/// Hint service reached over HTTP.
pub struct HttpHintProvider {
    client: reqwest::Client,
    url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpHintProvider {
    pub fn new(config: &HintConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("codeduel-hints/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build hint HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl HintProvider for HttpHintProvider {
    fn hint(&self, request: HintRequest) -> BoxFuture<'_, Result<String, CollaboratorError>> {
        Box::pin(async move {
            let Some(ref url) = self.url else {
                return Err(CollaboratorError::Unavailable(
                    "hint service not configured".to_string(),
                ));
            };
            let mut req = self.client.post(url).timeout(self.timeout).json(&request);
            if let Some(ref key) = self.api_key {
                req = req.header("Authorization", format!("Bearer {key}"));
            }
            let resp = req.send().await?;
            if !resp.status().is_success() {
                return Err(CollaboratorError::Status(resp.status().as_u16()));
            }
            let body: HintResponse = resp.json().await?;
            let hint = body.hint.trim();
            if hint.is_empty() {
                return Err(CollaboratorError::InvalidResponse("empty hint".to_string()));
            }
            Ok(hint.to_string())
        })
    }
}
