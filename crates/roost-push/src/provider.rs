use std::collections::HashMap;

use anyhow::Context;
use serde::Serialize;
use tracing::debug;

/// Per-token delivery result. Invalid tokens are reported so the caller
/// can drop them from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    Delivered(String),
    Invalid(String),
}

/// Seam to the actual push transport (FCM-style HTTP, or a test
/// double). One call covers every token of one notification.
pub trait PushProvider: Send + Sync + 'static {
    fn send_to_tokens(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> impl Future<Output = anyhow::Result<Vec<TokenOutcome>>> + Send;
}

#[derive(Serialize)]
struct PushRequest<'a> {
    tokens: &'a [String],
    title: &'a str,
    body: &'a str,
    data: &'a HashMap<String, String>,
}

/// Provider posting one JSON request per notification to an HTTP push
/// endpoint.
pub struct HttpPushProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpPushProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

impl PushProvider for HttpPushProvider {
    async fn send_to_tokens(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> anyhow::Result<Vec<TokenOutcome>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&PushRequest {
                tokens,
                title,
                body,
                data,
            })
            .send()
            .await
            .context("push request failed")?
            .error_for_status()
            .context("push endpoint rejected the request")?;

        // The endpoint reports tokens it considers dead; anything not
        // listed counts as delivered.
        #[derive(serde::Deserialize, Default)]
        struct PushResponse {
            #[serde(default)]
            invalid_tokens: Vec<String>,
        }
        let parsed: PushResponse = response.json().await.unwrap_or_default();
        debug!(
            sent = tokens.len(),
            invalid = parsed.invalid_tokens.len(),
            "push dispatched"
        );

        Ok(tokens
            .iter()
            .map(|t| {
                if parsed.invalid_tokens.contains(t) {
                    TokenOutcome::Invalid(t.clone())
                } else {
                    TokenOutcome::Delivered(t.clone())
                }
            })
            .collect())
    }
}
