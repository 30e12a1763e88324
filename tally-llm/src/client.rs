//! OpenAI-compatible chat-completion client with request logging

use crate::config::ProviderConfig;
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::ChatCompletionProvider;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tally_core::{ConfigError, EntityId, ProviderError, TallyResult};
use tally_storage::{CompletionLog, CompletionLogStore};
use tokio::sync::Semaphore;

const PROVIDER: &str = "github-models";

/// HTTP client for `POST {base_url}/chat/completions`.
///
/// Requests are bounded by a semaphore and, when a log store is attached,
/// recorded before sending with the parsed response attached afterwards.
/// Logging is best-effort and never fails a completion.
pub struct ChatCompletionClient {
    client: Client,
    config: ProviderConfig,
    in_flight: Arc<Semaphore>,
    log_store: Option<Arc<dyn CompletionLogStore>>,
}

impl ChatCompletionClient {
    pub fn new(config: ProviderConfig) -> TallyResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "http_client".to_string(),
                value: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            in_flight: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            config,
            log_store: None,
        })
    }

    pub fn with_log_store(mut self, store: Arc<dyn CompletionLogStore>) -> Self {
        self.log_store = Some(store);
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_request(&self, messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            messages,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
            model: self.config.model.clone(),
        }
    }

    async fn log_request(&self, request: &ChatCompletionRequest, reference: &str) -> Option<EntityId> {
        let store = self.log_store.as_ref()?;
        let payload = match serde_json::to_value(request) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, reference, "Failed to encode completion request for log");
                return None;
            }
        };
        let log = CompletionLog::new(payload, Some(reference.to_string()), Utc::now());
        match store.completion_log_insert(&log).await {
            Ok(()) => Some(log.id),
            Err(e) => {
                tracing::warn!(error = %e, reference, "Failed to record completion request");
                None
            }
        }
    }

    async fn log_response(&self, log_id: Option<EntityId>, response: &ChatCompletionResponse) {
        let (Some(store), Some(log_id)) = (self.log_store.as_ref(), log_id) else {
            return;
        };
        let payload = match serde_json::to_value(response) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, %log_id, "Failed to encode completion response for log");
                return;
            }
        };
        if let Err(e) = store.completion_log_attach_response(log_id, payload).await {
            tracing::warn!(error = %e, %log_id, "Failed to attach completion response");
        }
    }
}

#[async_trait]
impl ChatCompletionProvider for ChatCompletionClient {
    async fn complete(&self, messages: Vec<ChatMessage>, reference: &str) -> TallyResult<String> {
        let request = self.build_request(messages);
        let log_id = self.log_request(&request, reference).await;

        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|e| ProviderError::Transport {
                provider: PROVIDER.to_string(),
                reason: format!("request limiter closed: {}", e),
            })?;

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Transport {
            provider: PROVIDER.to_string(),
            reason: format!("failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), reference, "Chat completion request failed");
            return Err(ProviderError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        self.log_response(log_id, &parsed).await;

        let content = parsed.into_first_content().ok_or(ProviderError::NoChoices)?;
        tracing::debug!(reference, chars = content.len(), "Chat completion succeeded");
        Ok(content)
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }
}

impl std::fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
