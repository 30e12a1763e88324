//! Tally LLM - Chat Completion and Insight Summarization
//!
//! A provider-agnostic chat-completion trait, an OpenAI-compatible HTTP
//! client for it, and the prompts that turn insight batches into summaries.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tally_core::{ProviderError, TallyResult};

pub mod client;
pub mod config;
pub mod prompts;
pub mod summarizer;
pub mod types;

pub use client::ChatCompletionClient;
pub use config::ProviderConfig;
pub use summarizer::InsightSummarizer;
pub use types::{ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage};

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// Something that answers a chat conversation with a single reply.
#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    /// Send `messages` and return the content of the first choice.
    ///
    /// `reference` identifies the caller's unit of work in request logs,
    /// e.g. `insight:<id> batch:2`.
    async fn complete(&self, messages: Vec<ChatMessage>, reference: &str) -> TallyResult<String>;

    /// Provider name for logs and errors.
    fn provider_name(&self) -> &str;
}

// ============================================================================
// MOCK PROVIDER
// ============================================================================

/// One recorded call to [`MockChatProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub reference: String,
}

/// Mock provider for testing.
///
/// Replies come from a queue of scripted outcomes; once the queue is empty it
/// answers with `"Summary of <reference>"`. Every call is recorded.
#[derive(Debug, Clone, Default)]
pub struct MockChatProvider {
    script: Arc<Mutex<VecDeque<Result<String, ProviderError>>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    fail_matching: Arc<Mutex<Vec<String>>>,
}

impl MockChatProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next call.
    pub fn push_reply(&self, reply: impl Into<String>) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(reply.into()));
        }
        self
    }

    /// Queue a failure for the next call.
    pub fn push_error(&self, error: ProviderError) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error));
        }
        self
    }

    /// Fail every call whose reference contains `fragment`.
    pub fn fail_references_containing(&self, fragment: impl Into<String>) -> &Self {
        if let Ok(mut failing) = self.fail_matching.lock() {
            failing.push(fragment.into());
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatCompletionProvider for MockChatProvider {
    async fn complete(&self, messages: Vec<ChatMessage>, reference: &str) -> TallyResult<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages,
                reference: reference.to_string(),
            });
        }

        let forced_failure = self
            .fail_matching
            .lock()
            .map(|failing| failing.iter().any(|f| reference.contains(f.as_str())))
            .unwrap_or(false);
        if forced_failure {
            return Err(ProviderError::RequestFailed {
                provider: self.provider_name().to_string(),
                status: 500,
                body: format!("scripted failure for {}", reference),
            }
            .into());
        }

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(error)) => Err(error.into()),
            None => Ok(format!("Summary of {}", reference)),
        }
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

/// Stand-in used when no API key is configured. Every call fails, so
/// insights requested in that state end FAILED instead of hanging.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredProvider;

#[async_trait]
impl ChatCompletionProvider for UnconfiguredProvider {
    async fn complete(&self, _messages: Vec<ChatMessage>, _reference: &str) -> TallyResult<String> {
        Err(ProviderError::NotConfigured.into())
    }

    fn provider_name(&self) -> &str {
        "unconfigured"
    }
}
