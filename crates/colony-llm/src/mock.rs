//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::provider::*;
use colony_core::{ColonyError, Result};

/// A mock LLM provider that returns pre-configured responses.
///
/// # Example
/// ```
/// use colony_llm::mock::MockProvider;
/// let provider = MockProvider::new("test")
///     .with_response(r#"{"type": "execute", "description": "wave"}"#);
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Track all requests received (for assertions in tests).
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    /// Reply used once the queue is empty.
    fallback: String,
    name: String,
}

/// A pre-configured response from the mock provider.
#[derive(Clone)]
pub struct MockResponse {
    pub text: String,
    pub usage: Usage,
    /// Simulated latency before the response is returned.
    pub delay: Option<Duration>,
    /// If set, the provider will return this error instead.
    pub error: Option<String>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: String::new(),
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
            delay: None,
            error: None,
        }
    }
}

impl MockResponse {
    /// Create a text response.
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    /// Create an error response.
    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
            fallback: "[]".to_string(),
            name: name.into(),
        }
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().push(MockResponse::text(text));
        self
    }

    /// Queue a JSON response.
    pub fn with_json(self, value: serde_json::Value) -> Self {
        self.responses.lock().push(MockResponse::text(&value.to_string()));
        self
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.responses.lock().push(MockResponse::error(error));
        self
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.responses.lock().push(resp);
        self
    }

    /// Reply returned once the queue is exhausted (default: an empty action list).
    pub fn with_fallback(mut self, text: &str) -> Self {
        self.fallback = text.to_string();
        self
    }

    /// Get all requests that were made to this provider.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<LlmRequest>>> {
        Arc::clone(&self.requests)
    }

    /// Queue a response directly (for mutable access patterns).
    pub fn queue_response(&mut self, resp: MockResponse) {
        self.responses.lock().push(resp);
    }

    /// Number of responses still queued.
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    fn next_response(&self) -> MockResponse {
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            MockResponse::text(&self.fallback)
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        let mock = self.next_response();

        if let Some(delay) = mock.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = mock.error {
            return Err(ColonyError::LlmProvider(error));
        }

        Ok(LlmResponse {
            text: mock.text,
            usage: mock.usage,
            stop_reason: StopReason::EndTurn,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
