//! `ModelProvider` capability: send a prompt, get text + token count back.
//!
//! The HTTP implementation is grounded on `ensemble/coordinator.rs::query_model`
//! — same request/response shape (`messages`, `max_tokens`, `temperature`),
//! same "check status, then parse JSON, then pull the first choice" flow.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use schemars::schema::RootSchema;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Request passed to a provider. `response_schema` is advisory — providers
/// that support structured output should use it to constrain generation;
/// others may ignore it.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub temperature: f64,
    pub response_schema: Option<RootSchema>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, temperature: f64) -> Self {
        Self { prompt: prompt.into(), system_instruction: None, temperature, response_schema: None }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_response_schema(mut self, schema: RootSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
    pub tokens_used: u32,
}

/// Single capability the orchestrator depends on. No streaming; the contract
/// is synchronous from the caller's perspective even though the trait is async.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ProviderError>;
}

// ---------------------------------------------------------------------------
// HttpModelProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

/// Calls an OpenAI-style chat-completions endpoint (an LLM router in front of
/// one or more concrete backends). Grounded on `EnsembleCoordinator::query_model`.
pub struct HttpModelProvider {
    http: reqwest::Client,
    router_url: String,
    model: String,
    max_tokens: u32,
}

impl HttpModelProvider {
    pub fn new(router_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .expect("reqwest client builds"),
            router_url: router_url.into(),
            model: model.into(),
            max_tokens: 2048,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let mut messages = Vec::new();
        if let Some(instruction) = &request.system_instruction {
            messages.push(ChatMessage { role: "system", content: instruction.clone() });
        }
        messages.push(ChatMessage { role: "user", content: request.prompt });

        let body = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(&self.router_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::BadStatus { status, body: text });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("no choices in response".to_string()))?;

        Ok(GenerateResponse {
            text: choice.message.content,
            tokens_used: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// Deterministic table-driven provider for tests and the CLI demo mode.
/// Responses are matched by a substring of the prompt, checked in insertion
/// order; the first match wins. Falls back to `default_response` if none match.
pub struct MockProvider {
    responses: Vec<(String, String)>,
    default_response: String,
    calls: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(default_response: impl Into<String>) -> Self {
        Self { responses: Vec::new(), default_response: default_response.into(), calls: Mutex::new(Vec::new()) }
    }

    pub fn with_response(mut self, prompt_contains: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.push((prompt_contains.into(), response.into()));
        self
    }

    /// Prompts sent so far, in order — used by tests that inspect what the
    /// orchestrator actually asked for (e.g. the bias-prevention scenario).
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.calls.lock().expect("mock provider mutex poisoned").clone()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        self.calls.lock().expect("mock provider mutex poisoned").push(request.prompt.clone());
        let text = self
            .responses
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default_response.clone());
        Ok(GenerateResponse { text: text.clone(), tokens_used: text.split_whitespace().count() as u32 })
    }
}

/// A provider whose every call times out — used to exercise per-phase
/// timeout/fallback paths (spec.md §8 scenario 4).
pub struct StallingProvider {
    pub delay: Duration,
}

#[async_trait]
impl ModelProvider for StallingProvider {
    async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(GenerateResponse { text: String::new(), tokens_used: 0 })
    }
}

pub type SharedProvider = std::sync::Arc<dyn ModelProvider>;

#[async_trait]
impl<T: ModelProvider + ?Sized> ModelProvider for std::sync::Arc<T> {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        (**self).generate(request).await
    }
}
