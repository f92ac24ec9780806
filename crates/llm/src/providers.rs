//! Provider bindings (spec.md §4.E "Provider bindings").
//!
//! Grounded on the teacher's `LlmBackend` trait and `OllamaBackend`
//! (`crates/llm/src/backend.rs`): a small async trait, one concrete
//! struct per backend, each owning a `reqwest::Client` and mapping its
//! wire format to a common response shape. Generalized from a single
//! hardcoded Ollama binding into the five bindings spec.md §4.E names.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::prompt::PromptEnvelope;
use crate::LlmError;

/// Which wire protocol a [`LlmProvider`] speaks, spec.md §4.E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
    OpenaiCompatible,
    AnthropicCompatible,
    Gemini,
    Custom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub provider_name: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// A single LLM backend, spec.md §4.E. `probe` backs the gateway's
/// health loop; `generate` serves every task kind.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    async fn generate(&self, prompt: &PromptEnvelope) -> Result<Completion, LlmError>;

    /// A cheap request used only to learn whether the backend is
    /// reachable, spec.md §4.E "Health probing".
    async fn probe(&self) -> Result<(), LlmError>;
}

/// The envelope's `params.timeoutMs` bounded by the provider's configured
/// ceiling, spec.md §4.E "per-request timeout is the envelope's
/// `params.timeoutMs` bounded by `providerMaxTimeoutMs`".
fn effective_timeout(requested_ms: u64, max_timeout_ms: u64) -> Duration {
    Duration::from_millis(requested_ms.min(max_timeout_ms))
}

fn http_error_to_llm_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else if err.status().map(|s| s.as_u16() == 429).unwrap_or(false) {
        LlmError::RateLimited
    } else {
        LlmError::Protocol(err.to_string())
    }
}

/// Ollama-compatible local HTTP binding (`POST {base_url}/api/chat`).
pub struct OllamaProvider {
    name: String,
    base_url: String,
    model: String,
    max_timeout_ms: u64,
    health_timeout_ms: u64,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        max_timeout_ms: u64,
        health_timeout_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            max_timeout_ms,
            health_timeout_ms,
            client: reqwest::Client::new(),
        }
    }

    fn chat_messages(&self, prompt: &PromptEnvelope) -> Vec<Value> {
        let mut messages = vec![json!({"role": "system", "content": prompt.system_prompt})];
        messages.extend(prompt.messages.iter().map(|m| {
            json!({
                "role": match m.role {
                    shellwright_memory::Role::User => "user",
                    shellwright_memory::Role::Assistant => "assistant",
                    shellwright_memory::Role::System => "system",
                },
                "content": m.content,
            })
        }));
        messages
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn generate(&self, prompt: &PromptEnvelope) -> Result<Completion, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": self.chat_messages(prompt),
            "stream": false,
            "options": {
                "temperature": prompt.params.temperature,
                "num_predict": prompt.params.max_tokens,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .timeout(effective_timeout(prompt.params.timeout_ms, self.max_timeout_ms))
            .send()
            .await
            .map_err(http_error_to_llm_error)?;

        if !response.status().is_success() {
            return Err(LlmError::BadRequest(format!(
                "ollama returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(http_error_to_llm_error)?;
        let text = payload["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Protocol("missing message.content".to_string()))?
            .to_string();

        Ok(Completion {
            text,
            provider_name: self.name.clone(),
            usage: TokenUsage {
                prompt_tokens: payload["prompt_eval_count"].as_u64().map(|v| v as u32),
                completion_tokens: payload["eval_count"].as_u64().map(|v| v as u32),
            },
        })
    }

    async fn probe(&self) -> Result<(), LlmError> {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_millis(self.health_timeout_ms))
            .send()
            .await
            .map_err(http_error_to_llm_error)?
            .error_for_status()
            .map_err(http_error_to_llm_error)?;
        Ok(())
    }
}

/// OpenAI-compatible chat completions binding
/// (`POST {base_url}/v1/chat/completions`).
pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_timeout_ms: u64,
    health_timeout_ms: u64,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        max_timeout_ms: u64,
        health_timeout_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            max_timeout_ms,
            health_timeout_ms,
            client: reqwest::Client::new(),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenaiCompatible
    }

    async fn generate(&self, prompt: &PromptEnvelope) -> Result<Completion, LlmError> {
        let mut messages = vec![json!({"role": "system", "content": prompt.system_prompt})];
        messages.extend(prompt.messages.iter().map(|m| {
            json!({
                "role": match m.role {
                    shellwright_memory::Role::User => "user",
                    shellwright_memory::Role::Assistant => "assistant",
                    shellwright_memory::Role::System => "system",
                },
                "content": m.content,
            })
        }));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": prompt.params.temperature,
            "max_tokens": prompt.params.max_tokens,
            "stop": prompt.params.stop,
        });

        let request = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body)
            .timeout(effective_timeout(prompt.params.timeout_ms, self.max_timeout_ms));

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(http_error_to_llm_error)?;

        if !response.status().is_success() {
            return Err(LlmError::BadRequest(format!(
                "openai-compatible endpoint returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(http_error_to_llm_error)?;
        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Protocol("missing choices[0].message.content".to_string()))?
            .to_string();

        Ok(Completion {
            text,
            provider_name: self.name.clone(),
            usage: TokenUsage {
                prompt_tokens: payload["usage"]["prompt_tokens"].as_u64().map(|v| v as u32),
                completion_tokens: payload["usage"]["completion_tokens"].as_u64().map(|v| v as u32),
            },
        })
    }

    async fn probe(&self) -> Result<(), LlmError> {
        let request = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .timeout(Duration::from_millis(self.health_timeout_ms));
        self.authorized(request)
            .send()
            .await
            .map_err(http_error_to_llm_error)?
            .error_for_status()
            .map_err(http_error_to_llm_error)?;
        Ok(())
    }
}

/// Anthropic-compatible messages binding (`POST {base_url}/v1/messages`).
pub struct AnthropicCompatibleProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: String,
    max_timeout_ms: u64,
    health_timeout_ms: u64,
    client: reqwest::Client,
}

impl AnthropicCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        max_timeout_ms: u64,
        health_timeout_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            max_timeout_ms,
            health_timeout_ms,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::AnthropicCompatible
    }

    async fn generate(&self, prompt: &PromptEnvelope) -> Result<Completion, LlmError> {
        let messages: Vec<Value> = prompt
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        shellwright_memory::Role::Assistant => "assistant",
                        _ => "user",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let body = json!({
            "model": self.model,
            "system": prompt.system_prompt,
            "messages": messages,
            "max_tokens": prompt.params.max_tokens,
            "temperature": prompt.params.temperature,
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .timeout(effective_timeout(prompt.params.timeout_ms, self.max_timeout_ms))
            .send()
            .await
            .map_err(http_error_to_llm_error)?;

        if !response.status().is_success() {
            return Err(LlmError::BadRequest(format!(
                "anthropic-compatible endpoint returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(http_error_to_llm_error)?;
        let text = payload["content"][0]["text"]
            .as_str()
            .ok_or_else(|| LlmError::Protocol("missing content[0].text".to_string()))?
            .to_string();

        Ok(Completion {
            text,
            provider_name: self.name.clone(),
            usage: TokenUsage {
                prompt_tokens: payload["usage"]["input_tokens"].as_u64().map(|v| v as u32),
                completion_tokens: payload["usage"]["output_tokens"].as_u64().map(|v| v as u32),
            },
        })
    }

    async fn probe(&self) -> Result<(), LlmError> {
        // Anthropic's message API has no lightweight health route; a
        // minimal one-token request stands in for a probe.
        let body = json!({
            "model": self.model,
            "max_tokens": 1,
            "messages": [{"role": "user", "content": "ping"}],
        });
        self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .timeout(Duration::from_millis(self.health_timeout_ms))
            .send()
            .await
            .map_err(http_error_to_llm_error)?
            .error_for_status()
            .map_err(http_error_to_llm_error)?;
        Ok(())
    }
}

/// Google Gemini `generateContent` binding.
pub struct GeminiProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: String,
    max_timeout_ms: u64,
    health_timeout_ms: u64,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        max_timeout_ms: u64,
        health_timeout_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            max_timeout_ms,
            health_timeout_ms,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}?key={}",
            self.base_url, self.model, method, self.api_key
        )
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn generate(&self, prompt: &PromptEnvelope) -> Result<Completion, LlmError> {
        let contents: Vec<Value> = prompt
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        shellwright_memory::Role::Assistant => "model",
                        _ => "user",
                    },
                    "parts": [{"text": m.content}],
                })
            })
            .collect();

        let body = json!({
            "systemInstruction": {"parts": [{"text": prompt.system_prompt}]},
            "contents": contents,
            "generationConfig": {
                "temperature": prompt.params.temperature,
                "maxOutputTokens": prompt.params.max_tokens,
            },
        });

        let response = self
            .client
            .post(self.endpoint("generateContent"))
            .json(&body)
            .timeout(effective_timeout(prompt.params.timeout_ms, self.max_timeout_ms))
            .send()
            .await
            .map_err(http_error_to_llm_error)?;

        if !response.status().is_success() {
            return Err(LlmError::BadRequest(format!(
                "gemini endpoint returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(http_error_to_llm_error)?;
        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| LlmError::Protocol("missing candidates[0].content.parts[0].text".to_string()))?
            .to_string();

        Ok(Completion {
            text,
            provider_name: self.name.clone(),
            usage: TokenUsage {
                prompt_tokens: payload["usageMetadata"]["promptTokenCount"].as_u64().map(|v| v as u32),
                completion_tokens: payload["usageMetadata"]["candidatesTokenCount"].as_u64().map(|v| v as u32),
            },
        })
    }

    async fn probe(&self) -> Result<(), LlmError> {
        self.client
            .get(format!(
                "{}/v1beta/models/{}?key={}",
                self.base_url, self.model, self.api_key
            ))
            .timeout(Duration::from_millis(self.health_timeout_ms))
            .send()
            .await
            .map_err(http_error_to_llm_error)?
            .error_for_status()
            .map_err(http_error_to_llm_error)?;
        Ok(())
    }
}

/// A bare HTTP endpoint speaking a caller-supplied JSON shape: the
/// request body and response-path JSON pointer are both configurable,
/// spec.md §4.E "custom HTTP endpoint".
pub struct CustomHttpProvider {
    name: String,
    url: String,
    response_pointer: String,
    headers: Vec<(String, String)>,
    max_timeout_ms: u64,
    health_timeout_ms: u64,
    client: reqwest::Client,
}

impl CustomHttpProvider {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        response_pointer: impl Into<String>,
        headers: Vec<(String, String)>,
        max_timeout_ms: u64,
        health_timeout_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            response_pointer: response_pointer.into(),
            headers,
            max_timeout_ms,
            health_timeout_ms,
            client: reqwest::Client::new(),
        }
    }

    fn apply_headers(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        builder
    }
}

#[async_trait]
impl LlmProvider for CustomHttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Custom
    }

    async fn generate(&self, prompt: &PromptEnvelope) -> Result<Completion, LlmError> {
        let body = json!({
            "system_prompt": prompt.system_prompt,
            "messages": prompt.messages,
            "params": prompt.params,
        });

        let request = self
            .client
            .post(&self.url)
            .json(&body)
            .timeout(effective_timeout(prompt.params.timeout_ms, self.max_timeout_ms));

        let response = self
            .apply_headers(request)
            .send()
            .await
            .map_err(http_error_to_llm_error)?;

        if !response.status().is_success() {
            return Err(LlmError::BadRequest(format!(
                "custom endpoint returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(http_error_to_llm_error)?;
        let text = payload
            .pointer(&self.response_pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::Protocol(format!("missing pointer {}", self.response_pointer)))?
            .to_string();

        Ok(Completion {
            text,
            provider_name: self.name.clone(),
            usage: TokenUsage::default(),
        })
    }

    async fn probe(&self) -> Result<(), LlmError> {
        let request = self.client.head(&self.url).timeout(Duration::from_millis(self.health_timeout_ms));
        self.apply_headers(request)
            .send()
            .await
            .map_err(http_error_to_llm_error)?;
        Ok(())
    }
}
