//! OpenAI Provider
//!
//! Completion, chat and embedding calls against the OpenAI HTTP API, or any
//! server that speaks the same protocol.

use std::time::Duration;

use async_trait::async_trait;
use chain_core::{
    context::Context,
    error::{ChainError, Result},
    message::{Message, Role},
    provider::{
        collect_stream, ensure_batch_len, CallOptions, ChatGeneration, ChatProvider, EmbeddingProvider,
        FinishReason, Generation, LlmProvider, StreamChunk, TokenUsage,
    },
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::http::{bearer_headers, sse_stream, status_to_error, transport_error};

pub const TOKEN_ENV_VAR: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV_VAR: &str = "OPENAI_BASE_URL";
pub const MODEL_ENV_VAR: &str = "OPENAI_MODEL";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo-instruct";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Embedding models the provider accepts
pub const EMBEDDING_MODELS: &[&str] = &[
    "text-embedding-ada-002",
    "text-embedding-3-small",
    "text-embedding-3-large",
    "text-similarity-ada-001",
    "text-similarity-babbage-001",
    "text-similarity-curie-001",
    "text-similarity-davinci-001",
    "text-search-ada-doc-001",
    "text-search-ada-query-001",
];

/// OpenAI provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API key sent as a Bearer token
    pub api_key: String,

    /// API root, e.g. `https://api.openai.com/v1`
    pub base_url: String,

    /// Model used by `chat` when the call options name none
    pub chat_model: String,

    /// Model used by `generate` when the call options name none
    pub completion_model: String,

    /// Model used by `create_embedding` when the caller names none
    pub embedding_model: String,

    /// Token limit when the call options set none
    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            chat_model: DEFAULT_CHAT_MODEL.into(),
            completion_model: DEFAULT_COMPLETION_MODEL.into(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    /// Config with an explicit key and the default endpoint and models
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. `OPENAI_MODEL` overrides both the
    /// chat and completion defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(TOKEN_ENV_VAR)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ChainError::MissingToken(TOKEN_ENV_VAR.into()))?;

        let mut config = Self::new(api_key);
        if let Some(base_url) = lookup(BASE_URL_ENV_VAR).filter(|u| !u.is_empty()) {
            config.base_url = base_url;
        }
        if let Some(model) = lookup(MODEL_ENV_VAR).filter(|m| !m.is_empty()) {
            config.chat_model.clone_from(&model);
            config.completion_model = model;
        }
        Ok(config)
    }
}

/// OpenAI LLM provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration; the API key must be set
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(ChainError::MissingToken(TOKEN_ENV_VAR.into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChainError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::from_env()?)
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post<B: Serialize + Sync>(&self, ctx: &Context, endpoint: &str, body: &B) -> Result<reqwest::Response> {
        let url = self.url(endpoint);
        let request = self
            .client
            .post(&url)
            .headers(bearer_headers(&self.config.api_key))
            .json(body);

        let resp = ctx
            .run(async { request.send().await.map_err(transport_error) })
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            tracing::warn!(status, endpoint, "OpenAI request failed");
            return Err(status_to_error(status, &body_text));
        }
        Ok(resp)
    }

    async fn post_json<B, T>(&self, ctx: &Context, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let resp = self.post(ctx, endpoint, body).await?;
        ctx.run(async { resp.json::<T>().await.map_err(transport_error) })
            .await
    }

    async fn complete_one(&self, ctx: &Context, prompt: &str, options: &CallOptions) -> Result<Generation> {
        let request = CompletionRequest {
            model: options.model.as_deref().unwrap_or(&self.config.completion_model),
            prompt,
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: options.temperature,
            top_p: options.top_p,
            stop: &options.stop_words,
            frequency_penalty: options.repetition_penalty,
            stream: options.streaming_func.is_some(),
        };
        debug!(model = request.model, stream = request.stream, "OpenAI completion");

        if let Some(handler) = &options.streaming_func {
            let resp = self.post(ctx, "completions", &request).await?;
            let stream = sse_stream(resp, |event: CompletionResponse| {
                let choice = event.choices.into_iter().next().ok_or(ChainError::EmptyResponse)?;
                Ok(StreamChunk {
                    delta: choice.text,
                    done: false,
                    finish_reason: choice.finish_reason.as_deref().map(FinishReason::parse),
                })
            });
            return collect_stream(ctx, stream, handler).await;
        }

        let resp: CompletionResponse = self.post_json(ctx, "completions", &request).await?;
        log_usage(resp.usage.as_ref());

        let choice = resp.choices.into_iter().next().ok_or(ChainError::EmptyResponse)?;
        Ok(Generation {
            text: choice.text,
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::parse),
        })
    }
}

fn log_usage(usage: Option<&TokenUsage>) {
    if let Some(usage) = usage {
        debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "OpenAI usage"
        );
    }
}

fn wire_role(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::Ai => "assistant",
        Role::Human | Role::Generic => "user",
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    /// One request per prompt, in order
    async fn generate(&self, ctx: &Context, prompts: &[String], options: &CallOptions) -> Result<Vec<Generation>> {
        let mut generations = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            generations.push(self.complete_one(ctx, prompt, options).await?);
        }
        Ok(generations)
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, ctx: &Context, messages: &[Message], options: &CallOptions) -> Result<ChatGeneration> {
        let request = ChatRequest {
            model: options.model.as_deref().unwrap_or(&self.config.chat_model),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: wire_role(&m.role),
                    content: &m.content,
                    name: m.name.as_deref(),
                })
                .collect(),
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: options.temperature,
            top_p: options.top_p,
            stop: &options.stop_words,
            frequency_penalty: options.repetition_penalty,
            stream: options.streaming_func.is_some(),
        };
        debug!(model = request.model, messages = messages.len(), stream = request.stream, "OpenAI chat");

        if let Some(handler) = &options.streaming_func {
            let resp = self.post(ctx, "chat/completions", &request).await?;
            let stream = sse_stream(resp, |event: ChatStreamEvent| {
                let choice = event.choices.into_iter().next().ok_or(ChainError::EmptyResponse)?;
                Ok(StreamChunk {
                    delta: choice.delta.content.unwrap_or_default(),
                    done: false,
                    finish_reason: choice.finish_reason.as_deref().map(FinishReason::parse),
                })
            });
            let generation = collect_stream(ctx, stream, handler).await?;
            return Ok(ChatGeneration {
                message: Message::ai(generation.text),
                finish_reason: generation.finish_reason,
            });
        }

        let resp: ChatResponse = self.post_json(ctx, "chat/completions", &request).await?;
        log_usage(resp.usage.as_ref());

        let choice = resp.choices.into_iter().next().ok_or(ChainError::EmptyResponse)?;
        Ok(ChatGeneration {
            message: Message::ai(choice.message.content.unwrap_or_default()),
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::parse),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn create_embedding(
        &self,
        ctx: &Context,
        model: Option<&str>,
        input_texts: &[String],
    ) -> Result<Vec<Vec<f64>>> {
        let model = model.filter(|m| !m.is_empty()).unwrap_or(&self.config.embedding_model);
        if !EMBEDDING_MODELS.contains(&model) {
            return Err(ChainError::UnexpectedEmbeddingModel(model.to_string()));
        }
        debug!(model, inputs = input_texts.len(), "OpenAI embeddings");

        let request = EmbeddingRequest { model, input: input_texts };
        let resp: EmbeddingResponse = self.post_json(ctx, "embeddings", &request).await?;
        log_usage(resp.usage.as_ref());

        let mut data = resp.data;
        if data.is_empty() {
            return Err(ChainError::EmptyResponse);
        }
        ensure_batch_len(input_texts.len(), data.len())?;

        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
    finish_reason: Option<String>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatStreamEvent {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    delta: ChatDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f64>,
}
