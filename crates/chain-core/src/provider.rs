//! LLM Provider Interfaces
//!
//! Narrow interfaces the core consumes from model backends: single-prompt
//! completion, chat, and embeddings. Streaming providers hand their incremental
//! output to [`collect_stream`], which feeds the caller's token handler and
//! assembles the aggregate text.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chain_core::provider::{CallOptions, LlmProvider};
//!
//! let options = CallOptions::default().with_stop_words(vec!["\nObservation:".into()]);
//! let text = provider.call(&ctx, "Say hi", &options).await?;
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{ChainError, Result};
use crate::message::Message;

/// Handler receiving each streamed text increment. Returning an error aborts
/// the in-flight model call with that error.
pub type TokenHandler = Arc<dyn Fn(&Context, &str) -> Result<()> + Send + Sync>;

/// Per-call model configuration
#[derive(Clone, Default)]
pub struct CallOptions {
    /// Model identifier; providers fall back to their configured default
    pub model: Option<String>,

    /// Maximum tokens to generate; providers fall back to their configured default
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Nucleus sampling
    pub top_p: Option<f32>,

    /// Sequences that halt generation
    pub stop_words: Vec<String>,

    /// Penalty applied to repeated tokens
    pub repetition_penalty: Option<f32>,

    /// Enables streaming when set
    pub streaming_func: Option<TokenHandler>,
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("stop_words", &self.stop_words)
            .field("repetition_penalty", &self.repetition_penalty)
            .field("streaming", &self.streaming_func.is_some())
            .finish()
    }
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_stop_words(mut self, stop_words: Vec<String>) -> Self {
        self.stop_words = stop_words;
        self
    }

    pub fn with_repetition_penalty(mut self, penalty: f32) -> Self {
        self.repetition_penalty = Some(penalty);
        self
    }

    pub fn with_streaming_func<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Context, &str) -> Result<()> + Send + Sync + 'static,
    {
        self.streaming_func = Some(Arc::new(handler));
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming_func.is_some()
    }
}

/// One generated text
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
        }
    }
}

/// Result of a chat call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatGeneration {
    pub message: Message,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Output of a model run, as reported to observers
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LlmResult {
    /// One list of generations per prompt
    pub generations: Vec<Vec<Generation>>,
}

/// Token usage statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// A chunk from streaming completion
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// The text delta
    pub delta: String,

    /// Whether this is the final chunk
    pub done: bool,

    /// Finish reason (typically only on final chunk)
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            ..Default::default()
        }
    }
}

/// Stream type for completion streaming
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Drain a completion stream, handing every non-empty delta to `handler`
/// before appending it to the aggregate.
///
/// Stops early with the stream's error, the handler's error, or the context's
/// cancellation error. The stream is dropped on every return path.
pub async fn collect_stream(
    ctx: &Context,
    mut stream: CompletionStream,
    handler: &TokenHandler,
) -> Result<Generation> {
    let mut text = String::new();
    let mut finish_reason = None;

    loop {
        let next = tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            next = stream.next() => next,
        };

        let Some(chunk) = next else { break };
        let chunk = chunk?;

        if !chunk.delta.is_empty() {
            handler(ctx, &chunk.delta)?;
            text.push_str(&chunk.delta);
        }
        if chunk.finish_reason.is_some() {
            finish_reason = chunk.finish_reason;
        }
        if chunk.done {
            break;
        }
    }

    Ok(Generation { text, finish_reason })
}

/// Single-prompt text completion
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name reported to observers
    fn name(&self) -> &str;

    /// Generate completions, one generation per prompt
    async fn generate(
        &self,
        ctx: &Context,
        prompts: &[String],
        options: &CallOptions,
    ) -> Result<Vec<Generation>>;

    /// Complete a single prompt
    async fn call(&self, ctx: &Context, prompt: &str, options: &CallOptions) -> Result<String> {
        let generations = self.generate(ctx, &[prompt.to_string()], options).await?;
        generations
            .into_iter()
            .next()
            .map(|g| g.text)
            .ok_or(ChainError::EmptyResponse)
    }
}

/// Chat-style model taking role-tagged messages
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat(
        &self,
        ctx: &Context,
        messages: &[Message],
        options: &CallOptions,
    ) -> Result<ChatGeneration>;
}

/// Batched text embeddings
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every input text. The result has exactly one vector per input.
    async fn create_embedding(
        &self,
        ctx: &Context,
        model: Option<&str>,
        input_texts: &[String],
    ) -> Result<Vec<Vec<f64>>>;
}

/// Check a batched response against the request size
pub fn ensure_batch_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ChainError::UnexpectedResponseLength { expected, actual })
    }
}
