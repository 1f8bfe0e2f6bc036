//! Chain Memory
//!
//! Key-value state attached to one chain instance. The invocation protocol
//! loads extra variables from it before every call and saves the completed
//! turn after every successful call. Implementations do their own locking so a
//! chain can serve concurrent invocations.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::chain::Values;
use crate::error::{ChainError, Result};
use crate::message::{Conversation, Message};

#[async_trait]
pub trait Memory: Send + Sync {
    /// Keys this memory contributes to the chain inputs
    fn memory_variables(&self) -> Vec<String>;

    /// Derive extra context variables from the known inputs
    async fn load_memory_variables(&self, inputs: &Values) -> Result<Values>;

    /// Persist a completed input/output pair
    async fn save_context(&self, inputs: &Values, outputs: &Values) -> Result<()>;

    /// Forget everything; never called implicitly
    async fn clear(&self) -> Result<()>;
}

/// Memory that stores nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyMemory;

impl EmptyMemory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Memory for EmptyMemory {
    fn memory_variables(&self) -> Vec<String> {
        Vec::new()
    }

    async fn load_memory_variables(&self, _inputs: &Values) -> Result<Values> {
        Ok(Values::new())
    }

    async fn save_context(&self, _inputs: &Values, _outputs: &Values) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// Conversation buffer exposed to prompts as a single `history` string
#[derive(Debug)]
pub struct BufferMemory {
    conversation: RwLock<Conversation>,
    memory_key: String,
    input_key: Option<String>,
    output_key: Option<String>,
    human_prefix: String,
    ai_prefix: String,
    max_tokens: Option<u32>,
}

impl Default for BufferMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferMemory {
    pub fn new() -> Self {
        Self {
            conversation: RwLock::new(Conversation::new()),
            memory_key: "history".into(),
            input_key: None,
            output_key: None,
            human_prefix: "Human".into(),
            ai_prefix: "AI".into(),
            max_tokens: None,
        }
    }

    pub fn with_memory_key(mut self, key: impl Into<String>) -> Self {
        self.memory_key = key.into();
        self
    }

    /// Input key to record; needed when the chain takes several inputs
    pub fn with_input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = Some(key.into());
        self
    }

    /// Output key to record; needed when the chain returns several outputs
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn with_prefixes(mut self, human: impl Into<String>, ai: impl Into<String>) -> Self {
        self.human_prefix = human.into();
        self.ai_prefix = ai.into();
        self
    }

    /// Keep only as much recent history as fits the estimated token budget
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Snapshot of the stored messages
    pub async fn messages(&self) -> Vec<Message> {
        self.conversation.read().await.messages().to_vec()
    }

    fn pick<'a>(&self, values: &'a Values, explicit: Option<&String>, what: &str) -> Result<&'a Value> {
        if let Some(key) = explicit {
            return values
                .get(key)
                .ok_or_else(|| ChainError::Memory(format!("{what} key `{key}` not found")));
        }

        let mut candidates = values.iter().filter(|(k, _)| **k != self.memory_key);
        match (candidates.next(), candidates.next()) {
            (Some((_, value)), None) => Ok(value),
            (None, _) => Err(ChainError::Memory(format!("no {what} value to save"))),
            (Some(_), Some(_)) => Err(ChainError::Memory(format!(
                "multiple {what} keys, set one explicitly"
            ))),
        }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Memory for BufferMemory {
    fn memory_variables(&self) -> Vec<String> {
        vec![self.memory_key.clone()]
    }

    async fn load_memory_variables(&self, _inputs: &Values) -> Result<Values> {
        let buffer = self
            .conversation
            .read()
            .await
            .buffer_string(&self.human_prefix, &self.ai_prefix);

        let mut vars = Values::new();
        vars.insert(self.memory_key.clone(), Value::String(buffer));
        Ok(vars)
    }

    async fn save_context(&self, inputs: &Values, outputs: &Values) -> Result<()> {
        let input = as_text(self.pick(inputs, self.input_key.as_ref(), "input")?);
        let output = as_text(self.pick(outputs, self.output_key.as_ref(), "output")?);

        let mut conversation = self.conversation.write().await;
        conversation.push(Message::human(input));
        conversation.push(Message::ai(output));
        if let Some(max) = self.max_tokens {
            conversation.truncate_to_fit(max);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.conversation.write().await.clear();
        Ok(())
    }
}
