//! LLM Chain
//!
//! Formats a prompt from the chain inputs, makes one completion call and
//! returns the text under `output_key` (`"text"` by default).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::callbacks::{CallbackHandler, CallbackManager};
use crate::chain::{Chain, ChainCallOptions, Values};
use crate::context::Context;
use crate::error::{ChainError, Result};
use crate::memory::{EmptyMemory, Memory};
use crate::prompt::PromptTemplate;
use crate::provider::{CallOptions, Generation, LlmProvider, LlmResult};

pub const DEFAULT_OUTPUT_KEY: &str = "text";

pub struct LlmChain {
    llm: Arc<dyn LlmProvider>,
    prompt: PromptTemplate,
    memory: Box<dyn Memory>,
    output_key: String,
    call_options: CallOptions,
    streaming: bool,
}

impl LlmChain {
    pub fn new(llm: Arc<dyn LlmProvider>, prompt: PromptTemplate) -> Self {
        Self {
            llm,
            prompt,
            memory: Box::new(EmptyMemory),
            output_key: DEFAULT_OUTPUT_KEY.into(),
            call_options: CallOptions::default(),
            streaming: false,
        }
    }

    pub fn with_memory(mut self, memory: impl Memory + 'static) -> Self {
        self.memory = Box::new(memory);
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    /// Model settings applied to every call; per-call stop words are appended
    pub fn with_call_options(mut self, options: CallOptions) -> Self {
        self.call_options = options;
        self
    }

    /// Stream the completion, forwarding each token to the call's observers
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    fn options_for(&self, options: &ChainCallOptions, callbacks: &CallbackManager) -> CallOptions {
        let mut call_options = self.call_options.clone();
        call_options.stop_words.extend(options.stop_words.iter().cloned());

        if self.streaming {
            let callbacks = callbacks.clone();
            call_options = call_options.with_streaming_func(move |ctx, token| {
                callbacks.handle_llm_new_token(ctx, token);
                Ok(())
            });
        }
        call_options
    }
}

#[async_trait]
impl Chain for LlmChain {
    fn name(&self) -> &str {
        "llm_chain"
    }

    async fn call(&self, ctx: &Context, inputs: Values, options: &ChainCallOptions) -> Result<Values> {
        let prompt = self.prompt.format(&inputs)?;
        let callbacks = options.callback_manager();
        let call_options = self.options_for(options, &callbacks);

        let prompts = vec![prompt];
        callbacks.handle_llm_start(ctx, self.llm.name(), &prompts);

        let result = ctx.run(self.llm.generate(ctx, &prompts, &call_options)).await;
        let generations = match result {
            Ok(generations) => generations,
            Err(err) => {
                callbacks.handle_llm_error(ctx, &err);
                return Err(err);
            }
        };

        let text = match generations.first() {
            Some(Generation { text, .. }) => text.clone(),
            None => {
                let err = ChainError::EmptyResponse;
                callbacks.handle_llm_error(ctx, &err);
                return Err(err);
            }
        };

        callbacks.handle_llm_end(ctx, &LlmResult { generations: vec![generations] });

        let mut outputs = Values::new();
        outputs.insert(self.output_key.clone(), Value::String(text));
        Ok(outputs)
    }

    fn memory(&self) -> &dyn Memory {
        self.memory.as_ref()
    }

    fn input_keys(&self) -> Vec<String> {
        self.prompt.input_variables().to_vec()
    }

    fn output_keys(&self) -> Vec<String> {
        vec![self.output_key.clone()]
    }
}
