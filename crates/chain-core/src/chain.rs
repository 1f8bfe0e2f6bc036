//! Chains
//!
//! A chain declares the keys it consumes and produces and owns a [`Memory`].
//! Chains are always invoked through [`call`] (or [`run`]), which validates
//! both sides of the contract, merges memory variables in and saves the
//! completed turn. [`Chain::call`] is the chain's own logic and is not meant to
//! be invoked directly.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::callbacks::{CallbackHandler, CallbackList, CallbackManager};
use crate::context::Context;
use crate::error::{ChainError, Result};
use crate::memory::Memory;

/// Chain input and output values
pub type Values = HashMap<String, Value>;

/// Per-call options for a chain
#[derive(Clone, Default)]
pub struct ChainCallOptions {
    /// Sequences that halt model generation early
    pub stop_words: Vec<String>,

    /// Observers notified of lifecycle events during this call
    pub callbacks: CallbackList,
}

impl ChainCallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stop_words(mut self, stop_words: Vec<String>) -> Self {
        self.stop_words = stop_words;
        self
    }

    pub fn with_callbacks(mut self, callbacks: CallbackList) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn callback_manager(&self) -> CallbackManager {
        CallbackManager::from(&self.callbacks)
    }
}

impl std::fmt::Debug for ChainCallOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainCallOptions")
            .field("stop_words", &self.stop_words)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

#[async_trait]
pub trait Chain: Send + Sync {
    /// Name reported to observers
    fn name(&self) -> &str;

    /// Run the chain's logic. Use [`call`] instead, which handles memory and
    /// validation.
    async fn call(&self, ctx: &Context, inputs: Values, options: &ChainCallOptions) -> Result<Values>;

    fn memory(&self) -> &dyn Memory;

    /// Keys the chain expects
    fn input_keys(&self) -> Vec<String>;

    /// Keys the chain produces
    fn output_keys(&self) -> Vec<String>;
}

/// Invoke a chain: validate inputs, load memory, call, validate outputs, save.
pub async fn call(
    ctx: &Context,
    chain: &dyn Chain,
    input_values: Values,
    options: &ChainCallOptions,
) -> Result<Values> {
    ctx.check()?;
    validate_inputs(chain, &input_values)?;

    let callbacks = options.callback_manager();
    callbacks.handle_chain_start(ctx, chain.name(), &input_values);

    match call_validated(ctx, chain, input_values, options).await {
        Ok(outputs) => {
            callbacks.handle_chain_end(ctx, &outputs);
            Ok(outputs)
        }
        Err(err) => {
            callbacks.handle_chain_error(ctx, &err);
            Err(err)
        }
    }
}

async fn call_validated(
    ctx: &Context,
    chain: &dyn Chain,
    input_values: Values,
    options: &ChainCallOptions,
) -> Result<Values> {
    let memory = chain.memory();

    let mut full_values = input_values.clone();
    let memory_values = memory.load_memory_variables(&input_values).await?;
    for (key, value) in memory_values {
        if full_values.contains_key(&key) {
            tracing::warn!(chain = chain.name(), key = %key, "memory variable overrides an input value");
        }
        full_values.insert(key, value);
    }

    let output_values = chain.call(ctx, full_values, options).await?;
    validate_outputs(chain, &output_values)?;

    memory.save_context(&input_values, &output_values).await?;

    Ok(output_values)
}

/// Call a chain that takes one input and returns one textual output
pub async fn run(
    ctx: &Context,
    chain: &dyn Chain,
    input: impl Into<String>,
    options: &ChainCallOptions,
) -> Result<String> {
    let input_keys = chain.input_keys();
    let [input_key] = input_keys.as_slice() else {
        return Err(ChainError::MultipleInputsInRun(input_keys.len()));
    };

    let output_keys = chain.output_keys();
    let [output_key] = output_keys.as_slice() else {
        return Err(ChainError::MultipleOutputsInRun(output_keys.len()));
    };

    let mut input_values = Values::new();
    input_values.insert(input_key.clone(), Value::String(input.into()));

    let mut output_values = call(ctx, chain, input_values, options).await?;

    match output_values.remove(output_key) {
        Some(Value::String(text)) => Ok(text),
        _ => Err(ChainError::WrongOutputTypeInRun),
    }
}

fn validate_inputs(chain: &dyn Chain, input_values: &Values) -> Result<()> {
    match chain.input_keys().into_iter().find(|k| !input_values.contains_key(k)) {
        Some(key) => Err(ChainError::MissingInput(key)),
        None => Ok(()),
    }
}

fn validate_outputs(chain: &dyn Chain, output_values: &Values) -> Result<()> {
    match chain.output_keys().into_iter().find(|k| !output_values.contains_key(k)) {
        Some(key) => Err(ChainError::MissingOutput(key)),
        None => Ok(()),
    }
}
