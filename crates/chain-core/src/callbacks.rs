//! Lifecycle Callbacks
//!
//! Observers receive model, chain, tool and agent lifecycle events. Delivery is
//! synchronous and in registration order; an empty list makes every emission a
//! no-op. Observers must not panic.

use std::sync::Arc;

use crate::agents::{AgentAction, AgentFinish};
use crate::chain::Values;
use crate::context::Context;
use crate::error::ChainError;
use crate::message::Message;
use crate::provider::LlmResult;

/// Observer of lifecycle events. Every hook defaults to a no-op.
#[allow(unused_variables)]
pub trait CallbackHandler: Send + Sync {
    /// Start of an LLM run, with the prompt(s)
    fn handle_llm_start(&self, ctx: &Context, llm: &str, prompts: &[String]) {}

    /// Start of a chat model run, with the messages
    fn handle_chat_model_start(&self, ctx: &Context, llm: &str, messages: &[Message]) {}

    /// A streaming model produced a new token
    fn handle_llm_new_token(&self, ctx: &Context, token: &str) {}

    fn handle_llm_error(&self, ctx: &Context, err: &ChainError) {}

    fn handle_llm_end(&self, ctx: &Context, output: &LlmResult) {}

    /// Start of a chain run, with the chain name and inputs
    fn handle_chain_start(&self, ctx: &Context, chain: &str, inputs: &Values) {}

    fn handle_chain_error(&self, ctx: &Context, err: &ChainError) {}

    fn handle_chain_end(&self, ctx: &Context, outputs: &Values) {}

    /// Start of a tool run, with the tool name and input
    fn handle_tool_start(&self, ctx: &Context, tool: &str, input: &str) {}

    fn handle_tool_error(&self, ctx: &Context, err: &ChainError) {}

    fn handle_tool_end(&self, ctx: &Context, output: &str) {}

    fn handle_text(&self, ctx: &Context, text: &str) {}

    /// An agent is about to execute an action
    fn handle_agent_action(&self, ctx: &Context, action: &AgentAction) {}

    /// An agent finished, before it returns
    fn handle_agent_end(&self, ctx: &Context, finish: &AgentFinish) {}
}

/// Observers registered for one call
pub type CallbackList = Vec<Arc<dyn CallbackHandler>>;

/// Broadcasts every event to a list of observers
#[derive(Clone, Default)]
pub struct CallbackManager {
    handlers: CallbackList,
}

impl CallbackManager {
    pub fn new(handlers: CallbackList) -> Self {
        Self { handlers }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn each(&self, f: impl Fn(&dyn CallbackHandler)) {
        for handler in &self.handlers {
            f(handler.as_ref());
        }
    }
}

impl std::fmt::Debug for CallbackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackManager")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl From<&CallbackList> for CallbackManager {
    fn from(handlers: &CallbackList) -> Self {
        Self::new(handlers.clone())
    }
}

impl CallbackHandler for CallbackManager {
    fn handle_llm_start(&self, ctx: &Context, llm: &str, prompts: &[String]) {
        self.each(|h| h.handle_llm_start(ctx, llm, prompts));
    }

    fn handle_chat_model_start(&self, ctx: &Context, llm: &str, messages: &[Message]) {
        self.each(|h| h.handle_chat_model_start(ctx, llm, messages));
    }

    fn handle_llm_new_token(&self, ctx: &Context, token: &str) {
        self.each(|h| h.handle_llm_new_token(ctx, token));
    }

    fn handle_llm_error(&self, ctx: &Context, err: &ChainError) {
        self.each(|h| h.handle_llm_error(ctx, err));
    }

    fn handle_llm_end(&self, ctx: &Context, output: &LlmResult) {
        self.each(|h| h.handle_llm_end(ctx, output));
    }

    fn handle_chain_start(&self, ctx: &Context, chain: &str, inputs: &Values) {
        self.each(|h| h.handle_chain_start(ctx, chain, inputs));
    }

    fn handle_chain_error(&self, ctx: &Context, err: &ChainError) {
        self.each(|h| h.handle_chain_error(ctx, err));
    }

    fn handle_chain_end(&self, ctx: &Context, outputs: &Values) {
        self.each(|h| h.handle_chain_end(ctx, outputs));
    }

    fn handle_tool_start(&self, ctx: &Context, tool: &str, input: &str) {
        self.each(|h| h.handle_tool_start(ctx, tool, input));
    }

    fn handle_tool_error(&self, ctx: &Context, err: &ChainError) {
        self.each(|h| h.handle_tool_error(ctx, err));
    }

    fn handle_tool_end(&self, ctx: &Context, output: &str) {
        self.each(|h| h.handle_tool_end(ctx, output));
    }

    fn handle_text(&self, ctx: &Context, text: &str) {
        self.each(|h| h.handle_text(ctx, text));
    }

    fn handle_agent_action(&self, ctx: &Context, action: &AgentAction) {
        self.each(|h| h.handle_agent_action(ctx, action));
    }

    fn handle_agent_end(&self, ctx: &Context, finish: &AgentFinish) {
        self.each(|h| h.handle_agent_end(ctx, finish));
    }
}

/// Writes every event to `tracing`, tagged `[kind/phase]` with the trace id
#[derive(Clone, Debug, Default)]
pub struct LogHandler;

impl LogHandler {
    pub fn new() -> Self {
        Self
    }
}

fn trace(ctx: &Context) -> &str {
    ctx.trace_id().unwrap_or("")
}

impl CallbackHandler for LogHandler {
    fn handle_llm_start(&self, ctx: &Context, llm: &str, prompts: &[String]) {
        tracing::info!(trace_id = trace(ctx), llm, "[llm/start] Entering LLM run with input: {prompts:?}");
    }

    fn handle_chat_model_start(&self, ctx: &Context, llm: &str, messages: &[Message]) {
        tracing::info!(trace_id = trace(ctx), llm, "[llm/start] Entering chat run with input: {messages:?}");
    }

    fn handle_llm_error(&self, ctx: &Context, err: &ChainError) {
        tracing::error!(trace_id = trace(ctx), "[llm/error] LLM run errored with error: {err}");
    }

    fn handle_llm_end(&self, ctx: &Context, output: &LlmResult) {
        tracing::info!(trace_id = trace(ctx), "[llm/end] Exiting LLM run with output: {output:?}");
    }

    fn handle_chain_start(&self, ctx: &Context, chain: &str, inputs: &Values) {
        tracing::info!(trace_id = trace(ctx), chain, "[chain/start] Entering Chain run with input: {inputs:?}");
    }

    fn handle_chain_error(&self, ctx: &Context, err: &ChainError) {
        tracing::error!(trace_id = trace(ctx), "[chain/error] Chain run errored with error: {err}");
    }

    fn handle_chain_end(&self, ctx: &Context, outputs: &Values) {
        tracing::info!(trace_id = trace(ctx), "[chain/end] Exiting Chain run with output: {outputs:?}");
    }

    fn handle_tool_start(&self, ctx: &Context, tool: &str, input: &str) {
        tracing::info!(trace_id = trace(ctx), tool, "[tool/start] Entering Tool run with input: {input}");
    }

    fn handle_tool_error(&self, ctx: &Context, err: &ChainError) {
        tracing::error!(trace_id = trace(ctx), "[tool/error] Tool run errored with error: {err}");
    }

    fn handle_tool_end(&self, ctx: &Context, output: &str) {
        tracing::info!(trace_id = trace(ctx), "[tool/end] Exiting Tool run with output: {output}");
    }

    fn handle_agent_action(&self, ctx: &Context, action: &AgentAction) {
        tracing::info!(
            trace_id = trace(ctx),
            tool = %action.tool,
            "[agent/action] Agent selected action with input: {}",
            action.tool_input
        );
    }

    fn handle_agent_end(&self, ctx: &Context, finish: &AgentFinish) {
        tracing::info!(trace_id = trace(ctx), "[agent/end] Agent finished with: {:?}", finish.return_values);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        id: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl CallbackHandler for Recorder {
        fn handle_tool_start(&self, _ctx: &Context, tool: &str, _input: &str) {
            self.log.lock().unwrap().push(format!("{}:{tool}", self.id));
        }
    }

    #[test]
    fn test_empty_manager_emits_everything_without_failing() {
        let manager = CallbackManager::default();
        let ctx = Context::new();
        let err = ChainError::Other("boom".into());
        let action = AgentAction::new("search", "query", "log");
        let finish = AgentFinish::new(Values::new(), "log");

        manager.handle_llm_start(&ctx, "llm", &["p".into()]);
        manager.handle_chat_model_start(&ctx, "llm", &[Message::human("hi")]);
        manager.handle_llm_new_token(&ctx, "tok");
        manager.handle_llm_error(&ctx, &err);
        manager.handle_llm_end(&ctx, &LlmResult::default());
        manager.handle_chain_start(&ctx, "chain", &Values::new());
        manager.handle_chain_error(&ctx, &err);
        manager.handle_chain_end(&ctx, &Values::new());
        manager.handle_tool_start(&ctx, "tool", "in");
        manager.handle_tool_error(&ctx, &err);
        manager.handle_tool_end(&ctx, "out");
        manager.handle_text(&ctx, "text");
        manager.handle_agent_action(&ctx, &action);
        manager.handle_agent_end(&ctx, &finish);

        assert!(manager.is_empty());
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers: CallbackList = vec![
            Arc::new(Recorder { id: "first", log: log.clone() }),
            Arc::new(LogHandler::new()),
            Arc::new(Recorder { id: "second", log: log.clone() }),
        ];
        let manager = CallbackManager::new(handlers);

        manager.handle_tool_start(&Context::traced(), "calculator", "2+2");

        assert_eq!(*log.lock().unwrap(), vec!["first:calculator", "second:calculator"]);
    }
}
