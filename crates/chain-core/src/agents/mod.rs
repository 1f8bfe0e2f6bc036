//! Agents
//!
//! An agent decides, from the caller's inputs and the steps taken so far,
//! either which tool actions to run next or that it is finished. The
//! [`Executor`] drives that decision in a plan → act → observe loop.

pub mod executor;
pub mod parser;
pub mod zero_shot;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::callbacks::CallbackList;
use crate::chain::Values;
use crate::context::Context;
use crate::error::Result;

pub use executor::{Executor, ExecutorBuilder, ExecutorConfig};
pub use parser::{JsonBlockParser, MrklOutputParser, OutputParser};
pub use zero_shot::{ZeroShotAgent, ZeroShotOptions};

/// A tool invocation chosen by the agent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAction {
    /// Tool name, matched exactly against the registry
    pub tool: String,

    /// Free-text input for the tool
    pub tool_input: String,

    /// Raw model text this action was parsed from
    pub log: String,
}

impl AgentAction {
    pub fn new(tool: impl Into<String>, tool_input: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            tool_input: tool_input.into(),
            log: log.into(),
        }
    }
}

/// The agent's final result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentFinish {
    pub return_values: Values,

    /// Raw model text the result was parsed from
    pub log: String,
}

impl AgentFinish {
    pub fn new(return_values: Values, log: impl Into<String>) -> Self {
        Self {
            return_values,
            log: log.into(),
        }
    }
}

/// One completed plan-act-observe cycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStep {
    pub action: AgentAction,
    pub observation: String,
}

/// Outcome of one planning round: actions to run, or the final answer
#[derive(Clone, Debug, PartialEq)]
pub enum Plan {
    Actions(Vec<AgentAction>),
    Finish(AgentFinish),
}

impl Plan {
    /// Plan consisting of a single action
    pub fn action(action: AgentAction) -> Self {
        Plan::Actions(vec![action])
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    /// Given the inputs and the steps taken so far, decide what to do next
    async fn plan(
        &self,
        ctx: &Context,
        intermediate_steps: &[AgentStep],
        inputs: &Values,
        callbacks: &CallbackList,
    ) -> Result<Plan>;

    /// Keys callers must supply
    fn input_keys(&self) -> Vec<String>;

    /// Keys present in the finish's return values
    fn output_keys(&self) -> Vec<String>;
}
