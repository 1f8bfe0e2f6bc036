//! Output Parsers
//!
//! Turn free-form model text into a [`Plan`]. The executor never looks at
//! model text itself, so a planning strategy can swap its parser without
//! touching the loop.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{AgentAction, AgentFinish, Plan};
use crate::chain::Values;
use crate::error::{ChainError, Result};

pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Action:\s*(.+)\s*Action Input:\s*(.+)").expect("valid action regex")
});

pub trait OutputParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<Plan>;
}

/// The `Action:` / `Action Input:` / `Final Answer:` grammar
#[derive(Clone, Debug)]
pub struct MrklOutputParser {
    output_key: String,
}

impl MrklOutputParser {
    pub fn new(output_key: impl Into<String>) -> Self {
        Self {
            output_key: output_key.into(),
        }
    }
}

impl OutputParser for MrklOutputParser {
    fn parse(&self, text: &str) -> Result<Plan> {
        // Last marker wins; earlier ones may appear in the reasoning
        if let Some(idx) = text.rfind(FINAL_ANSWER_MARKER) {
            let answer = text[idx + FINAL_ANSWER_MARKER.len()..].trim();
            let return_values = Values::from([(self.output_key.clone(), Value::String(answer.to_string()))]);
            return Ok(Plan::Finish(AgentFinish::new(return_values, text)));
        }

        let captures = ACTION_RE
            .captures(text)
            .ok_or_else(|| ChainError::UnparsableOutput(text.to_string()))?;

        Ok(Plan::action(AgentAction::new(
            captures[1].trim(),
            captures[2].trim(),
            text,
        )))
    }
}

/// A fenced ```` ```tool ```` block holding `{"action": ..., "action_input": ...}`.
/// Any reply without such a block is the final answer.
#[derive(Clone, Debug)]
pub struct JsonBlockParser {
    output_key: String,
}

#[derive(Deserialize)]
struct JsonAction {
    action: String,
    #[serde(default)]
    action_input: Value,
}

impl JsonBlockParser {
    pub fn new(output_key: impl Into<String>) -> Self {
        Self {
            output_key: output_key.into(),
        }
    }

    fn find_block(content: &str) -> Option<&str> {
        let tool_start = "```tool";
        let tool_end = "```";

        let start_idx = content.find(tool_start)?;
        let after_marker = &content[start_idx + tool_start.len()..];
        let end_idx = after_marker.find(tool_end)?;
        Some(after_marker[..end_idx].trim())
    }
}

impl OutputParser for JsonBlockParser {
    fn parse(&self, text: &str) -> Result<Plan> {
        let Some(block) = Self::find_block(text) else {
            let return_values = Values::from([(self.output_key.clone(), Value::String(text.trim().to_string()))]);
            return Ok(Plan::Finish(AgentFinish::new(return_values, text)));
        };

        let call: JsonAction =
            serde_json::from_str(block).map_err(|_| ChainError::UnparsableOutput(text.to_string()))?;

        let input = match call.action_input {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };

        Ok(Plan::action(AgentAction::new(call.action.trim(), input, text)))
    }
}
