//! Zero-Shot Agent
//!
//! Single-turn planning over a text model: each round renders the previous
//! steps into a scratchpad, asks the wrapped chain for the next move and parses
//! the reply.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::parser::{MrklOutputParser, OutputParser};
use super::{Agent, AgentStep, Plan};
use crate::callbacks::CallbackList;
use crate::chain::{self, Chain, ChainCallOptions, Values};
use crate::context::Context;
use crate::error::{ChainError, Result};
use crate::llm_chain::{LlmChain, DEFAULT_OUTPUT_KEY};
use crate::prompt::PromptTemplate;
use crate::provider::LlmProvider;
use crate::tool::ToolRegistry;

pub const SCRATCHPAD_KEY: &str = "agent_scratchpad";
pub const TODAY_KEY: &str = "today";
pub const DEFAULT_AGENT_OUTPUT_KEY: &str = "output";

/// Stop sequences that mark the start of an observation block
pub const OBSERVATION_STOP_WORDS: [&str; 2] = ["\nObservation:", "\n\tObservation:"];

const DEFAULT_PREFIX: &str = "Today is {today}.\n\
Answer the following questions as best you can. You have access to the following tools:\n\n\
{tool_descriptions}";

const DEFAULT_FORMAT_INSTRUCTIONS: &str = "Use the following format:\n\n\
Question: the input question you must answer\n\
Thought: you should always think about what to do\n\
Action: the action to take, should be one of [ {tool_names} ]\n\
Action Input: the input to the action\n\
Observation: the result of the action\n\
... (this Thought/Action/Action Input/Observation can repeat N times)\n\
Thought: I now know the final answer\n\
Final Answer: the final answer to the original input question";

const DEFAULT_SUFFIX: &str = "Begin!\n\n\
Question: {input}\n\
{agent_scratchpad}";

/// Prompt and output settings for [`ZeroShotAgent::new`]
#[derive(Clone, Debug)]
pub struct ZeroShotOptions {
    /// Key the final answer is returned under
    pub output_key: String,

    /// Text before the format instructions; `{tool_descriptions}` is filled in
    pub prefix: String,

    /// `{tool_names}` is filled in
    pub format_instructions: String,

    /// Text after the format instructions; must reference `{agent_scratchpad}`
    pub suffix: String,
}

impl Default for ZeroShotOptions {
    fn default() -> Self {
        Self {
            output_key: DEFAULT_AGENT_OUTPUT_KEY.into(),
            prefix: DEFAULT_PREFIX.into(),
            format_instructions: DEFAULT_FORMAT_INSTRUCTIONS.into(),
            suffix: DEFAULT_SUFFIX.into(),
        }
    }
}

impl ZeroShotOptions {
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Build the prompt for a tool set. Tool descriptions and names are bound
    /// as partial values, so braces inside them are never read as placeholders.
    pub fn create_prompt(&self, tools: &ToolRegistry) -> PromptTemplate {
        let template = [self.prefix.as_str(), self.format_instructions.as_str(), self.suffix.as_str()].join("\n\n");

        PromptTemplate::from_template(template)
            .with_partial("tool_descriptions", tools.descriptions())
            .with_partial("tool_names", tools.names().join(", "))
    }
}

pub struct ZeroShotAgent {
    chain: Arc<dyn Chain>,
    output_key: String,
    parser: Box<dyn OutputParser>,
}

impl ZeroShotAgent {
    /// Agent over an [`LlmChain`] prompted with the tools' descriptions
    pub fn new(llm: Arc<dyn LlmProvider>, tools: &ToolRegistry, options: ZeroShotOptions) -> Self {
        let prompt = options.create_prompt(tools);
        let chain = LlmChain::new(llm, prompt);
        Self::from_chain(Arc::new(chain), options.output_key)
    }

    /// Agent over any chain that accepts `agent_scratchpad` and returns `text`
    pub fn from_chain(chain: Arc<dyn Chain>, output_key: impl Into<String>) -> Self {
        let output_key = output_key.into();
        Self {
            chain,
            parser: Box::new(MrklOutputParser::new(output_key.clone())),
            output_key,
        }
    }

    /// Substitute another reply grammar
    pub fn with_parser(mut self, parser: impl OutputParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    pub fn chain(&self) -> &Arc<dyn Chain> {
        &self.chain
    }
}

/// Prior steps rendered as the model's own transcript
pub fn construct_scratchpad(steps: &[AgentStep]) -> String {
    if steps.is_empty() {
        return String::new();
    }

    let mut scratchpad = String::new();
    for step in steps {
        scratchpad.push_str(&step.action.log);
        scratchpad.push_str("\nObservation: ");
        scratchpad.push_str(&step.observation);
    }
    scratchpad.push_str("\nThought:");
    scratchpad
}

fn today() -> String {
    chrono::Local::now().format("%B %d, %Y").to_string()
}

#[async_trait]
impl Agent for ZeroShotAgent {
    async fn plan(
        &self,
        ctx: &Context,
        intermediate_steps: &[AgentStep],
        inputs: &Values,
        callbacks: &CallbackList,
    ) -> Result<Plan> {
        let mut full_inputs = inputs.clone();
        full_inputs.insert(SCRATCHPAD_KEY.into(), Value::String(construct_scratchpad(intermediate_steps)));
        full_inputs.insert(TODAY_KEY.into(), Value::String(today()));

        let options = ChainCallOptions::new()
            .with_stop_words(OBSERVATION_STOP_WORDS.iter().map(|s| (*s).to_string()).collect())
            .with_callbacks(callbacks.clone());

        let mut response = chain::call(ctx, self.chain.as_ref(), full_inputs, &options).await?;

        let output = match response.remove(DEFAULT_OUTPUT_KEY) {
            Some(Value::String(text)) => text,
            _ => return Err(ChainError::InvalidChainReturnType(DEFAULT_OUTPUT_KEY.into())),
        };

        tracing::debug!(steps = intermediate_steps.len(), "zero-shot agent reply: {output}");
        self.parser.parse(&output)
    }

    fn input_keys(&self) -> Vec<String> {
        self.chain
            .input_keys()
            .into_iter()
            .filter(|k| k != SCRATCHPAD_KEY && k != TODAY_KEY)
            .collect()
    }

    fn output_keys(&self) -> Vec<String> {
        vec![self.output_key.clone()]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::agents::{AgentAction, JsonBlockParser};
    use crate::llm_chain::tests::ScriptedLlm;
    use crate::tool::{CalculatorTool, DateTimeTool};

    fn tools() -> ToolRegistry {
        ToolRegistry::new()
            .with(CalculatorTool)
            .and_then(|r| r.with(DateTimeTool))
            .unwrap()
    }

    fn step(tool: &str, input: &str, log: &str, observation: &str) -> AgentStep {
        AgentStep {
            action: AgentAction::new(tool, input, log),
            observation: observation.into(),
        }
    }

    #[test]
    fn test_empty_scratchpad() {
        assert_eq!(construct_scratchpad(&[]), "");
    }

    #[test]
    fn test_scratchpad_concatenates_steps() {
        let steps = [
            step("calculator", "2+2", "Action: calculator\nAction Input: 2+2", "4"),
            step("calculator", "4*3", "Thought: again\nAction: calculator\nAction Input: 4*3", "12"),
        ];
        assert_eq!(
            construct_scratchpad(&steps),
            "Action: calculator\nAction Input: 2+2\nObservation: 4\
             Thought: again\nAction: calculator\nAction Input: 4*3\nObservation: 12\nThought:"
        );
    }

    #[test]
    fn test_prompt_lists_tools_and_variables() {
        let prompt = ZeroShotOptions::default().create_prompt(&tools());
        assert_eq!(prompt.input_variables(), ["today", "input", "agent_scratchpad"]);

        let values = Values::from([
            ("today".to_string(), json!("May 01, 2024")),
            ("input".to_string(), json!("2+2?")),
            ("agent_scratchpad".to_string(), json!("")),
        ]);
        let rendered = prompt.format(&values).unwrap();
        assert!(rendered.contains("calculator: Evaluate"));
        assert!(rendered.contains("[ calculator, datetime ]"));
    }

    #[test]
    fn test_tool_description_braces_left_alone() {
        struct TemplateTool;

        #[async_trait]
        impl crate::tool::Tool for TemplateTool {
            fn name(&self) -> &str {
                "template"
            }
            fn description(&self) -> &str {
                "Fills {input} into {agent_scratchpad}"
            }
            async fn call(&self, _ctx: &Context, input: &str, _callbacks: &CallbackList) -> Result<String> {
                Ok(input.to_string())
            }
        }

        let tools = ToolRegistry::new().with(TemplateTool).unwrap();
        let prompt = ZeroShotOptions::default().create_prompt(&tools);
        let values = Values::from([
            ("today".to_string(), json!("May 01, 2024")),
            ("input".to_string(), json!("QUESTION")),
            ("agent_scratchpad".to_string(), json!("SCRATCH")),
        ]);
        let rendered = prompt.format(&values).unwrap();

        assert!(rendered.contains("template: Fills {input} into {agent_scratchpad}"));
        assert_eq!(rendered.matches("QUESTION").count(), 1);
        assert_eq!(rendered.matches("SCRATCH").count(), 1);
    }

    #[test]
    fn test_input_keys_hide_injected_variables() {
        let llm = Arc::new(ScriptedLlm::new(&[]));
        let agent = ZeroShotAgent::new(llm, &tools(), ZeroShotOptions::default());
        assert_eq!(agent.input_keys(), ["input"]);
        assert_eq!(agent.output_keys(), ["output"]);
    }

    #[tokio::test]
    async fn test_plan_injects_scratchpad_and_stop_words() {
        let llm = Arc::new(ScriptedLlm::new(&["Thought: done\nFinal Answer: 4"]));
        let agent = ZeroShotAgent::new(llm.clone(), &tools(), ZeroShotOptions::default());
        let steps = [step("calculator", "2+2", "Action: calculator\nAction Input: 2+2", "4")];
        let inputs = Values::from([("input".to_string(), json!("what is 2+2?"))]);

        let plan = agent.plan(&Context::new(), &steps, &inputs, &CallbackList::new()).await.unwrap();

        let Plan::Finish(finish) = plan else { panic!("expected finish") };
        assert_eq!(finish.return_values["output"], json!("4"));

        let prompt = llm.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Question: what is 2+2?"));
        assert!(prompt.ends_with("Action Input: 2+2\nObservation: 4\nThought:"));
        assert!(!prompt.contains("{today}"));
        assert_eq!(llm.stop_words.lock().unwrap()[0], OBSERVATION_STOP_WORDS);
    }

    #[tokio::test]
    async fn test_custom_parser() {
        let llm = Arc::new(ScriptedLlm::new(&["```tool\n{\"action\": \"datetime\", \"action_input\": \"iso\"}\n```"]));
        let agent = ZeroShotAgent::new(llm, &tools(), ZeroShotOptions::default())
            .with_parser(JsonBlockParser::new("output"));
        let inputs = Values::from([("input".to_string(), json!("time?"))]);

        let plan = agent.plan(&Context::new(), &[], &inputs, &CallbackList::new()).await.unwrap();
        let Plan::Actions(actions) = plan else { panic!("expected action") };
        assert_eq!(actions[0].tool, "datetime");
    }

    #[tokio::test]
    async fn test_non_text_chain_output_rejected() {
        struct NumberChain(crate::memory::EmptyMemory);

        #[async_trait]
        impl Chain for NumberChain {
            fn name(&self) -> &str {
                "number"
            }
            async fn call(&self, _ctx: &Context, _inputs: Values, _options: &ChainCallOptions) -> Result<Values> {
                Ok(Values::from([("text".to_string(), json!(7))]))
            }
            fn memory(&self) -> &dyn crate::memory::Memory {
                &self.0
            }
            fn input_keys(&self) -> Vec<String> {
                vec![SCRATCHPAD_KEY.into()]
            }
            fn output_keys(&self) -> Vec<String> {
                vec!["text".into()]
            }
        }

        let agent = ZeroShotAgent::from_chain(Arc::new(NumberChain(crate::memory::EmptyMemory)), "output");
        assert!(agent.input_keys().is_empty());

        let err = agent
            .plan(&Context::new(), &[], &Values::new(), &CallbackList::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidChainReturnType(_)));
    }
}
