//! Agent Executor
//!
//! Drives an [`Agent`] through plan → act → observe until it finishes, runs
//! out of iterations or runs out of time. The executor is itself a [`Chain`],
//! so it is invoked through [`crate::chain::call`] like any other chain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{Agent, AgentAction, AgentFinish, AgentStep, Plan};
use crate::callbacks::{CallbackHandler, CallbackManager};
use crate::chain::{Chain, ChainCallOptions, Values};
use crate::context::Context;
use crate::error::{ChainError, Result};
use crate::memory::{EmptyMemory, Memory};
use crate::tool::{Tool, ToolRegistry};

pub const INTERMEDIATE_STEPS_KEY: &str = "intermediate_steps";

/// Executor budgets and output settings
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Planning rounds allowed before giving up
    pub max_iterations: usize,

    /// Wall-clock budget for one invocation, covering in-flight model and tool calls
    pub max_execution_time: Option<Duration>,

    /// Also return the steps taken under `intermediate_steps`
    pub return_intermediate_steps: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_execution_time: None,
            return_intermediate_steps: false,
        }
    }
}

pub struct Executor {
    agent: Arc<dyn Agent>,
    tools: ToolRegistry,
    memory: Box<dyn Memory>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(agent: Arc<dyn Agent>, tools: ToolRegistry, config: ExecutorConfig) -> Self {
        Self {
            agent,
            tools,
            memory: Box::new(EmptyMemory),
            config,
        }
    }

    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    pub fn with_memory(mut self, memory: impl Memory + 'static) -> Self {
        self.memory = Box::new(memory);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    async fn run_loop(
        &self,
        ctx: &Context,
        inputs: &Values,
        options: &ChainCallOptions,
        callbacks: &CallbackManager,
    ) -> Result<Values> {
        let started = Instant::now();
        let mut steps: Vec<AgentStep> = Vec::new();
        let mut iterations = 0;

        loop {
            if iterations >= self.config.max_iterations {
                return Err(ChainError::MaxIterations(self.config.max_iterations));
            }
            if let Some(limit) = self.config.max_execution_time {
                if started.elapsed() >= limit {
                    return Err(ChainError::ExecutionTimeout(limit));
                }
            }
            ctx.check()?;
            iterations += 1;

            tracing::debug!(iteration = iterations, steps = steps.len(), "planning");
            let plan = self.agent.plan(ctx, &steps, inputs, &options.callbacks).await?;

            let actions = match plan {
                Plan::Finish(finish) => {
                    callbacks.handle_agent_end(ctx, &finish);
                    return self.finish_outputs(finish, &steps);
                }
                Plan::Actions(actions) if actions.is_empty() => {
                    return Err(ChainError::InvalidPlan("agent returned no actions and no finish".into()));
                }
                Plan::Actions(actions) => actions,
            };

            for action in actions {
                let observation = self.take_action(ctx, &action, options, callbacks).await?;
                steps.push(AgentStep { action, observation });
            }
        }
    }

    /// Run one action. A tool failure becomes the observation; an unknown tool
    /// or a cancelled context ends the loop.
    async fn take_action(
        &self,
        ctx: &Context,
        action: &AgentAction,
        options: &ChainCallOptions,
        callbacks: &CallbackManager,
    ) -> Result<String> {
        callbacks.handle_agent_action(ctx, action);

        let tool = self
            .tools
            .get(&action.tool)
            .ok_or_else(|| ChainError::ToolNotFound(action.tool.clone()))?;

        tracing::debug!(tool = %action.tool, input = %action.tool_input, "executing tool");
        callbacks.handle_tool_start(ctx, tool.name(), &action.tool_input);

        match ctx.run(tool.call(ctx, &action.tool_input, &options.callbacks)).await {
            Ok(output) => {
                callbacks.handle_tool_end(ctx, &output);
                Ok(output)
            }
            Err(err) if err.is_cancellation() => {
                callbacks.handle_tool_error(ctx, &err);
                Err(err)
            }
            Err(err) => {
                tracing::warn!(tool = %action.tool, error = %err, "tool failed");
                callbacks.handle_tool_error(ctx, &err);
                Ok(err.to_string())
            }
        }
    }

    fn finish_outputs(&self, finish: AgentFinish, steps: &[AgentStep]) -> Result<Values> {
        let mut outputs = finish.return_values;
        if self.config.return_intermediate_steps {
            outputs.insert(INTERMEDIATE_STEPS_KEY.into(), serde_json::to_value(steps)?);
        }
        Ok(outputs)
    }
}

#[async_trait]
impl Chain for Executor {
    fn name(&self) -> &str {
        "agent_executor"
    }

    async fn call(&self, ctx: &Context, inputs: Values, options: &ChainCallOptions) -> Result<Values> {
        let callbacks = options.callback_manager();

        let loop_ctx = match self.config.max_execution_time {
            Some(limit) => ctx.with_timeout(limit),
            None => ctx.child(),
        };

        match self.run_loop(&loop_ctx, &inputs, options, &callbacks).await {
            // Our own deadline, not the caller's
            Err(ChainError::DeadlineExceeded) if !ctx.is_cancelled() => match self.config.max_execution_time {
                Some(limit) => Err(ChainError::ExecutionTimeout(limit)),
                None => Err(ChainError::DeadlineExceeded),
            },
            other => other,
        }
    }

    fn memory(&self) -> &dyn Memory {
        self.memory.as_ref()
    }

    fn input_keys(&self) -> Vec<String> {
        self.agent.input_keys()
    }

    fn output_keys(&self) -> Vec<String> {
        let mut keys = self.agent.output_keys();
        if self.config.return_intermediate_steps {
            keys.push(INTERMEDIATE_STEPS_KEY.into());
        }
        keys
    }
}

/// Builder for [`Executor`]
pub struct ExecutorBuilder {
    agent: Option<Arc<dyn Agent>>,
    tools: ToolRegistry,
    memory: Box<dyn Memory>,
    config: ExecutorConfig,
    registration_error: Option<ChainError>,
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self {
            agent: None,
            tools: ToolRegistry::new(),
            memory: Box::new(EmptyMemory),
            config: ExecutorConfig::default(),
            registration_error: None,
        }
    }

    pub fn agent(mut self, agent: impl Agent + 'static) -> Self {
        self.agent = Some(Arc::new(agent));
        self
    }

    pub fn shared_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Register a tool; a duplicate name is reported by [`Self::build`]
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        if let Err(err) = self.tools.register(tool) {
            self.registration_error.get_or_insert(err);
        }
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn memory(mut self, memory: impl Memory + 'static) -> Self {
        self.memory = Box::new(memory);
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn max_execution_time(mut self, limit: Duration) -> Self {
        self.config.max_execution_time = Some(limit);
        self
    }

    pub fn return_intermediate_steps(mut self, enabled: bool) -> Self {
        self.config.return_intermediate_steps = enabled;
        self
    }

    pub fn build(self) -> Result<Executor> {
        if let Some(err) = self.registration_error {
            return Err(err);
        }
        let agent = self
            .agent
            .ok_or_else(|| ChainError::Config("Agent is required".into()))?;

        Ok(Executor {
            agent,
            tools: self.tools,
            memory: self.memory,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::agents::{ZeroShotAgent, ZeroShotOptions};
    use crate::callbacks::{CallbackHandler, CallbackList};
    use crate::chain;
    use crate::llm_chain::tests::ScriptedLlm;
    use crate::memory::BufferMemory;
    use crate::tool::CalculatorTool;

    /// Replays plans; repeats the last one once the script runs out
    struct ScriptedAgent {
        plans: Mutex<VecDeque<Plan>>,
        seen_steps: Mutex<Vec<usize>>,
    }

    impl ScriptedAgent {
        fn new(plans: Vec<Plan>) -> Self {
            Self {
                plans: Mutex::new(plans.into()),
                seen_steps: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        async fn plan(
            &self,
            _ctx: &Context,
            intermediate_steps: &[AgentStep],
            _inputs: &Values,
            _callbacks: &CallbackList,
        ) -> Result<Plan> {
            self.seen_steps.lock().unwrap().push(intermediate_steps.len());
            let mut plans = self.plans.lock().unwrap();
            if plans.len() > 1 {
                Ok(plans.pop_front().unwrap())
            } else {
                Ok(plans.front().cloned().unwrap())
            }
        }

        fn input_keys(&self) -> Vec<String> {
            vec!["input".into()]
        }

        fn output_keys(&self) -> Vec<String> {
            vec!["output".into()]
        }
    }

    /// Echoes its input and counts calls
    #[derive(Default)]
    struct EchoTool {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Repeat the input"
        }
        async fn call(&self, _ctx: &Context, input: &str, _callbacks: &CallbackList) -> Result<String> {
            self.calls.lock().unwrap().push(input.to_string());
            Ok(format!("echo: {input}"))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        async fn call(&self, _ctx: &Context, _input: &str, _callbacks: &CallbackList) -> Result<String> {
            Err(ChainError::ToolExecution("backend unavailable".into()))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Takes a minute"
        }
        async fn call(&self, _ctx: &Context, _input: &str, _callbacks: &CallbackList) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("done".into())
        }
    }

    fn act(tool: &str, input: &str) -> Plan {
        Plan::action(AgentAction::new(tool, input, format!("Action: {tool}\nAction Input: {input}")))
    }

    fn finish(answer: &str) -> Plan {
        Plan::Finish(AgentFinish::new(
            Values::from([("output".to_string(), json!(answer))]),
            format!("Final Answer: {answer}"),
        ))
    }

    fn executor(agent: Arc<ScriptedAgent>, tools: ToolRegistry) -> Executor {
        Executor::new(agent, tools, ExecutorConfig::default())
    }

    #[tokio::test]
    async fn test_two_actions_then_finish() {
        let echo = Arc::new(EchoTool::default());
        let mut tools = ToolRegistry::new();
        tools.register_arc(echo.clone()).unwrap();

        let agent = Arc::new(ScriptedAgent::new(vec![act("echo", "a"), act("echo", "b"), finish("ab")]));
        let exec = executor(agent.clone(), tools);

        let answer = chain::run(&Context::new(), &exec, "go", &ChainCallOptions::default())
            .await
            .unwrap();

        assert_eq!(answer, "ab");
        assert_eq!(*echo.calls.lock().unwrap(), ["a", "b"]);
        assert_eq!(*agent.seen_steps.lock().unwrap(), [0, 1, 2]);
    }

    #[tokio::test]
    async fn test_zero_shot_reconstructs_scratchpad() {
        let llm = Arc::new(ScriptedLlm::new(&[
            "I should add first.\nAction: calculator\nAction Input: 2 + 2",
            "Now multiply.\nAction: calculator\nAction Input: 4 * 3",
            "I now know the final answer\nFinal Answer: 12",
        ]));
        let tools = ToolRegistry::new().with(CalculatorTool).unwrap();
        let agent = ZeroShotAgent::new(llm.clone(), &tools, ZeroShotOptions::default());
        let exec = Executor::builder().agent(agent).tools(tools).build().unwrap();

        let answer = chain::run(&Context::new(), &exec, "what is (2+2)*3?", &ChainCallOptions::default())
            .await
            .unwrap();
        assert_eq!(answer, "12");

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(!prompts[0].contains("Observation:"));
        assert!(prompts[1].ends_with("Action Input: 2 + 2\nObservation: 4\nThought:"));
        assert!(prompts[2].ends_with(
            "Action Input: 2 + 2\nObservation: 4Now multiply.\nAction: calculator\nAction Input: 4 * 3\nObservation: 12\nThought:"
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fatal() {
        let agent = Arc::new(ScriptedAgent::new(vec![act("search", "rust"), finish("never")]));
        let exec = executor(agent, ToolRegistry::new());

        let err = chain::run(&Context::new(), &exec, "go", &ChainCallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::ToolNotFound(ref name) if name == "search"));
    }

    #[tokio::test]
    async fn test_tool_failure_becomes_observation() {
        let tools = ToolRegistry::new().with(FailingTool).unwrap();
        let agent = Arc::new(ScriptedAgent::new(vec![act("broken", "x"), finish("recovered")]));
        let exec = Executor::new(
            agent,
            tools,
            ExecutorConfig {
                return_intermediate_steps: true,
                ..ExecutorConfig::default()
            },
        );

        let inputs = Values::from([("input".to_string(), json!("go"))]);
        let out = chain::call(&Context::new(), &exec, inputs, &ChainCallOptions::default())
            .await
            .unwrap();

        assert_eq!(out["output"], json!("recovered"));
        let steps: Vec<AgentStep> = serde_json::from_value(out[INTERMEDIATE_STEPS_KEY].clone()).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].observation, "tool execution error: backend unavailable");
    }

    #[tokio::test]
    async fn test_empty_action_list_rejected() {
        let agent = Arc::new(ScriptedAgent::new(vec![Plan::Actions(vec![])]));
        let exec = executor(agent, ToolRegistry::new());

        let err = chain::run(&Context::new(), &exec, "go", &ChainCallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidPlan(_)));
    }

    #[tokio::test]
    async fn test_max_iterations() {
        let echo = Arc::new(EchoTool::default());
        let mut tools = ToolRegistry::new();
        tools.register_arc(echo.clone()).unwrap();

        let agent = Arc::new(ScriptedAgent::new(vec![act("echo", "again")]));
        let exec = Executor::new(
            agent,
            tools,
            ExecutorConfig {
                max_iterations: 3,
                ..ExecutorConfig::default()
            },
        );

        let err = chain::run(&Context::new(), &exec, "go", &ChainCallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::MaxIterations(3)));
        assert_eq!(echo.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_time_budget_interrupts_tool() {
        let tools = ToolRegistry::new().with(SlowTool).unwrap();
        let agent = ScriptedAgent::new(vec![act("slow", ""), finish("late")]);
        let exec = Executor::builder()
            .agent(agent)
            .tools(tools)
            .max_execution_time(Duration::from_secs(1))
            .build()
            .unwrap();

        let err = chain::run(&Context::new(), &exec, "go", &ChainCallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::ExecutionTimeout(d) if d == Duration::from_secs(1)));
        assert!(!err.is_cancellation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_deadline_is_not_a_budget_error() {
        let tools = ToolRegistry::new().with(SlowTool).unwrap();
        let agent = Arc::new(ScriptedAgent::new(vec![act("slow", ""), finish("late")]));
        let exec = Executor::new(
            agent,
            tools,
            ExecutorConfig {
                max_execution_time: Some(Duration::from_secs(30)),
                ..ExecutorConfig::default()
            },
        );

        let ctx = Context::new().with_timeout(Duration::from_secs(1));
        let err = chain::run(&ctx, &exec, "go", &ChainCallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancelled_caller() {
        let agent = Arc::new(ScriptedAgent::new(vec![finish("unused")]));
        let exec = executor(agent.clone(), ToolRegistry::new());

        let ctx = Context::new();
        ctx.cancel();
        let err = chain::run(&ctx, &exec, "go", &ChainCallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Cancelled));
        assert!(agent.seen_steps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_in_order() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);
        impl CallbackHandler for Recorder {
            fn handle_agent_action(&self, _ctx: &Context, action: &AgentAction) {
                self.0.lock().unwrap().push(format!("action:{}", action.tool));
            }
            fn handle_tool_start(&self, _ctx: &Context, tool: &str, _input: &str) {
                self.0.lock().unwrap().push(format!("tool_start:{tool}"));
            }
            fn handle_tool_end(&self, _ctx: &Context, _output: &str) {
                self.0.lock().unwrap().push("tool_end".into());
            }
            fn handle_agent_end(&self, _ctx: &Context, _finish: &AgentFinish) {
                self.0.lock().unwrap().push("agent_end".into());
            }
        }

        let recorder = Arc::new(Recorder::default());
        let handler: Arc<dyn CallbackHandler> = recorder.clone();
        let tools = ToolRegistry::new().with(EchoTool::default()).unwrap();
        let agent = Arc::new(ScriptedAgent::new(vec![act("echo", "hi"), finish("done")]));
        let exec = executor(agent, tools);

        chain::run(
            &Context::new(),
            &exec,
            "go",
            &ChainCallOptions::new().with_callbacks(vec![handler]),
        )
        .await
        .unwrap();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            ["action:echo", "tool_start:echo", "tool_end", "agent_end"]
        );
    }

    #[tokio::test]
    async fn test_memory_records_turns() {
        let agent = ScriptedAgent::new(vec![finish("hello there")]);
        let exec = Executor::builder()
            .agent(agent)
            .memory(BufferMemory::new())
            .build()
            .unwrap();

        chain::run(&Context::new(), &exec, "hi", &ChainCallOptions::default())
            .await
            .unwrap();

        let vars = exec.memory().load_memory_variables(&Values::new()).await.unwrap();
        assert_eq!(vars["history"], json!("Human: hi\nAI: hello there"));
    }

    #[test]
    fn test_builder_reports_duplicate_tool() {
        let err = Executor::builder()
            .agent(ScriptedAgent::new(vec![finish("x")]))
            .tool(CalculatorTool)
            .tool(CalculatorTool)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ChainError::DuplicateTool(_)));

        let err = Executor::builder().build().err().unwrap();
        assert!(matches!(err, ChainError::Config(_)));
    }
}
