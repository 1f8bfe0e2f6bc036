//! mrkl
//!
//! Ask a zero-shot agent a question from the command line. The agent can use
//! a calculator and a clock; the model is reached through the OpenAI API (or a
//! compatible server named by `OPENAI_BASE_URL`).

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chain_core::{
    chain, CalculatorTool, CallOptions, CallbackHandler, CallbackList, ChainCallOptions, Context, DateTimeTool,
    Executor, LlmChain, LogHandler, ToolRegistry, ZeroShotAgent, ZeroShotOptions,
};
use chain_runtime::OpenAiProvider;

/// Answer a question with a zero-shot, tool-using agent
#[derive(Parser, Debug)]
#[command(name = "mrkl", version, about = "Answer a question with a zero-shot, tool-using agent")]
struct Cli {
    /// The question to answer
    #[arg(required = true)]
    question: Vec<String>,

    /// Completion model (defaults to OPENAI_MODEL, then gpt-3.5-turbo-instruct)
    #[arg(short, long)]
    model: Option<String>,

    /// Planning rounds before giving up
    #[arg(long, default_value_t = 10)]
    max_iterations: usize,

    /// Wall-clock budget in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Print model output as it is generated
    #[arg(long)]
    stream: bool,

    /// Log every chain, model, tool and agent event
    #[arg(short, long)]
    verbose: bool,
}

/// Echoes streamed tokens to stdout
struct TokenPrinter;

impl CallbackHandler for TokenPrinter {
    fn handle_llm_new_token(&self, _ctx: &Context, token: &str) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{token}");
        let _ = stdout.flush();
    }

    fn handle_llm_end(&self, _ctx: &Context, _output: &chain_core::LlmResult) {
        println!();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Initialize LLM provider
    let llm = Arc::new(OpenAiProvider::from_env()?);
    tracing::info!(
        base_url = %llm.config().base_url,
        model = cli.model.as_deref().unwrap_or(&llm.config().completion_model),
        "Using OpenAI-compatible provider"
    );

    // Initialize tools
    let tools = ToolRegistry::new().with(CalculatorTool)?.with(DateTimeTool)?;
    tracing::info!("Registered {} tools: {:?}", tools.len(), tools.names());

    // Agent over a streaming-capable completion chain
    let options = ZeroShotOptions::default();
    let mut call_options = CallOptions::new().with_temperature(0.0);
    if let Some(model) = &cli.model {
        call_options = call_options.with_model(model.clone());
    }
    let llm_chain = LlmChain::new(llm, options.create_prompt(&tools))
        .with_call_options(call_options)
        .with_streaming(cli.stream);
    let agent = ZeroShotAgent::from_chain(Arc::new(llm_chain), options.output_key);

    let mut builder = Executor::builder()
        .agent(agent)
        .tools(tools)
        .max_iterations(cli.max_iterations);
    if let Some(secs) = cli.timeout {
        builder = builder.max_execution_time(Duration::from_secs(secs));
    }
    let executor = builder.build()?;

    // Observers
    let mut callbacks = CallbackList::new();
    if cli.verbose {
        callbacks.push(Arc::new(LogHandler::new()));
    }
    if cli.stream {
        callbacks.push(Arc::new(TokenPrinter));
    }

    // Ctrl-C cancels the run
    let ctx = Context::traced();
    let cancel = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let question = cli.question.join(" ");
    let call_options = ChainCallOptions::new().with_callbacks(callbacks);

    match chain::run(&ctx, &executor, question, &call_options).await {
        Ok(answer) => {
            println!("{answer}");
            Ok(())
        }
        Err(err) if err.is_cancellation() => {
            eprintln!("{}", err.user_message());
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err.user_message());
            Err(err.into())
        }
    }
}
