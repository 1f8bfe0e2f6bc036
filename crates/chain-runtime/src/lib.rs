//! # chain-runtime
//!
//! Model providers for the chain-core system.
//!
//! ## Providers
//!
//! - **OpenAI** (default): completion, chat and embeddings against the OpenAI
//!   API or any server speaking the same protocol (`OPENAI_BASE_URL`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chain_runtime::openai::OpenAiProvider;
//!
//! let llm = Arc::new(OpenAiProvider::from_env()?);
//! let agent = ZeroShotAgent::new(llm, &tools, ZeroShotOptions::default());
//! let executor = Executor::builder().agent(agent).tools(tools).build()?;
//! ```

#[cfg(feature = "openai")]
pub mod http;
#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{OpenAiConfig, OpenAiProvider};

// Re-export core types for convenience
pub use chain_core::{
    CallOptions, Chain, ChainError, ChatProvider, Context, EmbeddingProvider, Executor, LlmProvider, Message,
    Result, Role, Tool, ToolRegistry, ZeroShotAgent,
};
