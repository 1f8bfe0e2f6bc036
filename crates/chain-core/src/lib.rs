//! # chain-core
//!
//! Chains, agents and tools behind provider-agnostic model traits.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      chain::call / run                        │
//! │   validate inputs ─ load memory ─ Chain::call ─ save memory   │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//!        ┌───────────────────────┴───────────────────────┐
//!        ▼                                               ▼
//! ┌─────────────┐   plan    ┌──────────────┐   act   ┌──────────┐
//! │  Executor   │──────────▶│ ZeroShotAgent│         │  Tools   │
//! │   (loop)    │◀──────────│  + Parser    │         │ Registry │
//! └─────────────┘   Plan    └──────┬───────┘         └──────────┘
//!        │                         │ LlmChain
//!        │ events                  ▼
//!        ▼                  ┌──────────────┐
//! ┌─────────────┐           │ LlmProvider  │
//! │  Callback   │           │  (Strategy)  │
//! │  Manager    │           └──────────────┘
//! └─────────────┘
//! ```
//!
//! The `LlmProvider`, `ChatProvider` and `EmbeddingProvider` traits keep the
//! chains independent of any particular model API.

pub mod agents;
pub mod callbacks;
pub mod chain;
pub mod context;
pub mod error;
pub mod llm_chain;
pub mod memory;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod tool;

pub use agents::{
    Agent, AgentAction, AgentFinish, AgentStep, Executor, ExecutorBuilder, ExecutorConfig, JsonBlockParser,
    MrklOutputParser, OutputParser, Plan, ZeroShotAgent, ZeroShotOptions,
};
pub use callbacks::{CallbackHandler, CallbackList, CallbackManager, LogHandler};
pub use chain::{Chain, ChainCallOptions, Values};
pub use context::Context;
pub use error::{ChainError, Result};
pub use llm_chain::LlmChain;
pub use memory::{BufferMemory, EmptyMemory, Memory};
pub use message::{Conversation, Message, Role};
pub use prompt::PromptTemplate;
pub use provider::{
    collect_stream, CallOptions, ChatGeneration, ChatProvider, CompletionStream, EmbeddingProvider, FinishReason,
    Generation, LlmProvider, LlmResult, StreamChunk, TokenHandler, TokenUsage,
};
pub use tool::{CalculatorTool, DateTimeTool, Tool, ToolRegistry};
