//! Conversational business assistant.
//!
//! A turn alternates two steps until the reasoning engine produces a final
//! answer:
//! 1. **Reasoning** (`reasoning`) - send the transcript and tool catalog to the engine
//! 2. **Tool execution** (`executor`) - run the requested business tools
//!
//! `runtime` drives that loop and bounds it; `history` keeps stored
//! transcripts well-formed and windowed between turns.
//!
//! # Failure boundary
//!
//! Tool failures and engine failures never escape a turn. They become tool
//! result payloads or an apology reply. Only invalid input and storage
//! failures surface as `AgentError`.

pub mod business_tools;
pub mod executor;
pub mod history;
pub mod llm;
pub mod message;
pub mod reasoning;
pub mod remote;
pub mod runtime;
pub mod store;
pub mod tools;

pub use message::{Message, ToolCall};
pub use runtime::{AgentError, AgentRuntime, RuntimeSettings, TurnReply};
