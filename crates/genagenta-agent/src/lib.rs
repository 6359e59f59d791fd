//! genagenta-agent: Agent runtime with bounded tool execution
//!
//! This crate provides the request-scoped agent loop that drives multi-turn
//! LLM conversations: tool dispatch, anti-loop policy, context compaction,
//! and final-answer assembly.

pub mod agent;
pub mod context;
pub mod error;
pub mod outcome;
pub mod tool;

pub use agent::{Agent, AgentConfig, LoopState, ResumeContext};
pub use context::{ContextConfig, ContextManager};
pub use error::Error;
pub use outcome::{AgentOutcome, ContextMeta};
pub use tool::{Caller, FrontendAction, SharedTool, Tool, ToolRegistry, ToolResult};
