//! genagenta-ai: Unified LLM provider abstraction layer
//!
//! This crate provides a common interface for chat-with-tools interactions
//! against the OpenAI-style chat-completions protocol and the Google-style
//! generateContent protocol.

pub mod error;
pub mod providers;
pub mod types;

pub use error::{Error, Result};
pub use providers::{create_provider, Provider, ProviderKind};
pub use types::*;
