//! Provider adapters
//!
//! Each adapter translates the provider-agnostic [`Conversation`] into its
//! vendor wire format, issues the HTTP call, and normalizes the response back
//! into a [`ProviderReply`]. The orchestrator is written once against the
//! [`Provider`] trait; no vendor branching leaks past this module.

pub mod google;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    types::{CallOptions, Conversation, ProviderReply},
};

/// Which vendor protocol to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Google,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Google => "google",
        }
    }

    /// Environment variable holding this vendor's API key
    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "OPENAI_API_KEY",
            ProviderKind::Google => "GOOGLE_API_KEY",
        }
    }
}

/// A vendor adapter: one blocking HTTP call per invocation, normalized reply out.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Vendor name for logging and error attribution
    fn name(&self) -> &'static str;

    /// Issue one model call over the given conversation.
    ///
    /// Malformed responses must degrade to an explicit error, never a panic.
    async fn call(&self, conversation: &Conversation, opts: &CallOptions)
        -> Result<ProviderReply>;
}

/// Construct the adapter for the given vendor.
pub fn create_provider(
    kind: ProviderKind,
    api_key: impl Into<String>,
    model: impl Into<String>,
    base_url: Option<String>,
) -> Arc<dyn Provider> {
    match kind {
        ProviderKind::OpenAI => Arc::new(openai::OpenAIProvider::new(api_key, model, base_url)),
        ProviderKind::Google => Arc::new(google::GoogleProvider::new(api_key, model, base_url)),
    }
}
