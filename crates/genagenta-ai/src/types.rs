//! Core types for LLM chat interactions

use serde::{Deserialize, Serialize};

/// A tool call requested by the model.
///
/// `id` is vendor-assigned for the OpenAI-style protocol. The Google-style
/// protocol has no call ids, so the adapter synthesizes one at parse time and
/// drops it again when serializing back to the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Make a synthetic call id for protocols that don't assign one.
    pub fn synthetic_id() -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }
}

/// A single turn in the conversation.
///
/// The sequence is append-only; the only permitted rewrite is compaction,
/// which replaces a prefix with a single summarizing message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    /// User message
    User { content: String },
    /// Assistant reply; may carry text, tool calls, or both
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    /// Result of a tool execution, paired to a tool call by id
    Tool {
        tool_call_id: String,
        tool_name: String,
        content: String,
    },
}

impl ChatMessage {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: text.into(),
        }
    }

    /// Create a text-only assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(text.into()),
            tool_calls: vec![],
        }
    }

    /// Create an assistant message carrying tool calls
    pub fn assistant_with_calls(text: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::Assistant {
            content: text,
            tool_calls,
        }
    }

    /// Create a tool-result message
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
        }
    }

    /// Get the role as a string
    pub fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    /// Get the textual body of this message, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::User { content } => Some(content),
            Self::Assistant { content, .. } => content.as_deref(),
            Self::Tool { content, .. } => Some(content),
        }
    }

    /// Replace the textual body, keeping tool calls untouched
    pub fn set_text(&mut self, text: String) {
        match self {
            Self::User { content } => *content = text,
            Self::Assistant { content, .. } => *content = Some(text),
            Self::Tool { content, .. } => *content = text,
        }
    }

    /// Tool calls carried by this message (empty unless assistant)
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::Tool { .. })
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }
}

/// Tool declaration surfaced to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDecl {
    /// Tool name (used in API calls)
    pub name: String,
    /// Human-readable description the model uses to decide when to call it
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
}

impl ToolDecl {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of response; this is the final answer
    Stop,
    /// Token budget hit; still treated as a final answer
    Length,
    /// The model requested tool executions
    ToolCalls,
    /// The vendor filtered the content but still returned a response
    ContentFiltered,
}

/// Normalized provider response
#[derive(Debug, Clone)]
pub struct ProviderReply {
    /// Assistant text, if any. Text can arrive together with tool calls.
    pub text: Option<String>,
    /// Tool calls the model wants executed, in request order
    pub tool_calls: Vec<ToolCallRequest>,
    pub stop_reason: StopReason,
}

impl ProviderReply {
    /// Whether this reply asks for tool executions
    pub fn wants_tools(&self) -> bool {
        self.stop_reason == StopReason::ToolCalls && !self.tool_calls.is_empty()
    }
}

/// A provider-agnostic conversation ready to send
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    /// System prompt; sent as a system message or systemInstruction per vendor
    pub system_prompt: Option<String>,
    /// Ordered turn sequence
    pub messages: Vec<ChatMessage>,
    /// Tools offered to the model; empty disables tool calling
    pub tools: Vec<ToolDecl>,
}

impl Conversation {
    pub fn with_system(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            messages: vec![],
            tools: vec![],
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }
}

/// Per-call generation options
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Request timeout; defaults to the main-call budget
    pub timeout: std::time::Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(2048),
            temperature: Some(0.7),
            timeout: std::time::Duration::from_secs(60),
        }
    }
}

impl CallOptions {
    /// Options for the secondary summarization call: tighter budget, shorter timeout.
    pub fn summarization() -> Self {
        Self {
            max_tokens: Some(512),
            temperature: Some(0.3),
            timeout: std::time::Duration::from_secs(30),
        }
    }
}
