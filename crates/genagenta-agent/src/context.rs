//! Context management: truncation, windowing, and compaction
//!
//! Bounds the conversation sent to the model. Long individual messages are
//! cut with a visible marker, history is windowed to recent turns, and once
//! the original history grows past a threshold it is replaced by an
//! LLM-generated summary (a nested, tools-free call).

use std::sync::Arc;

use genagenta_ai::{CallOptions, ChatMessage, Conversation, Provider};

/// Visible marker appended to cut message bodies so the model knows content
/// was dropped.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

const SUMMARIZATION_SYSTEM_PROMPT: &str = "\
You are a summarization assistant for a CRM. Summarize the conversation you \
are given in 2-3 sentences, keeping entity names, decisions, and pending \
requests. Reply with the summary only.";

/// Configuration for context management.
///
/// The defaults mirror the tuned values this behavior shipped with; they are
/// fields rather than constants so deployments can adjust them.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Character budget for a single message body
    pub max_message_chars: usize,
    /// Only this many recent turns are sent when no compaction applies
    pub max_history_messages: usize,
    /// Original history length that triggers compaction
    pub compaction_threshold: usize,
    /// Raw tail kept when the summarization call fails
    pub compaction_fallback_tail: usize,
    /// Mid-loop: message count that triggers result compaction
    pub midloop_max_messages: usize,
    /// Mid-loop: tool-result messages kept after compaction
    pub midloop_keep_tool_results: usize,
    /// Byte budget for serialized tool results
    pub result_byte_budget: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 3000,
            max_history_messages: 30,
            compaction_threshold: 20,
            compaction_fallback_tail: 4,
            midloop_max_messages: 10,
            midloop_keep_tool_results: 4,
            result_byte_budget: crate::tool::DEFAULT_RESULT_BYTE_BUDGET,
        }
    }
}

/// What the pre-loop preparation did, surfaced to the caller as metadata.
#[derive(Debug, Clone, Default)]
pub struct CompactionOutcome {
    pub did_compaction: bool,
    pub summary: Option<String>,
}

/// Applies the context policy before and during the agent loop.
#[derive(Debug, Clone, Default)]
pub struct ContextManager {
    pub config: ContextConfig,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Cut a message body to the per-message budget, marking the cut.
    fn truncate_message(&self, msg: &mut ChatMessage) {
        let budget = self.config.max_message_chars;
        if let Some(text) = msg.text() {
            if text.chars().count() > budget {
                let cut: String = text.chars().take(budget).collect();
                msg.set_text(format!("{}{}", cut, TRUNCATION_MARKER));
            }
        }
    }

    /// Prepare the message list for the first provider call.
    ///
    /// Compaction triggers on the original, uncapped history length. On
    /// success the whole history collapses to `[summary, current user turn]`;
    /// on failure only the raw tail survives.
    pub async fn prepare(
        &self,
        provider: &Arc<dyn Provider>,
        mut history: Vec<ChatMessage>,
        mut user_message: ChatMessage,
    ) -> (Vec<ChatMessage>, CompactionOutcome) {
        let original_len = history.len();

        for msg in &mut history {
            self.truncate_message(msg);
        }
        // The per-message budget applies to the current turn too, not just
        // stored history.
        self.truncate_message(&mut user_message);

        if original_len > self.config.compaction_threshold {
            match self.summarize(provider, &history).await {
                Ok(summary) => {
                    tracing::info!(
                        history_len = original_len,
                        "compacted history into a summary"
                    );
                    let messages = vec![ChatMessage::assistant(summary.clone()), user_message];
                    return (
                        messages,
                        CompactionOutcome {
                            did_compaction: true,
                            summary: Some(summary),
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!("summarization failed, keeping raw tail: {}", e);
                    let tail_start = history
                        .len()
                        .saturating_sub(self.config.compaction_fallback_tail);
                    let mut messages: Vec<ChatMessage> = history.split_off(tail_start);
                    messages.push(user_message);
                    return (messages, CompactionOutcome::default());
                }
            }
        }

        let window_start = history
            .len()
            .saturating_sub(self.config.max_history_messages);
        let mut messages: Vec<ChatMessage> = history.split_off(window_start);
        messages.push(user_message);
        (messages, CompactionOutcome::default())
    }

    /// Nested, tools-free summarization call.
    async fn summarize(
        &self,
        provider: &Arc<dyn Provider>,
        history: &[ChatMessage],
    ) -> Result<String, String> {
        let conversation_text = serialize_for_summary(history);
        let prompt = format!(
            "Summarize this conversation in 2-3 sentences:\n\n{}",
            conversation_text
        );

        let mut conversation = Conversation::with_system(SUMMARIZATION_SYSTEM_PROMPT);
        conversation.push(ChatMessage::user(prompt));

        let reply = provider
            .call(&conversation, &CallOptions::summarization())
            .await
            .map_err(|e| e.to_string())?;

        match reply.text {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err("summarization returned an empty response".to_string()),
        }
    }

    /// Mid-loop result compaction.
    ///
    /// Once the working message list outgrows the threshold, keep: every turn
    /// that is neither a tool call nor a tool result, the single most recent
    /// assistant message that carried tool calls, and its tool results.
    /// Results of discarded assistant turns are dropped entirely. Keeping
    /// the pairing intact preserves the id-matching contract with the
    /// OpenAI-style protocol.
    pub fn compact_mid_loop(&self, messages: &mut Vec<ChatMessage>) {
        if messages.len() <= self.config.midloop_max_messages {
            return;
        }

        let last_caller_idx = messages
            .iter()
            .rposition(|m| m.has_tool_calls());

        let kept_call_ids: Vec<String> = last_caller_idx
            .map(|idx| {
                messages[idx]
                    .tool_calls()
                    .iter()
                    .map(|tc| tc.id.clone())
                    .collect()
            })
            .unwrap_or_default();

        // Indices of tool results paired with the kept assistant message,
        // capped to the most recent K. The cap never cuts below the kept
        // message's own call count: a listed call without a response makes
        // the OpenAI-style replay invalid.
        let mut paired_results: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(i, m)| {
                last_caller_idx.is_some_and(|c| *i > c)
                    && matches!(m, ChatMessage::Tool { tool_call_id, .. }
                        if kept_call_ids.iter().any(|id| id == tool_call_id))
            })
            .map(|(i, _)| i)
            .collect();
        let keep = self
            .config
            .midloop_keep_tool_results
            .max(kept_call_ids.len());
        if paired_results.len() > keep {
            paired_results.drain(..paired_results.len() - keep);
        }

        let before = messages.len();
        let mut idx = 0usize;
        messages.retain(|m| {
            let keep = match m {
                ChatMessage::Tool { .. } => paired_results.contains(&idx),
                ChatMessage::Assistant { .. } if m.has_tool_calls() => {
                    Some(idx) == last_caller_idx
                }
                _ => true,
            };
            idx += 1;
            keep
        });

        tracing::debug!(before, after = messages.len(), "mid-loop compaction");
    }
}

/// Plain-text rendering of the history for the summarization prompt.
fn serialize_for_summary(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for msg in messages {
        match msg {
            ChatMessage::User { content } => {
                out.push_str("[User]: ");
                out.push_str(content);
                out.push('\n');
            }
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                if let Some(text) = content {
                    if !text.is_empty() {
                        out.push_str("[Assistant]: ");
                        out.push_str(text);
                        out.push('\n');
                    }
                }
                if !tool_calls.is_empty() {
                    let calls: Vec<String> =
                        tool_calls.iter().map(|tc| tc.name.clone()).collect();
                    out.push_str("[Assistant tool calls]: ");
                    out.push_str(&calls.join(", "));
                    out.push('\n');
                }
            }
            ChatMessage::Tool {
                tool_name, content, ..
            } => {
                out.push_str(&format!("[Tool result ({})]: ", tool_name));
                if content.len() > 2000 {
                    let cut: String = content.chars().take(2000).collect();
                    out.push_str(&cut);
                    out.push_str("...(truncated)");
                } else {
                    out.push_str(content);
                }
                out.push('\n');
            }
        }
    }
    out
}
