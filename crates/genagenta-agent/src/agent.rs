//! The agent loop: a bounded, request-scoped tool-calling state machine
//!
//! One HTTP request drives one `Agent::run` to completion. The loop calls the
//! provider, executes requested tools serially, appends results, and decides
//! whether to continue or finalize. All anti-runaway policy lives here.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use genagenta_ai::{CallOptions, ChatMessage, Conversation, Provider, ProviderReply};
use serde::{Deserialize, Serialize};

use crate::context::{CompactionOutcome, ContextManager};
use crate::error::{Error, Result};
use crate::outcome::{AgentOutcome, ContextMeta};
use crate::tool::{Caller, FrontendAction, ToolRegistry};

/// Resume-context bounds, enforced as hard validation failures.
const MAX_RESUME_MESSAGES: usize = 50;
const MAX_RESUME_ITERATION: u32 = 10;

/// Anti-loop and iteration policy.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Hard cap on provider round trips per request
    pub max_iterations: u32,
    /// Global ceiling on executed tool calls per request
    pub max_total_tool_calls: u32,
    /// Ceiling on executions of any single tool name per request
    pub per_tool_limit: u32,
    /// Tools allowed at most once per request
    pub single_shot_tools: Vec<String>,
    /// Full extra iterations allowed after a map action before the loop
    /// stops proactively
    pub map_action_min_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_total_tool_calls: 10,
            per_tool_limit: 3,
            single_shot_tools: vec!["propose_improvement".to_string()],
            map_action_min_iterations: 1,
        }
    }
}

/// Per-request loop bookkeeping. Created fresh for every request, threaded
/// through the loop by `&mut`, never persisted.
#[derive(Debug, Default)]
pub struct LoopState {
    pub iteration: u32,
    /// Monotonic count of executed (not blocked) tool calls
    pub total_tool_calls: u32,
    pub per_tool_counts: HashMap<String, u32>,
    pub single_shot_used: HashSet<String>,
    /// Best text seen so far, tool-calling turns included
    pub last_assistant_text: Option<String>,
    /// Iteration on which the first map action landed
    pub map_action_iteration: Option<u32>,
    pub frontend_actions: Vec<FrontendAction>,
}

impl LoopState {
    fn new() -> Self {
        Self::default()
    }

    fn resumed_at(iteration: u32) -> Self {
        Self {
            iteration,
            ..Self::default()
        }
    }

    fn record_text(&mut self, reply: &ProviderReply) {
        if let Some(text) = &reply.text {
            if !text.trim().is_empty() {
                self.last_assistant_text = Some(text.clone());
            }
        }
    }
}

/// Client-driven multi-step flow state, round-tripped through the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeContext {
    pub messages: Vec<ChatMessage>,
    pub pending_tool_call_id: String,
    pub iteration: u32,
}

/// Drives one conversation turn to completion against a provider and a tool
/// registry.
pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    context: ContextManager,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        context: ContextManager,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            context,
            config,
        }
    }

    /// Run one full turn: context preparation, the bounded loop, and
    /// final-answer assembly.
    pub async fn run(
        &self,
        system_prompt: &str,
        history: Vec<ChatMessage>,
        user_message: impl Into<String>,
        caller: &Caller,
    ) -> Result<AgentOutcome> {
        let user_message = ChatMessage::user(user_message);
        let (mut messages, compaction) = self
            .context
            .prepare(&self.provider, history, user_message)
            .await;

        let mut state = LoopState::new();
        let final_text = self
            .run_loop(system_prompt, &mut messages, caller, &mut state)
            .await?;

        Ok(self.assemble(final_text, state, messages.len(), compaction))
    }

    /// Continue a turn the client paused for a frontend-executed action.
    ///
    /// The pending tool call must belong to the last message of the resumed
    /// history, so the result lands right after the assistant message that
    /// requested it.
    pub async fn resume(
        &self,
        system_prompt: &str,
        resume: ResumeContext,
        action_result: serde_json::Value,
        caller: &Caller,
    ) -> Result<AgentOutcome> {
        if resume.messages.len() > MAX_RESUME_MESSAGES {
            return Err(Error::InvalidResume(format!(
                "resume context holds {} messages, limit is {}",
                resume.messages.len(),
                MAX_RESUME_MESSAGES
            )));
        }
        if resume.iteration > MAX_RESUME_ITERATION {
            return Err(Error::InvalidResume(format!(
                "resume iteration {} exceeds limit {}",
                resume.iteration, MAX_RESUME_ITERATION
            )));
        }

        let mut messages = resume.messages;
        let pending = messages
            .last()
            .map(ChatMessage::tool_calls)
            .unwrap_or(&[])
            .iter()
            .find(|tc| tc.id == resume.pending_tool_call_id)
            .cloned()
            .ok_or_else(|| {
                Error::InvalidResume(
                    "pending_tool_call_id does not match the last assistant message".to_string(),
                )
            })?;

        let content = serde_json::to_string(&action_result)
            .unwrap_or_else(|_| "{}".to_string());
        messages.push(ChatMessage::tool_result(pending.id, pending.name, content));

        let mut state = LoopState::resumed_at(resume.iteration);
        let final_text = self
            .run_loop(system_prompt, &mut messages, caller, &mut state)
            .await?;

        Ok(self.assemble(
            final_text,
            state,
            messages.len(),
            CompactionOutcome::default(),
        ))
    }

    /// The state machine: call provider, inspect, execute tools, repeat.
    ///
    /// Returns the final text when the model stops on its own; `None` means a
    /// cap forced the exit and the fallback chain applies.
    async fn run_loop(
        &self,
        system_prompt: &str,
        messages: &mut Vec<ChatMessage>,
        caller: &Caller,
        state: &mut LoopState,
    ) -> Result<Option<String>> {
        let declarations = self.registry.declarations();

        loop {
            state.iteration += 1;
            tracing::debug!(iteration = state.iteration, "calling provider");

            let conversation = Conversation {
                system_prompt: Some(system_prompt.to_string()),
                messages: messages.clone(),
                tools: declarations.clone(),
            };
            // Adapter errors are fatal to the request: no retry, no loop
            // continuation.
            let reply = self
                .provider
                .call(&conversation, &CallOptions::default())
                .await?;

            // Text and tool calls can arrive together; the final useful text
            // may appear on a tool-calling turn.
            state.record_text(&reply);

            if !reply.wants_tools() {
                // Covers stop, length, and the anomalous non-stop reason with
                // an empty call list. Never loop on an ambiguous signal.
                return Ok(reply.text.filter(|t| !t.trim().is_empty()));
            }

            // A map action happened on an earlier iteration and the model
            // still wants tools. Stop here and let it narrate what it did
            // instead of chaining more calls.
            if let Some(map_iter) = state.map_action_iteration {
                if state.iteration >= map_iter + self.config.map_action_min_iterations {
                    tracing::info!(
                        iteration = state.iteration,
                        "map action performed, stopping early"
                    );
                    return Ok(None);
                }
            }

            let mut force_final = false;
            let mut results: Vec<ChatMessage> = Vec::with_capacity(reply.tool_calls.len());
            for call in &reply.tool_calls {
                let result = self.execute_gated(call, caller, state, &mut force_final).await;
                let text = result.wire_text(self.context.config.result_byte_budget);
                results.push(ChatMessage::tool_result(&call.id, &call.name, text));
            }

            append_tool_turn(messages, &reply, results)?;

            if force_final {
                tracing::warn!(
                    total = state.total_tool_calls,
                    "global tool budget exhausted, forcing final answer"
                );
                return Ok(None);
            }
            if state.iteration >= self.config.max_iterations {
                tracing::warn!(iteration = state.iteration, "iteration cap reached");
                return Ok(None);
            }

            self.context.compact_mid_loop(messages);
        }
    }

    /// Apply the anti-loop gates, then execute. Blocked calls still get a
    /// structured result so every requested call receives one.
    async fn execute_gated(
        &self,
        call: &genagenta_ai::ToolCallRequest,
        caller: &Caller,
        state: &mut LoopState,
        force_final: &mut bool,
    ) -> crate::tool::ToolResult {
        use crate::tool::ToolResult;

        if state.total_tool_calls >= self.config.max_total_tool_calls {
            *force_final = true;
            return ToolResult::blocked("tool budget for this request exhausted");
        }
        if self.config.single_shot_tools.iter().any(|t| t == &call.name)
            && state.single_shot_used.contains(&call.name)
        {
            return ToolResult::blocked("already proposed");
        }
        let count = state.per_tool_counts.get(&call.name).copied().unwrap_or(0);
        if count >= self.config.per_tool_limit {
            return ToolResult::blocked(format!(
                "call limit reached for {}",
                call.name
            ));
        }

        let result = self
            .registry
            .execute(&call.name, call.arguments.clone(), caller)
            .await;

        state.total_tool_calls += 1;
        *state.per_tool_counts.entry(call.name.clone()).or_insert(0) += 1;
        if self.config.single_shot_tools.iter().any(|t| t == &call.name) {
            state.single_shot_used.insert(call.name.clone());
        }
        if let Some(action) = &result.frontend_action {
            if action.is_map_action() && state.map_action_iteration.is_none() {
                state.map_action_iteration = Some(state.iteration);
            }
            state.frontend_actions.push(action.clone());
        }
        result
    }

    /// Final-answer fallback chain. The loop never returns an empty response.
    fn assemble(
        &self,
        final_text: Option<String>,
        state: LoopState,
        messages_count: usize,
        compaction: CompactionOutcome,
    ) -> AgentOutcome {
        let final_text = final_text
            .or_else(|| state.last_assistant_text.clone())
            .or_else(|| {
                if state.frontend_actions.is_empty() {
                    None
                } else {
                    Some(format!(
                        "I performed {} action(s). Anything else?",
                        state.frontend_actions.len()
                    ))
                }
            })
            .unwrap_or_else(|| {
                "Sorry, I couldn't complete that request. Please try rephrasing.".to_string()
            });

        AgentOutcome {
            final_text,
            iterations: state.iteration,
            frontend_actions: state.frontend_actions,
            context: ContextMeta {
                messages_count,
                did_compaction: compaction.did_compaction,
                compaction_threshold: self.context.config.compaction_threshold,
                compaction_summary: compaction.summary,
            },
        }
    }
}

/// Append the assistant tool-call turn and its results, enforcing the id
/// pairing contract the OpenAI-style protocol requires. A mismatch here is an
/// adapter bug, not something to tolerate.
fn append_tool_turn(
    messages: &mut Vec<ChatMessage>,
    reply: &ProviderReply,
    results: Vec<ChatMessage>,
) -> Result<()> {
    let call_ids: HashSet<&str> = reply.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
    for result in &results {
        let paired = match result {
            ChatMessage::Tool { tool_call_id, .. } => call_ids.contains(tool_call_id.as_str()),
            _ => false,
        };
        debug_assert!(paired, "tool result without a matching tool call id");
        if !paired {
            return Err(Error::Protocol(
                "tool result does not pair with a tool call in the preceding assistant message"
                    .to_string(),
            ));
        }
    }

    messages.push(ChatMessage::assistant_with_calls(
        reply.text.clone(),
        reply.tool_calls.clone(),
    ));
    messages.extend(results);
    Ok(())
}
