//! Chat endpoints
//!
//! `POST /ai/chat` runs one agent turn; `POST /ai/chat/resume` continues a
//! turn the client paused to execute a frontend action. The caller identity
//! arrives pre-authenticated in headers; auth itself lives outside this
//! service.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use genagenta_agent::{AgentOutcome, Caller, ContextMeta, FrontendAction, ResumeContext};
use genagenta_ai::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::prompt::{self, UiContext};
use crate::state::AppState;

/// One prior turn as the frontend stores it.
#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub ui_context: UiContext,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub resume_context: ResumeContext,
    pub action_result: Value,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub iterations: u32,
    pub context: ContextMeta,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<FrontendAction>,
}

impl From<AgentOutcome> for ChatResponse {
    fn from(outcome: AgentOutcome) -> Self {
        Self {
            response: outcome.final_text,
            iterations: outcome.iterations,
            context: outcome.context,
            actions: outcome.frontend_actions,
        }
    }
}

/// Maps agent errors onto the HTTP status the taxonomy assigns them.
pub struct ApiError(genagenta_agent::Error);

impl From<genagenta_agent::Error> for ApiError {
    fn from(e: genagenta_agent::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::error!(status = status.as_u16(), "chat request failed: {}", self.0);
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

fn caller_from(headers: &HeaderMap) -> Caller {
    let header = |name: &str, default: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(default)
            .to_string()
    };
    Caller::new(
        header("x-user-id", "anonymous"),
        header("x-tenant-id", "default"),
        header("x-user-name", "utente"),
    )
}

fn to_history(entries: Vec<HistoryEntry>) -> Vec<ChatMessage> {
    entries
        .into_iter()
        .map(|e| match e.role.as_str() {
            "assistant" => ChatMessage::assistant(e.content),
            _ => ChatMessage::user(e.content),
        })
        .collect()
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let caller = caller_from(&headers);
    let system_prompt = prompt::render(&state.prompt_template, &caller, &request.ui_context);
    tracing::info!(user = %caller.user_id, history = request.history.len(), "chat request");

    let outcome = state
        .agent
        .run(
            &system_prompt,
            to_history(request.history),
            request.message,
            &caller,
        )
        .await?;

    Ok(Json(outcome.into()))
}

pub async fn chat_resume(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ResumeRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let caller = caller_from(&headers);
    let system_prompt = prompt::render(&state.prompt_template, &caller, &UiContext::default());
    tracing::info!(user = %caller.user_id, "chat resume request");

    let outcome = state
        .agent
        .resume(
            &system_prompt,
            request.resume_context,
            request.action_result,
            &caller,
        )
        .await?;

    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "u42".parse().unwrap());
        headers.insert("x-tenant-id", "acme".parse().unwrap());
        headers.insert("x-user-name", "Mario".parse().unwrap());
        let caller = caller_from(&headers);
        assert_eq!(caller.user_id, "u42");
        assert_eq!(caller.tenant_id, "acme");
        assert_eq!(caller.display_name, "Mario");
    }

    #[test]
    fn test_caller_defaults() {
        let caller = caller_from(&HeaderMap::new());
        assert_eq!(caller.user_id, "anonymous");
        assert_eq!(caller.tenant_id, "default");
    }

    #[test]
    fn test_history_mapping() {
        let history = to_history(vec![
            HistoryEntry {
                role: "user".to_string(),
                content: "hi".to_string(),
            },
            HistoryEntry {
                role: "assistant".to_string(),
                content: "hello".to_string(),
            },
        ]);
        assert_eq!(history[0].role(), "user");
        assert_eq!(history[1].role(), "assistant");
    }

    #[test]
    fn test_chat_request_accepts_camel_case_ui_context() {
        let body = serde_json::json!({
            "message": "show it",
            "history": [],
            "uiContext": {"selectedEntity": {"id": "e1"}}
        });
        let request: ChatRequest = serde_json::from_value(body).unwrap();
        assert!(request.ui_context.selected_entity.is_some());
    }

    #[test]
    fn test_empty_actions_are_omitted() {
        let response = ChatResponse {
            response: "done".to_string(),
            iterations: 1,
            context: ContextMeta {
                messages_count: 2,
                did_compaction: false,
                compaction_threshold: 20,
                compaction_summary: None,
            },
            actions: vec![],
        };
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("actions").is_none());
        assert!(value.get("compaction_summary").is_none());
    }
}
