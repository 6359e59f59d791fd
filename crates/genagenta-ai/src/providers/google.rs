//! Google-style generateContent adapter

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    providers::Provider,
    types::{CallOptions, ChatMessage, Conversation, ProviderReply, StopReason, ToolCallRequest},
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Adapter for the Google generateContent protocol
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GoogleProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn build_request(&self, conversation: &Conversation, opts: &CallOptions) -> GeminiRequest {
        let contents = conversation.messages.iter().map(convert_message).collect();

        // System prompt travels as a separate top-level field, not a turn
        let system_instruction = conversation
            .system_prompt
            .as_ref()
            .map(|prompt| GeminiContent {
                role: None,
                parts: vec![GeminiPart::Text {
                    text: prompt.clone(),
                }],
            });

        let tools = if conversation.tools.is_empty() {
            None
        } else {
            let function_declarations = conversation
                .tools
                .iter()
                .map(|t| GeminiFunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: Some(t.parameters.clone()),
                })
                .collect();
            Some(vec![GeminiTool {
                function_declarations,
            }])
        };

        GeminiRequest {
            contents,
            system_instruction,
            tools,
            generation_config: Some(GeminiGenerationConfig {
                max_output_tokens: opts.max_tokens,
                temperature: opts.temperature,
            }),
        }
    }
}

#[async_trait::async_trait]
impl Provider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn call(
        &self,
        conversation: &Conversation,
        opts: &CallOptions,
    ) -> Result<ProviderReply> {
        let request = self.build_request(conversation, opts);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .timeout(opts.timeout)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RateLimited {
                provider: "google",
                message: body,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), body));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        parse_reply(parsed)
    }
}

fn convert_message(msg: &ChatMessage) -> GeminiContent {
    match msg {
        ChatMessage::User { content } => GeminiContent {
            role: Some("user".to_string()),
            parts: vec![GeminiPart::Text {
                text: content.clone(),
            }],
        },
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut parts = Vec::new();
            if let Some(text) = content {
                if !text.is_empty() {
                    parts.push(GeminiPart::Text { text: text.clone() });
                }
            }
            for tc in tool_calls {
                // The synthesized call id is not part of the Google wire format
                parts.push(GeminiPart::FunctionCall {
                    function_call: GeminiFunctionCall {
                        name: tc.name.clone(),
                        args: tc.arguments.clone(),
                    },
                });
            }
            GeminiContent {
                role: Some("model".to_string()),
                parts,
            }
        }
        ChatMessage::Tool {
            tool_name, content, ..
        } => GeminiContent {
            role: Some("function".to_string()),
            parts: vec![GeminiPart::FunctionResponse {
                function_response: GeminiFunctionResponse {
                    name: tool_name.clone(),
                    response: serde_json::json!({ "result": content }),
                },
            }],
        },
    }
}

fn parse_reply(response: GenerateContentResponse) -> Result<ProviderReply> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnexpectedResponse("response had no candidates".to_string()))?;

    let finish_reason = candidate.finish_reason.clone();
    let parts = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default();

    // No parts plus a safety finish is a hard content-policy failure
    if parts.is_empty() {
        if let Some(reason) = finish_reason.as_deref() {
            if reason == "SAFETY" || reason == "RECITATION" {
                return Err(Error::ContentBlocked {
                    provider: "google",
                    reason: reason.to_string(),
                });
            }
        }
    }

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        match part {
            GeminiResponsePart::Text { text: t } => text.push_str(&t),
            GeminiResponsePart::FunctionCall { function_call } => {
                // This protocol has no call ids; synthesize one so the
                // tool-result pairing invariant holds uniformly upstream.
                tool_calls.push(ToolCallRequest::new(
                    ToolCallRequest::synthetic_id(),
                    function_call.name,
                    function_call.args,
                ));
            }
        }
    }

    // Zero function calls means this is the final answer
    let stop_reason = if !tool_calls.is_empty() {
        StopReason::ToolCalls
    } else {
        match finish_reason.as_deref() {
            Some("MAX_TOKENS") => StopReason::Length,
            _ => StopReason::Stop,
        }
    };

    Ok(ProviderReply {
        text: if text.is_empty() { None } else { Some(text) },
        tool_calls,
        stop_reason,
    })
}

// Wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
}

#[derive(Debug, Serialize)]
struct GeminiFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiResponsePart {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiResponseFunctionCall,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Deserialize)]
struct GeminiResponseFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> GoogleProvider {
        GoogleProvider::new("test-key", "gemini-2.0-flash", Some(server.uri()))
    }

    fn simple_conversation() -> Conversation {
        let mut conv = Conversation::with_system("You are a CRM assistant.");
        conv.push(ChatMessage::user("ciao"));
        conv
    }

    #[tokio::test]
    async fn test_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.*:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Ciao!"}]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let reply = provider_for(&server)
            .call(&simple_conversation(), &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.text.as_deref(), Some("Ciao!"));
        assert_eq!(reply.stop_reason, StopReason::Stop);
    }

    #[tokio::test]
    async fn test_function_call_gets_synthetic_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.*:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [
                        {"text": "Looking it up."},
                        {"functionCall": {"name": "get_entity_details", "args": {"id": "n42"}}}
                    ]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let reply = provider_for(&server)
            .call(&simple_conversation(), &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.stop_reason, StopReason::ToolCalls);
        assert_eq!(reply.tool_calls.len(), 1);
        assert!(reply.tool_calls[0].id.starts_with("call_"));
        assert_eq!(reply.tool_calls[0].arguments["id"], "n42");
        assert_eq!(reply.text.as_deref(), Some("Looking it up."));
    }

    #[tokio::test]
    async fn test_safety_block_is_hard_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.*:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"finishReason": "SAFETY"}]
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .call(&simple_conversation(), &CallOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_content_blocked());
    }

    #[tokio::test]
    async fn test_max_tokens_is_length() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.*:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "truncated answe"}]},
                    "finishReason": "MAX_TOKENS"
                }]
            })))
            .mount(&server)
            .await;

        let reply = provider_for(&server)
            .call(&simple_conversation(), &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.stop_reason, StopReason::Length);
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/models/.*:generateContent"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .call(&simple_conversation(), &CallOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_tool_result_serializes_as_function_response() {
        let msg = ChatMessage::tool_result("call_x", "search_entities", "{\"data\":[]}");
        let content = convert_message(&msg);
        let v = serde_json::to_value(&content).unwrap();
        assert_eq!(v["role"], "function");
        assert_eq!(v["parts"][0]["functionResponse"]["name"], "search_entities");
    }
}
