//! OpenAI-style Chat Completions adapter

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    providers::Provider,
    types::{CallOptions, ChatMessage, Conversation, ProviderReply, StopReason, ToolCallRequest},
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Adapter for the OpenAI chat-completions protocol
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIProvider {
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

    fn build_request(&self, conversation: &Conversation, opts: &CallOptions) -> OpenAIRequest {
        let mut messages = Vec::new();

        // System prompt goes first, as a system-role message
        if let Some(ref system_prompt) = conversation.system_prompt {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(system_prompt.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &conversation.messages {
            messages.push(convert_message(msg));
        }

        let tools = if conversation.tools.is_empty() {
            None
        } else {
            Some(
                conversation
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        tool_type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: Some(t.description.clone()),
                            parameters: Some(t.parameters.clone()),
                        },
                    })
                    .collect(),
            )
        };

        OpenAIRequest {
            model: self.model.clone(),
            messages,
            max_tokens: opts.max_tokens,
            temperature: opts.temperature,
            tools,
        }
    }
}

#[async_trait::async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn call(
        &self,
        conversation: &Conversation,
        opts: &CallOptions,
    ) -> Result<ProviderReply> {
        let request = self.build_request(conversation, opts);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(opts.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RateLimited {
                provider: "openai",
                message: body,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), body));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        parse_reply(parsed)
    }
}

fn convert_message(msg: &ChatMessage) -> OpenAIMessage {
    match msg {
        ChatMessage::User { content } => OpenAIMessage {
            role: "user".to_string(),
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let calls = if tool_calls.is_empty() {
                None
            } else {
                Some(
                    tool_calls
                        .iter()
                        .map(|tc| OpenAIToolCall {
                            id: tc.id.clone(),
                            call_type: "function".to_string(),
                            function: OpenAIFunctionCall {
                                name: tc.name.clone(),
                                arguments: serde_json::to_string(&tc.arguments)
                                    .unwrap_or_else(|_| "{}".to_string()),
                            },
                        })
                        .collect(),
                )
            };
            OpenAIMessage {
                role: "assistant".to_string(),
                content: content.clone(),
                tool_calls: calls,
                tool_call_id: None,
            }
        }
        ChatMessage::Tool {
            tool_call_id,
            content,
            ..
        } => OpenAIMessage {
            role: "tool".to_string(),
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.clone()),
        },
    }
}

fn parse_reply(response: ChatCompletionResponse) -> Result<ProviderReply> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnexpectedResponse("response had no choices".to_string()))?;

    let text = choice.message.content.filter(|t| !t.is_empty());

    let tool_calls: Vec<ToolCallRequest> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            // Arguments arrive as a JSON string; a parse failure degrades to {}
            let arguments = serde_json::from_str(&tc.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({}));
            ToolCallRequest::new(tc.id, tc.function.name, arguments)
        })
        .collect();

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("tool_calls") if !tool_calls.is_empty() => StopReason::ToolCalls,
        Some("stop") => StopReason::Stop,
        Some("length") => StopReason::Length,
        Some("content_filter") => StopReason::ContentFiltered,
        // Anomalous or missing finish reason: if calls arrived, honor them,
        // otherwise degrade to a final answer using the best available text.
        _ if !tool_calls.is_empty() => StopReason::ToolCalls,
        other => {
            if other.is_some() {
                tracing::warn!(finish_reason = ?other, "unrecognized finish reason, treating as final");
            }
            StopReason::Stop
        }
    };

    Ok(ProviderReply {
        text,
        tool_calls,
        stop_reason,
    })
}

// Wire types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ResponseFunctionCall {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolDecl;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAIProvider {
        OpenAIProvider::new("test-key", "gpt-4o-mini", Some(server.uri()))
    }

    fn simple_conversation() -> Conversation {
        let mut conv = Conversation::with_system("You are a CRM assistant.");
        conv.push(ChatMessage::user("hello"));
        conv
    }

    #[tokio::test]
    async fn test_plain_text_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"content": "Hi there!", "tool_calls": null},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let reply = provider_for(&server)
            .call(&simple_conversation(), &CallOptions::default())
            .await
            .unwrap();

        assert_eq!(reply.text.as_deref(), Some("Hi there!"));
        assert_eq!(reply.stop_reason, StopReason::Stop);
        assert!(reply.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_reply_parses_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": "Let me look that up.",
                        "tool_calls": [{
                            "id": "call_abc",
                            "type": "function",
                            "function": {
                                "name": "search_entities",
                                "arguments": "{\"query\": \"Rossi\"}"
                            }
                        }]
                    },
                    "finish_reason": "tool_calls"
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
        assert_eq!(reply.tool_calls[0].id, "call_abc");
        assert_eq!(reply.tool_calls[0].name, "search_entities");
        assert_eq!(reply.tool_calls[0].arguments["query"], "Rossi");
        // Text arriving together with tool calls must be captured
        assert_eq!(reply.text.as_deref(), Some("Let me look that up."));
    }

    #[tokio::test]
    async fn test_malformed_arguments_degrade_to_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "get_database_schema", "arguments": "{not json"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let reply = provider_for(&server)
            .call(&simple_conversation(), &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.tool_calls[0].arguments, json!({}));
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .call(&simple_conversation(), &CallOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_empty_choices_is_unexpected_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .call(&simple_conversation(), &CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_anomalous_finish_reason_degrades_to_stop() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"content": "partial answer"},
                    "finish_reason": "weird_reason"
                }]
            })))
            .mount(&server)
            .await;

        let reply = provider_for(&server)
            .call(&simple_conversation(), &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.stop_reason, StopReason::Stop);
        assert_eq!(reply.text.as_deref(), Some("partial answer"));
    }

    #[tokio::test]
    async fn test_request_carries_system_prompt_and_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "system", "content": "You are a CRM assistant."}],
                "tools": [{"type": "function", "function": {"name": "map_fly_to"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut conv = simple_conversation();
        conv.tools.push(ToolDecl::new(
            "map_fly_to",
            "Move the map camera",
            json!({"type": "object", "properties": {}}),
        ));

        provider_for(&server)
            .call(&conv, &CallOptions::default())
            .await
            .unwrap();
    }
}
