//! Tool trait, registry, and result handling

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use genagenta_ai::ToolDecl;
use serde::{Deserialize, Serialize};

/// Byte budget for serialized tool results sent back to the model.
pub const DEFAULT_RESULT_BYTE_BUDGET: usize = 5000;
/// When shrinking an oversized result, keep at most this many `data` rows.
pub const TRUNCATED_DATA_ROWS: usize = 20;

/// Identity of the user driving the request; every tool call is scoped to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    pub tenant_id: String,
    pub display_name: String,
}

impl Caller {
    pub fn new(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Side-channel instruction for the client UI, produced by map/UI tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrontendAction {
    MapFlyTo {
        lat: f64,
        lng: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        zoom: Option<u32>,
    },
    MapSelectEntity {
        entity_id: String,
    },
    MapShowConnections {
        entity_id: String,
    },
    MapSetStyle {
        style: String,
    },
    UiOpenPanel {
        panel: String,
    },
    UiShowNotification {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        level: Option<String>,
    },
}

impl FrontendAction {
    /// Whether this action manipulates the map view (drives the early-stop heuristic).
    pub fn is_map_action(&self) -> bool {
        matches!(
            self,
            FrontendAction::MapFlyTo { .. }
                | FrontendAction::MapSelectEntity { .. }
                | FrontendAction::MapShowConnections { .. }
                | FrontendAction::MapSetStyle { .. }
        )
    }
}

/// Result of a tool execution
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// JSON payload fed back to the model
    pub payload: serde_json::Value,
    /// Whether the execution failed
    pub is_error: bool,
    /// Side effect for the client UI, if any
    pub frontend_action: Option<FrontendAction>,
}

impl ToolResult {
    /// Create a successful result
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            payload,
            is_error: false,
            frontend_action: None,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            payload: serde_json::json!({ "error": message.into() }),
            is_error: true,
            frontend_action: None,
        }
    }

    /// Create the synthetic result returned when the anti-loop policy
    /// suppresses a requested call. Every requested call must still receive
    /// a result or the provider protocol breaks.
    pub fn blocked(message: impl Into<String>) -> Self {
        Self {
            payload: serde_json::json!({ "blocked": true, "message": message.into() }),
            is_error: false,
            frontend_action: None,
        }
    }

    /// Attach a frontend action
    pub fn with_action(mut self, action: FrontendAction) -> Self {
        self.frontend_action = Some(action);
        self
    }

    /// Serialize the payload for the wire, applying the oversized-result policy.
    pub fn wire_text(&self, byte_budget: usize) -> String {
        truncate_payload(&self.payload, byte_budget)
    }
}

/// Serialize a payload, shrinking it when it exceeds `byte_budget`.
///
/// Preference order: shrink an array-valued `data` field to a bounded prefix,
/// then fall back to embedding a raw prefix of the serialized text. Both
/// shrunken forms carry `_truncated: true` and stay valid JSON, so appending
/// them as a tool message never breaks the wire protocol.
pub fn truncate_payload(payload: &serde_json::Value, byte_budget: usize) -> String {
    let serialized = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    if serialized.len() <= byte_budget {
        return serialized;
    }

    if let serde_json::Value::Object(map) = payload {
        if let Some(serde_json::Value::Array(rows)) = map.get("data") {
            if rows.len() > TRUNCATED_DATA_ROWS {
                let mut shrunk = map.clone();
                shrunk.insert(
                    "data".to_string(),
                    serde_json::Value::Array(rows[..TRUNCATED_DATA_ROWS].to_vec()),
                );
                shrunk.insert("_truncated".to_string(), serde_json::Value::Bool(true));
                shrunk.insert(
                    "_total_rows".to_string(),
                    serde_json::Value::from(rows.len()),
                );
                let reserialized =
                    serde_json::to_string(&shrunk).unwrap_or_else(|_| "{}".to_string());
                if reserialized.len() <= byte_budget {
                    return reserialized;
                }
            }
        }
    }

    // Raw fallback: wrap a prefix of the serialized text so the result stays
    // valid JSON. JSON escaping can inflate the embedded prefix (quotes and
    // backslashes double), so shrink the cut until the wrapper itself fits.
    let mut cut = byte_budget.saturating_sub(64).max(1).min(serialized.len());
    loop {
        while !serialized.is_char_boundary(cut) {
            cut -= 1;
        }
        let wrapped = serde_json::json!({
            "_truncated": true,
            "preview": &serialized[..cut],
        });
        let text =
            serde_json::to_string(&wrapped).unwrap_or_else(|_| "{\"_truncated\":true}".to_string());
        if text.len() <= byte_budget || cut <= 1 {
            return text;
        }
        cut -= (text.len() - byte_budget).min(cut - 1);
    }
}

/// Trait for executable tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in API calls)
    fn name(&self) -> &str;

    /// Tool description surfaced to the model
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool. Must not panic; failures come back as error results.
    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult;
}

/// Type alias for a shared tool
pub type SharedTool = Arc<dyn Tool>;

/// Name-keyed tool registry with compiled schema validators.
///
/// New tools are added by registration; there is no central dispatch switch.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, SharedTool>,
    validators: HashMap<String, Arc<jsonschema::Validator>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, compiling its parameter schema.
    pub fn register(&mut self, tool: SharedTool) {
        let name = tool.name().to_string();
        match jsonschema::validator_for(&tool.parameters_schema()) {
            Ok(validator) => {
                self.validators.insert(name.clone(), Arc::new(validator));
            }
            Err(e) => {
                tracing::warn!(
                    "Invalid parameter schema for tool '{}', skipping validation: {}",
                    name,
                    e
                );
            }
        }
        if !self.tools.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.tools.insert(name, tool);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Declarations in registration order, for the provider call.
    pub fn declarations(&self) -> Vec<ToolDecl> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDecl::new(t.name(), t.description(), t.parameters_schema()))
            .collect()
    }

    /// Dispatch a named call.
    ///
    /// Unknown names and invalid arguments come back as error results; handler
    /// failures are the handler's own error results. Nothing raises past here,
    /// so the agent loop always keeps running.
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
        caller: &Caller,
    ) -> ToolResult {
        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => return ToolResult::error(format!("Unknown tool: {}", name)),
        };

        if let Some(validator) = self.validators.get(name) {
            let errors: Vec<String> = validator
                .iter_errors(&arguments)
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect();
            if !errors.is_empty() {
                return ToolResult::error(format!(
                    "Tool argument validation failed:\n{}",
                    errors.join("\n")
                ));
            }
        }

        tool.execute(arguments, caller).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_caller() -> Caller {
        Caller::new("u1", "t1", "Test User")
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
            ToolResult::ok(json!({ "echoed": arguments["text"] }))
        }
    }

    #[tokio::test]
    async fn test_registry_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let result = registry
            .execute("echo", json!({"text": "hi"}), &test_caller())
            .await;
        assert!(!result.is_error);
        assert_eq!(result.payload["echoed"], "hi");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let registry = ToolRegistry::new();
        let result = registry.execute("nope", json!({}), &test_caller()).await;
        assert!(result.is_error);
        assert!(result.payload["error"]
            .as_str()
            .unwrap()
            .contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_schema_validation_rejects_bad_args() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let result = registry
            .execute("echo", json!({"text": 42}), &test_caller())
            .await;
        assert!(result.is_error);
        assert!(result.payload["error"]
            .as_str()
            .unwrap()
            .contains("validation failed"));

        let missing = registry.execute("echo", json!({}), &test_caller()).await;
        assert!(missing.is_error);
    }

    #[test]
    fn test_declarations_follow_registration_order() {
        struct Named(&'static str);
        #[async_trait]
        impl Tool for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn description(&self) -> &str {
                "n/a"
            }
            fn parameters_schema(&self) -> serde_json::Value {
                json!({"type": "object"})
            }
            async fn execute(&self, _: serde_json::Value, _: &Caller) -> ToolResult {
                ToolResult::ok(json!({}))
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Named("b_tool")));
        registry.register(Arc::new(Named("a_tool")));
        let names: Vec<String> = registry
            .declarations()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
    }

    // --- truncation policy ---

    #[test]
    fn test_small_payload_untouched() {
        let payload = json!({"data": [1, 2, 3]});
        let text = truncate_payload(&payload, DEFAULT_RESULT_BYTE_BUDGET);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&text).unwrap(),
            payload
        );
    }

    #[test]
    fn test_oversized_data_array_shrinks_with_marker() {
        let rows: Vec<serde_json::Value> = (0..500)
            .map(|i| json!({"id": i, "name": format!("entity-{i}")}))
            .collect();
        let payload = json!({"data": rows, "count": 500});

        let text = truncate_payload(&payload, DEFAULT_RESULT_BYTE_BUDGET);
        assert!(text.len() <= DEFAULT_RESULT_BYTE_BUDGET);

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["_truncated"], true);
        assert_eq!(parsed["data"].as_array().unwrap().len(), TRUNCATED_DATA_ROWS);
        assert_eq!(parsed["_total_rows"], 500);
        // Non-data fields survive
        assert_eq!(parsed["count"], 500);
    }

    #[test]
    fn test_oversized_non_array_falls_back_to_preview() {
        let payload = json!({"blob": "x".repeat(20_000)});
        let text = truncate_payload(&payload, DEFAULT_RESULT_BYTE_BUDGET);
        assert!(text.len() <= DEFAULT_RESULT_BYTE_BUDGET);

        // Still valid JSON with the marker, so the wire protocol holds
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["_truncated"], true);
        assert!(parsed["preview"].as_str().unwrap().len() > 0);
    }

    #[test]
    fn test_fallback_fits_budget_despite_escape_inflation() {
        // Quotes and backslashes double in size when re-escaped inside the
        // preview string; the wrapper must still land under the budget.
        let payload = json!({"blob": "\"\\".repeat(10_000)});
        let text = truncate_payload(&payload, DEFAULT_RESULT_BYTE_BUDGET);
        assert!(text.len() <= DEFAULT_RESULT_BYTE_BUDGET, "got {}", text.len());

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["_truncated"], true);
        assert!(!parsed["preview"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_fallback_respects_char_boundaries() {
        let payload = json!({"blob": "è".repeat(10_000)});
        let text = truncate_payload(&payload, 2000);
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_ok());
    }

    #[test]
    fn test_map_action_detection() {
        assert!(FrontendAction::MapFlyTo {
            lat: 41.9,
            lng: 12.5,
            zoom: Some(12)
        }
        .is_map_action());
        assert!(!FrontendAction::UiShowNotification {
            message: "hi".into(),
            level: None
        }
        .is_map_action());
    }

    #[test]
    fn test_frontend_action_serde_tag() {
        let action = FrontendAction::MapFlyTo {
            lat: 41.9028,
            lng: 12.4964,
            zoom: Some(12),
        };
        let v = serde_json::to_value(&action).unwrap();
        assert_eq!(v["type"], "map_fly_to");
        assert_eq!(v["lat"], 41.9028);
    }
}
