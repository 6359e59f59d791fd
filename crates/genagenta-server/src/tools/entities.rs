//! CRM read and write tools
//!
//! Thin adapters from tool arguments to `CrmStore` calls. Validation that
//! belongs to the data model (self-loops, duplicate edges, tenant scoping)
//! lives in the store; these handlers check argument presence and shape.

use std::sync::Arc;

use async_trait::async_trait;
use genagenta_agent::{Caller, Tool, ToolResult};
use serde_json::json;

use crate::store::{CrmStore, EntityPatch};

const SEARCH_LIMIT: usize = 25;

fn require_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolResult> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolResult::error(format!("Missing '{}' argument", key)))
}

fn patch_from(arguments: &serde_json::Value) -> EntityPatch {
    EntityPatch {
        name: arguments
            .get("name")
            .and_then(|v| v.as_str())
            .map(String::from),
        entity_type: arguments
            .get("entity_type")
            .and_then(|v| v.as_str())
            .map(String::from),
        address: arguments
            .get("address")
            .and_then(|v| v.as_str())
            .map(String::from),
        lat: arguments.get("lat").and_then(|v| v.as_f64()),
        lng: arguments.get("lng").and_then(|v| v.as_f64()),
    }
}

macro_rules! store_tool {
    ($name:ident) => {
        pub struct $name {
            store: Arc<dyn CrmStore>,
        }

        impl $name {
            pub fn new(store: Arc<dyn CrmStore>) -> Self {
                Self { store }
            }
        }
    };
}

store_tool!(SearchEntitiesTool);

#[async_trait]
impl Tool for SearchEntitiesTool {
    fn name(&self) -> &str {
        "search_entities"
    }

    fn description(&self) -> &str {
        "Search CRM entities by name, type, or address. Returns up to 25 matches."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text to match against name, type, and address"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let query = match require_str(&arguments, "query") {
            Ok(q) => q,
            Err(e) => return e,
        };
        let entities = self.store.search_entities(caller, query, SEARCH_LIMIT);
        let count = entities.len();
        ToolResult::ok(json!({
            "data": entities,
            "count": count,
        }))
    }
}

store_tool!(GetEntityDetailsTool);

#[async_trait]
impl Tool for GetEntityDetailsTool {
    fn name(&self) -> &str {
        "get_entity_details"
    }

    fn description(&self) -> &str {
        "Fetch one entity with its connections and notes."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"}
            },
            "required": ["entity_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let id = match require_str(&arguments, "entity_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.store.get_entity(caller, id) {
            Ok(entity) => ToolResult::ok(json!({
                "entity": entity,
                "connections": self.store.connections_for(caller, id),
                "notes": self.store.notes_for(caller, id),
            })),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

store_tool!(GetConnectionsTool);

#[async_trait]
impl Tool for GetConnectionsTool {
    fn name(&self) -> &str {
        "get_connections"
    }

    fn description(&self) -> &str {
        "List the connections of an entity."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"}
            },
            "required": ["entity_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let id = match require_str(&arguments, "entity_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        ToolResult::ok(json!({"data": self.store.connections_for(caller, id)}))
    }
}

store_tool!(GetSalesStatsTool);

#[async_trait]
impl Tool for GetSalesStatsTool {
    fn name(&self) -> &str {
        "get_sales_stats"
    }

    fn description(&self) -> &str {
        "Aggregate sales totals and a per-status breakdown for the caller's tenant."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        match serde_json::to_value(self.store.sales_stats(caller)) {
            Ok(stats) => ToolResult::ok(stats),
            Err(e) => ToolResult::error(format!("Failed to serialize stats: {}", e)),
        }
    }
}

store_tool!(CreateEntityTool);

#[async_trait]
impl Tool for CreateEntityTool {
    fn name(&self) -> &str {
        "create_entity"
    }

    fn description(&self) -> &str {
        "Create a new CRM entity. Name is required; type, address, and coordinates are optional."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "entity_type": {"type": "string"},
                "address": {"type": "string"},
                "lat": {"type": "number"},
                "lng": {"type": "number"}
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        match self.store.create_entity(caller, patch_from(&arguments)) {
            Ok(entity) => ToolResult::ok(json!({"created": entity})),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

store_tool!(UpdateEntityTool);

#[async_trait]
impl Tool for UpdateEntityTool {
    fn name(&self) -> &str {
        "update_entity"
    }

    fn description(&self) -> &str {
        "Update fields of an existing entity. Only provided fields change."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "name": {"type": "string"},
                "entity_type": {"type": "string"},
                "address": {"type": "string"},
                "lat": {"type": "number"},
                "lng": {"type": "number"}
            },
            "required": ["entity_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let id = match require_str(&arguments, "entity_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.store.update_entity(caller, id, patch_from(&arguments)) {
            Ok(entity) => ToolResult::ok(json!({"updated": entity})),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

store_tool!(CreateConnectionTool);

#[async_trait]
impl Tool for CreateConnectionTool {
    fn name(&self) -> &str {
        "create_connection"
    }

    fn description(&self) -> &str {
        "Create a connection between two entities. Self-loops and duplicate edges are rejected."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "from_id": {"type": "string"},
                "to_id": {"type": "string"},
                "connection_type": {"type": "string"}
            },
            "required": ["from_id", "to_id", "connection_type"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let from = match require_str(&arguments, "from_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let to = match require_str(&arguments, "to_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let kind = match require_str(&arguments, "connection_type") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.store.create_connection(caller, from, to, kind) {
            Ok(connection) => ToolResult::ok(json!({"created": connection})),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

store_tool!(CreateSaleTool);

#[async_trait]
impl Tool for CreateSaleTool {
    fn name(&self) -> &str {
        "create_sale"
    }

    fn description(&self) -> &str {
        "Record a sale against an entity."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "amount": {"type": "number"},
                "status": {"type": "string"},
                "description": {"type": "string"}
            },
            "required": ["entity_id", "amount", "status"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let entity_id = match require_str(&arguments, "entity_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let amount = match arguments.get("amount").and_then(|v| v.as_f64()) {
            Some(a) => a,
            None => return ToolResult::error("Missing 'amount' argument"),
        };
        let status = match require_str(&arguments, "status") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let description = arguments
            .get("description")
            .and_then(|v| v.as_str())
            .map(String::from);
        match self
            .store
            .create_sale(caller, entity_id, amount, status, description)
        {
            Ok(sale) => ToolResult::ok(json!({"created": sale})),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

store_tool!(CreateNoteTool);

#[async_trait]
impl Tool for CreateNoteTool {
    fn name(&self) -> &str {
        "create_note"
    }

    fn description(&self) -> &str {
        "Attach a note to an entity."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "text": {"type": "string"}
            },
            "required": ["entity_id", "text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let entity_id = match require_str(&arguments, "entity_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let text = match require_str(&arguments, "text") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.store.create_note(caller, entity_id, text) {
            Ok(note) => ToolResult::ok(json!({"created": note})),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

store_tool!(DeleteEntityTool);

#[async_trait]
impl Tool for DeleteEntityTool {
    fn name(&self) -> &str {
        "delete_entity"
    }

    fn description(&self) -> &str {
        "Permanently delete an entity and its connections. Use only when the user explicitly asks."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"}
            },
            "required": ["entity_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let id = match require_str(&arguments, "entity_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.store.delete_entity(caller, id) {
            Ok(()) => ToolResult::ok(json!({"deleted": id})),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

store_tool!(DeleteConnectionTool);

#[async_trait]
impl Tool for DeleteConnectionTool {
    fn name(&self) -> &str {
        "delete_connection"
    }

    fn description(&self) -> &str {
        "Permanently delete a connection. Use only when the user explicitly asks."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "connection_id": {"type": "string"}
            },
            "required": ["connection_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let id = match require_str(&arguments, "connection_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.store.delete_connection(caller, id) {
            Ok(()) => ToolResult::ok(json!({"deleted": id})),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

store_tool!(DeleteSaleTool);

#[async_trait]
impl Tool for DeleteSaleTool {
    fn name(&self) -> &str {
        "delete_sale"
    }

    fn description(&self) -> &str {
        "Permanently delete a sale record. Use only when the user explicitly asks."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "sale_id": {"type": "string"}
            },
            "required": ["sale_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let id = match require_str(&arguments, "sale_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.store.delete_sale(caller, id) {
            Ok(()) => ToolResult::ok(json!({"deleted": id})),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn caller() -> Caller {
        Caller::new("u1", "t1", "Mario")
    }

    fn store_with_entity() -> (Arc<MemoryStore>, String) {
        let store = Arc::new(MemoryStore::new());
        let e = store
            .create_entity(
                &caller(),
                EntityPatch {
                    name: Some("Rossi Srl".to_string()),
                    entity_type: Some("client".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        (store, e.id)
    }

    #[tokio::test]
    async fn test_search_finds_by_name() {
        let (store, _) = store_with_entity();
        let tool = SearchEntitiesTool::new(store);
        let result = tool.execute(json!({"query": "rossi"}), &caller()).await;
        assert!(!result.is_error);
        assert_eq!(result.payload["count"], 1);
    }

    #[tokio::test]
    async fn test_details_include_notes_and_connections() {
        let (store, id) = store_with_entity();
        store.create_note(&caller(), &id, "VIP client").unwrap();
        let tool = GetEntityDetailsTool::new(store);
        let result = tool.execute(json!({"entity_id": id}), &caller()).await;
        assert!(!result.is_error);
        assert_eq!(result.payload["notes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_entity_requires_name() {
        let tool = CreateEntityTool::new(Arc::new(MemoryStore::new()));
        let result = tool.execute(json!({"entity_type": "client"}), &caller()).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_connection_self_loop_is_tool_error_not_panic() {
        let (store, id) = store_with_entity();
        let tool = CreateConnectionTool::new(store);
        let result = tool
            .execute(
                json!({"from_id": id, "to_id": id, "connection_type": "partner"}),
                &caller(),
            )
            .await;
        assert!(result.is_error);
        assert!(result.payload["error"]
            .as_str()
            .unwrap()
            .contains("itself"));
    }

    #[tokio::test]
    async fn test_delete_missing_entity_reports_error() {
        let tool = DeleteEntityTool::new(Arc::new(MemoryStore::new()));
        let result = tool.execute(json!({"entity_id": "nope"}), &caller()).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_sales_stats_tool() {
        let (store, id) = store_with_entity();
        store
            .create_sale(&caller(), &id, 42.0, "won", None)
            .unwrap();
        let tool = GetSalesStatsTool::new(store);
        let result = tool.execute(json!({}), &caller()).await;
        assert_eq!(result.payload["total_count"], 1);
    }
}
