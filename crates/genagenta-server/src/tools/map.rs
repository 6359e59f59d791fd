//! Map and UI control tools
//!
//! These never touch the store. Their whole job is to emit a
//! `FrontendAction` the client executes, plus a small success payload the
//! model can narrate from.

use async_trait::async_trait;
use genagenta_agent::{Caller, FrontendAction, Tool, ToolResult};
use serde_json::json;

pub struct MapFlyToTool;

#[async_trait]
impl Tool for MapFlyToTool {
    fn name(&self) -> &str {
        "map_fly_to"
    }

    fn description(&self) -> &str {
        "Move the map camera to a coordinate. Use after geocoding an address the user asked to see."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "lat": {"type": "number"},
                "lng": {"type": "number"},
                "zoom": {"type": "integer", "description": "Optional zoom level, defaults to city scale"}
            },
            "required": ["lat", "lng"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let lat = match arguments.get("lat").and_then(|v| v.as_f64()) {
            Some(v) => v,
            None => return ToolResult::error("Missing 'lat' argument"),
        };
        let lng = match arguments.get("lng").and_then(|v| v.as_f64()) {
            Some(v) => v,
            None => return ToolResult::error("Missing 'lng' argument"),
        };
        let zoom = arguments
            .get("zoom")
            .and_then(|v| v.as_u64())
            .map(|z| z as u32);

        ToolResult::ok(json!({"success": true, "lat": lat, "lng": lng}))
            .with_action(FrontendAction::MapFlyTo { lat, lng, zoom })
    }
}

pub struct MapSelectEntityTool;

#[async_trait]
impl Tool for MapSelectEntityTool {
    fn name(&self) -> &str {
        "map_select_entity"
    }

    fn description(&self) -> &str {
        "Highlight an entity on the map."
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

    async fn execute(&self, arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let entity_id = match arguments.get("entity_id").and_then(|v| v.as_str()) {
            Some(v) => v.to_string(),
            None => return ToolResult::error("Missing 'entity_id' argument"),
        };
        ToolResult::ok(json!({"success": true}))
            .with_action(FrontendAction::MapSelectEntity { entity_id })
    }
}

pub struct MapShowConnectionsTool;

#[async_trait]
impl Tool for MapShowConnectionsTool {
    fn name(&self) -> &str {
        "map_show_connections"
    }

    fn description(&self) -> &str {
        "Draw an entity's connections on the map."
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

    async fn execute(&self, arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let entity_id = match arguments.get("entity_id").and_then(|v| v.as_str()) {
            Some(v) => v.to_string(),
            None => return ToolResult::error("Missing 'entity_id' argument"),
        };
        ToolResult::ok(json!({"success": true}))
            .with_action(FrontendAction::MapShowConnections { entity_id })
    }
}

pub struct MapSetStyleTool;

#[async_trait]
impl Tool for MapSetStyleTool {
    fn name(&self) -> &str {
        "map_set_style"
    }

    fn description(&self) -> &str {
        "Switch the map base style (e.g. streets, satellite, dark)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "style": {"type": "string"}
            },
            "required": ["style"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let style = match arguments.get("style").and_then(|v| v.as_str()) {
            Some(v) => v.to_string(),
            None => return ToolResult::error("Missing 'style' argument"),
        };
        ToolResult::ok(json!({"success": true})).with_action(FrontendAction::MapSetStyle { style })
    }
}

pub struct UiOpenPanelTool;

#[async_trait]
impl Tool for UiOpenPanelTool {
    fn name(&self) -> &str {
        "ui_open_panel"
    }

    fn description(&self) -> &str {
        "Open a UI panel (e.g. sales, settings, entity detail)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "panel": {"type": "string"}
            },
            "required": ["panel"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let panel = match arguments.get("panel").and_then(|v| v.as_str()) {
            Some(v) => v.to_string(),
            None => return ToolResult::error("Missing 'panel' argument"),
        };
        ToolResult::ok(json!({"success": true})).with_action(FrontendAction::UiOpenPanel { panel })
    }
}

pub struct UiShowNotificationTool;

#[async_trait]
impl Tool for UiShowNotificationTool {
    fn name(&self) -> &str {
        "ui_show_notification"
    }

    fn description(&self) -> &str {
        "Show a toast notification to the user."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "message": {"type": "string"},
                "level": {"type": "string", "enum": ["info", "success", "warning", "error"]}
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        let message = match arguments.get("message").and_then(|v| v.as_str()) {
            Some(v) => v.to_string(),
            None => return ToolResult::error("Missing 'message' argument"),
        };
        let level = arguments
            .get("level")
            .and_then(|v| v.as_str())
            .map(String::from);
        ToolResult::ok(json!({"success": true}))
            .with_action(FrontendAction::UiShowNotification { message, level })
    }
}
