//! Tool implementations exposed to the agent

mod database;
mod entities;
mod files;
mod geocode;
mod map;

use std::sync::Arc;

use genagenta_agent::ToolRegistry;

pub use database::{GetSchemaTool, QueryDatabaseTool};
pub use entities::{
    CreateConnectionTool, CreateEntityTool, CreateNoteTool, CreateSaleTool, DeleteConnectionTool,
    DeleteEntityTool, DeleteSaleTool, GetConnectionsTool, GetEntityDetailsTool, GetSalesStatsTool,
    SearchEntitiesTool, UpdateEntityTool,
};
pub use files::{
    ExploreCodeTool, ListFilesTool, ProposeImprovementTool, ReadFileTool, ReadLearningsTool,
    Sandbox, SaveLearningTool, WriteFileTool,
};
pub use geocode::{GeocodeAddressTool, DEFAULT_BASE_URL as GEOCODE_DEFAULT_BASE_URL};
pub use map::{
    MapFlyToTool, MapSelectEntityTool, MapSetStyleTool, MapShowConnectionsTool, UiOpenPanelTool,
    UiShowNotificationTool,
};

use crate::store::CrmStore;

/// Build the full registry the chat endpoints run against.
pub fn build_registry(
    store: Arc<dyn CrmStore>,
    sandbox: Arc<Sandbox>,
    geocode_base_url: &str,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // Read tools
    registry.register(Arc::new(QueryDatabaseTool::new(store.clone())));
    registry.register(Arc::new(GetSchemaTool::new(store.clone())));
    registry.register(Arc::new(SearchEntitiesTool::new(store.clone())));
    registry.register(Arc::new(GetEntityDetailsTool::new(store.clone())));
    registry.register(Arc::new(GetConnectionsTool::new(store.clone())));
    registry.register(Arc::new(GetSalesStatsTool::new(store.clone())));

    // Write tools
    registry.register(Arc::new(CreateEntityTool::new(store.clone())));
    registry.register(Arc::new(UpdateEntityTool::new(store.clone())));
    registry.register(Arc::new(CreateConnectionTool::new(store.clone())));
    registry.register(Arc::new(CreateSaleTool::new(store.clone())));
    registry.register(Arc::new(CreateNoteTool::new(store.clone())));

    // Delete tools
    registry.register(Arc::new(DeleteEntityTool::new(store.clone())));
    registry.register(Arc::new(DeleteConnectionTool::new(store.clone())));
    registry.register(Arc::new(DeleteSaleTool::new(store)));

    // Geocoding
    registry.register(Arc::new(GeocodeAddressTool::new(geocode_base_url)));

    // Map and UI control
    registry.register(Arc::new(MapFlyToTool));
    registry.register(Arc::new(MapSelectEntityTool));
    registry.register(Arc::new(MapShowConnectionsTool));
    registry.register(Arc::new(MapSetStyleTool));
    registry.register(Arc::new(UiOpenPanelTool));
    registry.register(Arc::new(UiShowNotificationTool));

    // Sandbox and introspection
    registry.register(Arc::new(ReadFileTool::new(sandbox.clone())));
    registry.register(Arc::new(ListFilesTool::new(sandbox.clone())));
    registry.register(Arc::new(WriteFileTool::new(sandbox.clone())));
    registry.register(Arc::new(ExploreCodeTool::new(sandbox.clone())));
    registry.register(Arc::new(SaveLearningTool::new(sandbox.clone())));
    registry.register(Arc::new(ReadLearningsTool::new(sandbox.clone())));
    registry.register(Arc::new(ProposeImprovementTool::new(sandbox)));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    #[test]
    fn test_registry_has_every_tool() {
        let dir = TempDir::new().unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path()).unwrap());
        let registry = build_registry(
            Arc::new(MemoryStore::new()),
            sandbox,
            "https://nominatim.openstreetmap.org",
        );

        for name in [
            "query_database",
            "get_database_schema",
            "search_entities",
            "get_entity_details",
            "get_connections",
            "get_sales_stats",
            "create_entity",
            "update_entity",
            "create_connection",
            "create_sale",
            "create_note",
            "delete_entity",
            "delete_connection",
            "delete_sale",
            "geocode_address",
            "map_fly_to",
            "map_select_entity",
            "map_show_connections",
            "map_set_style",
            "ui_open_panel",
            "ui_show_notification",
            "read_file",
            "list_files",
            "write_file",
            "explore_code",
            "save_learning",
            "read_learnings",
            "propose_improvement",
        ] {
            assert!(registry.contains(name), "{name} missing");
        }
    }
}
