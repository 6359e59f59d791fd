//! CRM backing store
//!
//! The agent's tools read and write through the `CrmStore` trait; the server
//! ships an in-memory implementation. Every operation is tenant-scoped and
//! writes stamp the acting identity as creator. No transaction spans more
//! than one call: a multi-tool turn that partially fails leaves partial
//! state, and the model sees each result independently.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use genagenta_agent::Caller;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Row cap for read queries; hitting it sets `truncated` on the result.
pub const MAX_QUERY_ROWS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A business contact ("neuron" in the product's graph vocabulary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    pub tenant_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A relationship edge between two entities ("synapse").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub connection_type: String,
    pub tenant_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    pub entity_id: String,
    pub amount: f64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tenant_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub entity_id: String,
    pub text: String,
    pub tenant_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when creating or updating an entity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityPatch {
    pub name: Option<String>,
    pub entity_type: Option<String>,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Aggregate totals for `get_sales_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct SalesStats {
    pub total_count: usize,
    pub total_amount: f64,
    pub by_status: HashMap<String, StatusStats>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusStats {
    pub count: usize,
    pub amount: f64,
}

/// Result of a read-only query, bounded by `MAX_QUERY_ROWS`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRows {
    pub rows: Vec<Value>,
    pub truncated: bool,
}

/// Tenant-scoped CRM operations the tools are written against.
///
/// Sync on purpose: the in-memory store never blocks, and a database-backed
/// implementation would wrap its own pool.
pub trait CrmStore: Send + Sync {
    fn create_entity(&self, caller: &Caller, patch: EntityPatch) -> StoreResult<Entity>;
    fn update_entity(&self, caller: &Caller, id: &str, patch: EntityPatch) -> StoreResult<Entity>;
    fn delete_entity(&self, caller: &Caller, id: &str) -> StoreResult<()>;
    fn get_entity(&self, caller: &Caller, id: &str) -> StoreResult<Entity>;
    fn search_entities(&self, caller: &Caller, query: &str, limit: usize) -> Vec<Entity>;

    fn create_connection(
        &self,
        caller: &Caller,
        from_id: &str,
        to_id: &str,
        connection_type: &str,
    ) -> StoreResult<Connection>;
    fn delete_connection(&self, caller: &Caller, id: &str) -> StoreResult<()>;
    fn connections_for(&self, caller: &Caller, entity_id: &str) -> Vec<Connection>;

    fn create_sale(
        &self,
        caller: &Caller,
        entity_id: &str,
        amount: f64,
        status: &str,
        description: Option<String>,
    ) -> StoreResult<Sale>;
    fn delete_sale(&self, caller: &Caller, id: &str) -> StoreResult<()>;
    fn sales_stats(&self, caller: &Caller) -> SalesStats;

    fn create_note(&self, caller: &Caller, entity_id: &str, text: &str) -> StoreResult<Note>;
    fn notes_for(&self, caller: &Caller, entity_id: &str) -> Vec<Note>;

    /// Table and column listing for `get_database_schema`.
    fn schema(&self) -> Value;

    /// Execute an already-validated read-only query. The SQL safety check
    /// happens in the tool layer before this is reached; the store only has
    /// to answer what it understands.
    fn run_query(&self, caller: &Caller, sql: &str) -> StoreResult<QueryRows>;
}

#[derive(Default)]
struct Tables {
    entities: Vec<Entity>,
    connections: Vec<Connection>,
    sales: Vec<Sale>,
    notes: Vec<Note>,
}

/// In-memory `CrmStore`, one `RwLock` over all tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

impl CrmStore for MemoryStore {
    fn create_entity(&self, caller: &Caller, patch: EntityPatch) -> StoreResult<Entity> {
        let name = patch
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| StoreError::Invalid("entity name is required".to_string()))?;
        let entity = Entity {
            id: Self::new_id(),
            name,
            entity_type: patch.entity_type.unwrap_or_else(|| "contact".to_string()),
            address: patch.address,
            lat: patch.lat,
            lng: patch.lng,
            tenant_id: caller.tenant_id.clone(),
            created_by: caller.user_id.clone(),
            created_at: Utc::now(),
        };
        self.tables.write().entities.push(entity.clone());
        Ok(entity)
    }

    fn update_entity(&self, caller: &Caller, id: &str, patch: EntityPatch) -> StoreResult<Entity> {
        let mut tables = self.tables.write();
        let entity = tables
            .entities
            .iter_mut()
            .find(|e| e.id == id && e.tenant_id == caller.tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))?;
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(StoreError::Invalid("entity name cannot be empty".to_string()));
            }
            entity.name = name;
        }
        if let Some(t) = patch.entity_type {
            entity.entity_type = t;
        }
        if patch.address.is_some() {
            entity.address = patch.address;
        }
        if patch.lat.is_some() {
            entity.lat = patch.lat;
        }
        if patch.lng.is_some() {
            entity.lng = patch.lng;
        }
        Ok(entity.clone())
    }

    fn delete_entity(&self, caller: &Caller, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let before = tables.entities.len();
        tables
            .entities
            .retain(|e| !(e.id == id && e.tenant_id == caller.tenant_id));
        if tables.entities.len() == before {
            return Err(StoreError::NotFound(format!("entity {}", id)));
        }
        // Edges referencing a deleted entity go with it.
        tables
            .connections
            .retain(|c| c.from_id != id && c.to_id != id);
        Ok(())
    }

    fn get_entity(&self, caller: &Caller, id: &str) -> StoreResult<Entity> {
        self.tables
            .read()
            .entities
            .iter()
            .find(|e| e.id == id && e.tenant_id == caller.tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("entity {}", id)))
    }

    fn search_entities(&self, caller: &Caller, query: &str, limit: usize) -> Vec<Entity> {
        let needle = query.to_lowercase();
        self.tables
            .read()
            .entities
            .iter()
            .filter(|e| e.tenant_id == caller.tenant_id)
            .filter(|e| {
                needle.is_empty()
                    || e.name.to_lowercase().contains(&needle)
                    || e.entity_type.to_lowercase().contains(&needle)
                    || e.address
                        .as_deref()
                        .is_some_and(|a| a.to_lowercase().contains(&needle))
            })
            .take(limit)
            .cloned()
            .collect()
    }

    fn create_connection(
        &self,
        caller: &Caller,
        from_id: &str,
        to_id: &str,
        connection_type: &str,
    ) -> StoreResult<Connection> {
        if from_id == to_id {
            return Err(StoreError::Invalid(
                "a connection cannot link an entity to itself".to_string(),
            ));
        }
        let mut tables = self.tables.write();
        let exists = |id: &str| {
            tables
                .entities
                .iter()
                .any(|e| e.id == id && e.tenant_id == caller.tenant_id)
        };
        if !exists(from_id) {
            return Err(StoreError::NotFound(format!("entity {}", from_id)));
        }
        if !exists(to_id) {
            return Err(StoreError::NotFound(format!("entity {}", to_id)));
        }
        // Duplicate edges are rejected in either direction.
        let duplicate = tables.connections.iter().any(|c| {
            c.tenant_id == caller.tenant_id
                && ((c.from_id == from_id && c.to_id == to_id)
                    || (c.from_id == to_id && c.to_id == from_id))
        });
        if duplicate {
            return Err(StoreError::Invalid(
                "a connection between these entities already exists".to_string(),
            ));
        }
        let connection = Connection {
            id: Self::new_id(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            connection_type: connection_type.to_string(),
            tenant_id: caller.tenant_id.clone(),
            created_by: caller.user_id.clone(),
            created_at: Utc::now(),
        };
        tables.connections.push(connection.clone());
        Ok(connection)
    }

    fn delete_connection(&self, caller: &Caller, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let before = tables.connections.len();
        tables
            .connections
            .retain(|c| !(c.id == id && c.tenant_id == caller.tenant_id));
        if tables.connections.len() == before {
            return Err(StoreError::NotFound(format!("connection {}", id)));
        }
        Ok(())
    }

    fn connections_for(&self, caller: &Caller, entity_id: &str) -> Vec<Connection> {
        self.tables
            .read()
            .connections
            .iter()
            .filter(|c| c.tenant_id == caller.tenant_id)
            .filter(|c| c.from_id == entity_id || c.to_id == entity_id)
            .cloned()
            .collect()
    }

    fn create_sale(
        &self,
        caller: &Caller,
        entity_id: &str,
        amount: f64,
        status: &str,
        description: Option<String>,
    ) -> StoreResult<Sale> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(StoreError::Invalid(
                "sale amount must be a non-negative number".to_string(),
            ));
        }
        let mut tables = self.tables.write();
        if !tables
            .entities
            .iter()
            .any(|e| e.id == entity_id && e.tenant_id == caller.tenant_id)
        {
            return Err(StoreError::NotFound(format!("entity {}", entity_id)));
        }
        let sale = Sale {
            id: Self::new_id(),
            entity_id: entity_id.to_string(),
            amount,
            status: status.to_string(),
            description,
            tenant_id: caller.tenant_id.clone(),
            created_by: caller.user_id.clone(),
            created_at: Utc::now(),
        };
        tables.sales.push(sale.clone());
        Ok(sale)
    }

    fn delete_sale(&self, caller: &Caller, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let before = tables.sales.len();
        tables
            .sales
            .retain(|s| !(s.id == id && s.tenant_id == caller.tenant_id));
        if tables.sales.len() == before {
            return Err(StoreError::NotFound(format!("sale {}", id)));
        }
        Ok(())
    }

    fn sales_stats(&self, caller: &Caller) -> SalesStats {
        let tables = self.tables.read();
        let mut stats = SalesStats {
            total_count: 0,
            total_amount: 0.0,
            by_status: HashMap::new(),
        };
        for sale in tables.sales.iter().filter(|s| s.tenant_id == caller.tenant_id) {
            stats.total_count += 1;
            stats.total_amount += sale.amount;
            let entry = stats.by_status.entry(sale.status.clone()).or_default();
            entry.count += 1;
            entry.amount += sale.amount;
        }
        stats
    }

    fn create_note(&self, caller: &Caller, entity_id: &str, text: &str) -> StoreResult<Note> {
        if text.trim().is_empty() {
            return Err(StoreError::Invalid("note text is required".to_string()));
        }
        let mut tables = self.tables.write();
        if !tables
            .entities
            .iter()
            .any(|e| e.id == entity_id && e.tenant_id == caller.tenant_id)
        {
            return Err(StoreError::NotFound(format!("entity {}", entity_id)));
        }
        let note = Note {
            id: Self::new_id(),
            entity_id: entity_id.to_string(),
            text: text.to_string(),
            tenant_id: caller.tenant_id.clone(),
            created_by: caller.user_id.clone(),
            created_at: Utc::now(),
        };
        tables.notes.push(note.clone());
        Ok(note)
    }

    fn notes_for(&self, caller: &Caller, entity_id: &str) -> Vec<Note> {
        self.tables
            .read()
            .notes
            .iter()
            .filter(|n| n.tenant_id == caller.tenant_id && n.entity_id == entity_id)
            .cloned()
            .collect()
    }

    fn schema(&self) -> Value {
        json!({
            "tables": [
                {
                    "name": "entities",
                    "columns": ["id", "name", "entity_type", "address", "lat", "lng",
                                "tenant_id", "created_by", "created_at"]
                },
                {
                    "name": "connections",
                    "columns": ["id", "from_id", "to_id", "connection_type",
                                "tenant_id", "created_by", "created_at"]
                },
                {
                    "name": "sales",
                    "columns": ["id", "entity_id", "amount", "status", "description",
                                "tenant_id", "created_by", "created_at"]
                },
                {
                    "name": "notes",
                    "columns": ["id", "entity_id", "text",
                                "tenant_id", "created_by", "created_at"]
                }
            ]
        })
    }

    fn run_query(&self, caller: &Caller, sql: &str) -> StoreResult<QueryRows> {
        // The in-memory store understands full-table reads only; anything
        // richer needs the database-backed store.
        let table = parse_select_table(sql).ok_or_else(|| {
            StoreError::UnsupportedQuery(
                "the in-memory store only supports `SELECT * FROM <table>`".to_string(),
            )
        })?;

        let tables = self.tables.read();
        let all: Vec<Value> = match table.as_str() {
            "entities" => tables
                .entities
                .iter()
                .filter(|e| e.tenant_id == caller.tenant_id)
                .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
                .collect(),
            "connections" => tables
                .connections
                .iter()
                .filter(|c| c.tenant_id == caller.tenant_id)
                .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
                .collect(),
            "sales" => tables
                .sales
                .iter()
                .filter(|s| s.tenant_id == caller.tenant_id)
                .map(|s| serde_json::to_value(s).unwrap_or(Value::Null))
                .collect(),
            "notes" => tables
                .notes
                .iter()
                .filter(|n| n.tenant_id == caller.tenant_id)
                .map(|n| serde_json::to_value(n).unwrap_or(Value::Null))
                .collect(),
            other => {
                return Err(StoreError::UnsupportedQuery(format!(
                    "unknown table: {}",
                    other
                )))
            }
        };

        let truncated = all.len() > MAX_QUERY_ROWS;
        let rows = all.into_iter().take(MAX_QUERY_ROWS).collect();
        Ok(QueryRows { rows, truncated })
    }
}

/// Accepts `SELECT * FROM <table>` with an optional trailing semicolon.
fn parse_select_table(sql: &str) -> Option<String> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    match tokens.as_slice() {
        [sel, star, from, table]
            if sel.eq_ignore_ascii_case("select")
                && *star == "*"
                && from.eq_ignore_ascii_case("from") =>
        {
            Some(table.to_lowercase())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller() -> Caller {
        Caller::new("u1", "t1", "Mario")
    }

    fn other_tenant() -> Caller {
        Caller::new("u2", "t2", "Luigi")
    }

    fn named(name: &str) -> EntityPatch {
        EntityPatch {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_and_get_entity() {
        let store = MemoryStore::new();
        let e = store.create_entity(&caller(), named("ACME")).unwrap();
        assert_eq!(e.created_by, "u1");
        assert_eq!(e.tenant_id, "t1");
        assert_eq!(store.get_entity(&caller(), &e.id).unwrap().name, "ACME");
    }

    #[test]
    fn test_entity_requires_name() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.create_entity(&caller(), EntityPatch::default()),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_tenant_isolation() {
        let store = MemoryStore::new();
        let e = store.create_entity(&caller(), named("Secret Corp")).unwrap();
        assert!(store.get_entity(&other_tenant(), &e.id).is_err());
        assert!(store.search_entities(&other_tenant(), "secret", 10).is_empty());
        assert_eq!(store.search_entities(&caller(), "secret", 10).len(), 1);
    }

    #[test]
    fn test_connection_rejects_self_loop() {
        let store = MemoryStore::new();
        let e = store.create_entity(&caller(), named("A")).unwrap();
        assert!(matches!(
            store.create_connection(&caller(), &e.id, &e.id, "partner"),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_connection_rejects_duplicate_either_direction() {
        let store = MemoryStore::new();
        let a = store.create_entity(&caller(), named("A")).unwrap();
        let b = store.create_entity(&caller(), named("B")).unwrap();
        store
            .create_connection(&caller(), &a.id, &b.id, "partner")
            .unwrap();
        assert!(store
            .create_connection(&caller(), &a.id, &b.id, "partner")
            .is_err());
        // Reversed direction is the same edge.
        assert!(store
            .create_connection(&caller(), &b.id, &a.id, "supplier")
            .is_err());
    }

    #[test]
    fn test_delete_entity_cascades_connections() {
        let store = MemoryStore::new();
        let a = store.create_entity(&caller(), named("A")).unwrap();
        let b = store.create_entity(&caller(), named("B")).unwrap();
        store
            .create_connection(&caller(), &a.id, &b.id, "partner")
            .unwrap();
        store.delete_entity(&caller(), &a.id).unwrap();
        assert!(store.connections_for(&caller(), &b.id).is_empty());
    }

    #[test]
    fn test_sales_stats() {
        let store = MemoryStore::new();
        let e = store.create_entity(&caller(), named("A")).unwrap();
        store
            .create_sale(&caller(), &e.id, 100.0, "won", None)
            .unwrap();
        store
            .create_sale(&caller(), &e.id, 50.0, "won", None)
            .unwrap();
        store
            .create_sale(&caller(), &e.id, 30.0, "open", None)
            .unwrap();

        let stats = store.sales_stats(&caller());
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.total_amount, 180.0);
        assert_eq!(stats.by_status["won"].count, 2);
        assert_eq!(stats.by_status["won"].amount, 150.0);
    }

    #[test]
    fn test_run_query_caps_rows() {
        let store = MemoryStore::new();
        for i in 0..(MAX_QUERY_ROWS + 20) {
            store
                .create_entity(&caller(), named(&format!("e{i}")))
                .unwrap();
        }
        let result = store
            .run_query(&caller(), "SELECT * FROM entities")
            .unwrap();
        assert_eq!(result.rows.len(), MAX_QUERY_ROWS);
        assert!(result.truncated);
    }

    #[test]
    fn test_run_query_rejects_unparseable() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.run_query(&caller(), "SELECT name FROM entities WHERE x=1"),
            Err(StoreError::UnsupportedQuery(_))
        ));
    }

    #[test]
    fn test_parse_select_table() {
        assert_eq!(
            parse_select_table("select * from Sales;"),
            Some("sales".to_string())
        );
        assert_eq!(parse_select_table("DELETE FROM sales"), None);
    }
}
