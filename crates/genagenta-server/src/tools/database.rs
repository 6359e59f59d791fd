//! Database read tools
//!
//! `query_database` is the only tool that accepts raw SQL, so it carries its
//! own defense-in-depth check: the statement must start with SELECT and must
//! not contain any mutating keyword anywhere, comments included. The check
//! runs before the store ever sees the text.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use genagenta_agent::{Caller, Tool, ToolResult};
use regex::Regex;
use serde_json::json;

use crate::store::CrmStore;

static MUTATING_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(insert|update|delete|drop|create|alter|truncate|grant|revoke)\b")
        .expect("keyword regex is valid")
});

/// Reject anything that is not a single read-only statement.
///
/// Comments are stripped first so `select/*DROP*/...` cannot smuggle a
/// keyword past a naive scan, and the scan itself still runs on the raw
/// text afterwards.
fn validate_read_only(sql: &str) -> Result<(), String> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err("query is empty".to_string());
    }
    let head: String = trimmed.chars().take(6).collect();
    if !head.eq_ignore_ascii_case("select") {
        return Err("only SELECT statements are allowed".to_string());
    }
    // A second statement after a semicolon is a mutation vector.
    if trimmed.trim_end_matches(';').contains(';') {
        return Err("multiple statements are not allowed".to_string());
    }
    let without_comments = strip_sql_comments(trimmed);
    if MUTATING_KEYWORDS.is_match(trimmed) || MUTATING_KEYWORDS.is_match(&without_comments) {
        return Err("statement contains a mutating keyword".to_string());
    }
    Ok(())
}

fn strip_sql_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    break;
                }
            }
            out.push(' ');
        } else if c == '-' && chars.peek() == Some(&'-') {
            for c in chars.by_ref() {
                if c == '\n' {
                    break;
                }
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

/// Read-only SQL against the CRM store.
pub struct QueryDatabaseTool {
    store: Arc<dyn CrmStore>,
}

impl QueryDatabaseTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for QueryDatabaseTool {
    fn name(&self) -> &str {
        "query_database"
    }

    fn description(&self) -> &str {
        "Run a read-only SQL query against the CRM database. Only single SELECT statements are accepted. Use get_database_schema first to see available tables."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "sql": {
                    "type": "string",
                    "description": "A single SELECT statement"
                }
            },
            "required": ["sql"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, caller: &Caller) -> ToolResult {
        let sql = match arguments.get("sql").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("Missing 'sql' argument"),
        };

        if let Err(reason) = validate_read_only(sql) {
            tracing::warn!(user = %caller.user_id, %reason, "rejected query");
            return ToolResult::error(format!("Forbidden operation: {}", reason));
        }

        match self.store.run_query(caller, sql) {
            Ok(result) => ToolResult::ok(json!({
                "data": result.rows,
                "row_count": result.rows.len(),
                "truncated": result.truncated,
            })),
            Err(e) => ToolResult::error(format!("Query failed: {}", e)),
        }
    }
}

/// Table and column listing.
pub struct GetSchemaTool {
    store: Arc<dyn CrmStore>,
}

impl GetSchemaTool {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetSchemaTool {
    fn name(&self) -> &str {
        "get_database_schema"
    }

    fn description(&self) -> &str {
        "List the CRM database tables and their columns."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value, _caller: &Caller) -> ToolResult {
        ToolResult::ok(self.store.schema())
    }
}
