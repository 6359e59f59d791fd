//! Final response assembly

use serde::{Deserialize, Serialize};

use crate::tool::FrontendAction;

/// Context bookkeeping returned to the caller.
///
/// The server does not own long-term conversation storage; when compaction
/// ran, the summary is handed back here so the client can persist continuity
/// over its own stored history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMeta {
    pub messages_count: usize,
    pub did_compaction: bool,
    pub compaction_threshold: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction_summary: Option<String>,
}

/// Everything one agent run produces.
///
/// `frontend_actions` are in tool finish order, never deduplicated.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    pub final_text: String,
    pub iterations: u32,
    pub frontend_actions: Vec<FrontendAction>,
    pub context: ContextMeta,
}
