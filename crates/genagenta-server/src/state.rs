//! Shared application state

use std::sync::Arc;

use genagenta_agent::Agent;

/// Everything a request handler needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub prompt_template: Arc<String>,
}

impl AppState {
    pub fn new(agent: Agent, prompt_template: String) -> Self {
        Self {
            agent: Arc::new(agent),
            prompt_template: Arc::new(prompt_template),
        }
    }
}
