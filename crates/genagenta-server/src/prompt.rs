//! System prompt assembly
//!
//! The base prompt comes from a template file (or a built-in default) with
//! `{{placeholder}}` substitution, then gets the request's UI context
//! appended so the model knows what the user is looking at.

use genagenta_agent::Caller;
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_TEMPLATE: &str = "\
You are the GenAgenTa assistant, helping {{user_nome}} manage their CRM: \
business contacts and relationships shown as a graph on a 3D map. You can \
query and modify entities, connections, sales, and notes through tools, \
geocode addresses, and control the map. Always answer in the user's \
language. When you change data, confirm exactly what changed. Prefer one \
precise tool call over several speculative ones.";

/// The slice of frontend state forwarded with a chat request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiContext {
    pub selected_entity: Option<Value>,
}

/// Substitute `{{key}}` placeholders from the caller's identity.
fn substitute(template: &str, caller: &Caller) -> String {
    template
        .replace("{{user_nome}}", &caller.display_name)
        .replace("{{user_id}}", &caller.user_id)
}

/// Build the full system prompt for one request.
pub fn render(template: &str, caller: &Caller, ui: &UiContext) -> String {
    let mut prompt = substitute(template, caller);
    if let Some(selected) = &ui.selected_entity {
        let rendered =
            serde_json::to_string(selected).unwrap_or_else(|_| "unavailable".to_string());
        prompt.push_str("\n\nThe user currently has this entity selected on the map: ");
        prompt.push_str(&rendered);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caller() -> Caller {
        Caller::new("u1", "t1", "Mario")
    }

    #[test]
    fn test_placeholder_substitution() {
        let prompt = render("Ciao {{user_nome}}!", &caller(), &UiContext::default());
        assert_eq!(prompt, "Ciao Mario!");
    }

    #[test]
    fn test_default_template_mentions_user() {
        let prompt = render(DEFAULT_TEMPLATE, &caller(), &UiContext::default());
        assert!(prompt.contains("Mario"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_selected_entity_is_injected() {
        let ui = UiContext {
            selected_entity: Some(json!({"id": "e1", "name": "Rossi Srl"})),
        };
        let prompt = render(DEFAULT_TEMPLATE, &caller(), &ui);
        assert!(prompt.contains("Rossi Srl"));
        assert!(prompt.contains("selected on the map"));
    }
}
