//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use genagenta_ai::ProviderKind;

/// Server configuration, loaded from TOML with env-var fallbacks for keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// LLM provider: "openai" or "google"
    pub provider: String,
    /// Model identifier for the chosen provider
    pub model: String,
    /// Override the provider's API base URL (testing, proxies)
    pub base_url: Option<String>,
    /// System prompt template file; a built-in default is used when unset
    pub system_prompt_file: Option<String>,
    /// Root of the assistant's file sandbox
    pub sandbox_dir: Option<String>,
    /// Geocoding service base URL
    pub geocode_base_url: String,
    /// API keys (alternative to environment variables)
    #[serde(default)]
    pub api_keys: ApiKeys,
    /// Agent loop tuning; unset fields keep the built-in defaults
    #[serde(default)]
    pub agent: AgentTuning,
    /// Context management tuning; unset fields keep the built-in defaults
    #[serde(default)]
    pub context: ContextTuning,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentTuning {
    pub max_iterations: Option<u32>,
    pub max_total_tool_calls: Option<u32>,
    pub per_tool_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextTuning {
    pub max_message_chars: Option<usize>,
    pub max_history_messages: Option<usize>,
    pub compaction_threshold: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub google: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            system_prompt_file: None,
            sandbox_dir: None,
            geocode_base_url: crate::tools::GEOCODE_DEFAULT_BASE_URL.to_string(),
            api_keys: ApiKeys::default(),
            agent: AgentTuning::default(),
            context: ContextTuning::default(),
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("genagenta")
    }

    /// Get the config file path, honoring GENAGENTA_CONFIG_PATH
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("GENAGENTA_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file, falling back to defaults on any problem
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn provider_kind(&self) -> anyhow::Result<ProviderKind> {
        match self.provider.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "google" | "gemini" => Ok(ProviderKind::Google),
            other => anyhow::bail!("unknown provider: {}", other),
        }
    }

    /// API key for the configured provider, config first, then environment.
    pub fn api_key(&self, kind: ProviderKind) -> anyhow::Result<String> {
        let from_config = match kind {
            ProviderKind::OpenAI => self.api_keys.openai.clone(),
            ProviderKind::Google => self.api_keys.google.clone(),
        };
        if let Some(key) = from_config {
            return Ok(key);
        }
        std::env::var(kind.api_key_env_var()).map_err(|_| {
            anyhow::anyhow!(
                "no API key for {}: set it in the config file or via {}",
                kind.name(),
                kind.api_key_env_var()
            )
        })
    }

    /// Agent loop policy, with TOML overrides applied over the defaults.
    pub fn agent_config(&self) -> genagenta_agent::AgentConfig {
        let mut config = genagenta_agent::AgentConfig::default();
        if let Some(v) = self.agent.max_iterations {
            config.max_iterations = v;
        }
        if let Some(v) = self.agent.max_total_tool_calls {
            config.max_total_tool_calls = v;
        }
        if let Some(v) = self.agent.per_tool_limit {
            config.per_tool_limit = v;
        }
        config
    }

    /// Context policy, with TOML overrides applied over the defaults.
    pub fn context_config(&self) -> genagenta_agent::ContextConfig {
        let mut config = genagenta_agent::ContextConfig::default();
        if let Some(v) = self.context.max_message_chars {
            config.max_message_chars = v;
        }
        if let Some(v) = self.context.max_history_messages {
            config.max_history_messages = v;
        }
        if let Some(v) = self.context.compaction_threshold {
            config.compaction_threshold = v;
        }
        config
    }

    /// System prompt template text, from file when configured.
    pub fn prompt_template(&self) -> String {
        if let Some(path) = &self.system_prompt_file {
            match fs::read_to_string(path) {
                Ok(text) => return text,
                Err(e) => tracing::warn!("failed to read prompt template {}: {}", path, e),
            }
        }
        crate::prompt::DEFAULT_TEMPLATE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_text = r#"
            bind_addr = "0.0.0.0:9000"
            provider = "google"
            model = "gemini-2.0-flash"

            [api_keys]
            google = "test-key"
        "#;
        let config: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert!(matches!(
            config.provider_kind().unwrap(),
            ProviderKind::Google
        ));
        assert_eq!(
            config.api_key(ProviderKind::Google).unwrap(),
            "test-key"
        );
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: Config = toml::from_str("provider = \"openai\"").unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert!(config.system_prompt_file.is_none());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = Config {
            provider: "anthropic".to_string(),
            ..Default::default()
        };
        assert!(config.provider_kind().is_err());
    }

    #[test]
    fn test_tuning_overrides_apply() {
        let toml_text = r#"
            [agent]
            max_iterations = 8

            [context]
            compaction_threshold = 40
        "#;
        let config: Config = toml::from_str(toml_text).unwrap();
        let agent = config.agent_config();
        assert_eq!(agent.max_iterations, 8);
        assert_eq!(agent.per_tool_limit, 3);
        assert_eq!(config.context_config().compaction_threshold, 40);
    }

    #[test]
    fn test_prompt_template_defaults_when_unset() {
        let config = Config::default();
        assert!(config.prompt_template().contains("{{user_nome}}"));
    }
}
