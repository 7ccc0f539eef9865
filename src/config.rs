use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOP_P};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;

/// Models offered in the picker when the config file does not override them
pub const DEFAULT_MODELS: &[&str] = &[
    "deepseek-r1-distill-qwen-32b",
    "deepseek-r1-distill-llama-70b-specdec",
    "deepseek-r1-distill-llama-70b",
    "gemma2-9b-it",
    "llama3-8b-8192",
    "llama-3.3-70b-versatile",
    "llama-3.1-8b-instant",
    "llama-guard-3-8b",
    "llama3-70b-8192",
    "mixtral-8x7b-32768",
    "qwen-2.5-coder-32b",
    "qwen-2.5-32b",
    "llama-3.2-11b-vision-preview",
    "llama-3.2-90b-vision-preview",
];

/// Main application configuration.
///
/// There is deliberately no API key field: keys come from the UI or the
/// environment at runtime and are never written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the OpenAI-compatible API, without `/chat/completions`
    pub base_url: String,

    /// Model selected at startup
    pub default_model: String,

    /// Models offered in the picker
    pub models: Vec<String>,

    /// Instruction that opens every conversation
    pub system_prompt: String,

    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,

    /// Environment variable consulted for the API key
    pub api_key_env: String,

    pub connect_timeout_secs: u64,

    /// Where tracing output goes while the terminal UI owns the screen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            default_model: DEFAULT_MODELS[0].to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key_env: "GROQ_API_KEY".to_string(),
            connect_timeout_secs: 30,
            log_file: None,
        }
    }
}

impl Config {
    /// `~/.groqchat/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".groqchat").join("config.toml"))
    }

    /// Load from an explicit path, or the default location; a missing file yields defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if !config_path.exists() {
            if path.is_some() {
                bail!("Config file {} does not exist", config_path.display());
            }
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            bail!("`models` must list at least one model");
        }
        if self.system_prompt.trim().is_empty() {
            bail!("`system_prompt` must not be empty");
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// API key from the configured environment variable, if set and non-empty
    pub fn api_key_from_env(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Index of the startup model in `models`, falling back to the first entry
    pub fn default_model_index(&self) -> usize {
        self.models
            .iter()
            .position(|m| m == &self.default_model)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_groq_endpoint_and_sampling() {
        let config = Config::default();
        assert_eq!(config.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.temperature, 0.6);
        assert_eq!(config.top_p, 1.0);
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.system_prompt, "You are a helpful assistant.");
        assert_eq!(config.models.len(), DEFAULT_MODELS.len());
        assert_eq!(config.default_model_index(), 0);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            default_model = "gemma2-9b-it"
            max_tokens = 256
            "#,
        )
        .unwrap();
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.default_model, "gemma2-9b-it");
        assert_eq!(config.default_model_index(), 3);
        assert_eq!(config.api_key_env, "GROQ_API_KEY");
    }

    #[test]
    fn unknown_default_model_falls_back_to_first() {
        let config = Config::from_toml(r#"default_model = "not-a-model""#).unwrap();
        assert_eq!(config.default_model_index(), 0);
    }

    #[test]
    fn rejects_empty_model_list() {
        assert!(Config::from_toml("models = []").is_err());
    }

    #[test]
    fn save_then_load_keeps_custom_values() {
        let dir = std::env::temp_dir().join(format!("groqchat-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let config = Config {
            base_url: "http://localhost:8080/v1".to_string(),
            models: vec!["local-model".to_string()],
            default_model: "local-model".to_string(),
            ..Config::default()
        };

        config.save(&path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.to_lowercase().contains("api_key ="));

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.base_url, "http://localhost:8080/v1");
        assert_eq!(loaded.models, vec!["local-model"]);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let path = std::env::temp_dir().join(format!("groqchat-missing-{}.toml", uuid::Uuid::new_v4()));
        assert!(Config::load(Some(&path)).is_err());
    }
}
