//! Persistent application settings.
//!
//! Settings are stored as JSON in the app data directory (or the file named by
//! `LANTERN_CONFIG`). Every field has a serde default so partial files work.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable that overrides the settings file location.
pub const CONFIG_ENV: &str = "LANTERN_CONFIG";

/// Application settings persisted to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Connection and decoding parameters for the Ollama model service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Lower temperature for more deliberate responses.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_num_ctx")]
    pub num_ctx: usize,
    #[serde(default = "default_num_predict")]
    pub num_predict: usize,
    /// Discourages the model from repeating the same action.
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "llama3.2".into()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_num_ctx() -> usize {
    4096
}
fn default_num_predict() -> usize {
    1024
}
fn default_repeat_penalty() -> f64 {
    1.1
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_ping_timeout_secs() -> u64 {
    3
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            num_ctx: default_num_ctx(),
            num_predict: default_num_predict(),
            repeat_penalty: default_repeat_penalty(),
            request_timeout_secs: default_request_timeout_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
        }
    }
}

/// Agent loop limits and per-tool budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum ReAct iterations before the run is truncated.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Wall-clock budget for one run, checked between iterations.
    #[serde(default = "default_max_wall_time_secs")]
    pub max_wall_time_secs: u64,
    #[serde(default = "default_search_budget")]
    pub search_budget: usize,
    #[serde(default = "default_calculator_budget")]
    pub calculator_budget: usize,
    #[serde(default = "default_document_budget")]
    pub document_budget: usize,
    /// The shell tool is only registered when explicitly enabled.
    #[serde(default)]
    pub shell_enabled: bool,
    #[serde(default = "default_shell_budget")]
    pub shell_budget: usize,
    #[serde(default = "default_shell_timeout_secs")]
    pub shell_timeout_secs: u64,
}

fn default_max_iterations() -> usize {
    5
}
fn default_max_wall_time_secs() -> u64 {
    300
}
fn default_search_budget() -> usize {
    3
}
fn default_calculator_budget() -> usize {
    5
}
fn default_document_budget() -> usize {
    3
}
fn default_shell_budget() -> usize {
    2
}
fn default_shell_timeout_secs() -> u64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_wall_time_secs: default_max_wall_time_secs(),
            search_budget: default_search_budget(),
            calculator_budget: default_calculator_budget(),
            document_budget: default_document_budget(),
            shell_enabled: false,
            shell_budget: default_shell_budget(),
            shell_timeout_secs: default_shell_timeout_secs(),
        }
    }
}

impl AgentConfig {
    pub fn max_wall_time(&self) -> Duration {
        Duration::from_secs(self.max_wall_time_secs)
    }

    pub fn shell_timeout(&self) -> Duration {
        Duration::from_secs(self.shell_timeout_secs)
    }
}

/// Intent routing between the agent and the plain conversation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Case-insensitive substrings that mark an input as tool-seeking.
    #[serde(default = "default_tool_keywords")]
    pub tool_keywords: Vec<String>,
    /// Whether agent answers are appended to conversation memory too.
    #[serde(default)]
    pub record_tool_turns: bool,
}

fn default_tool_keywords() -> Vec<String> {
    vec!["search".into(), "find".into(), "look up".into()]
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            tool_keywords: default_tool_keywords(),
            record_tool_turns: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Get the app data directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lantern")
}

/// Resolve the settings file: `LANTERN_CONFIG` if set, else the data dir.
pub fn settings_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| app_data_dir().join("settings.json"))
}

impl Settings {
    /// Load settings from a JSON file. Returns defaults if file doesn't exist.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse settings file: {}, using defaults", e);
                Self::default()
            }),
            Err(_) => {
                tracing::info!("No settings file found at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Save settings to a JSON file.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.model.model, "llama3.2");
        assert_eq!(settings.model.num_ctx, 4096);
        assert_eq!(settings.agent.max_iterations, 5);
        assert_eq!(settings.agent.search_budget, 3);
        assert!(!settings.agent.shell_enabled);
        assert_eq!(settings.router.tool_keywords, vec!["search", "find", "look up"]);
        assert!(!settings.router.record_tool_turns);
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"agent": {"max_iterations": 8}}"#).unwrap();
        assert_eq!(settings.agent.max_iterations, 8);
        assert_eq!(settings.agent.search_budget, 3);
        assert_eq!(settings.model.temperature, 0.2);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = std::env::temp_dir().join("lantern_test_settings.json");
        let mut settings = Settings::default();
        settings.router.tool_keywords = vec!["lookup".into()];
        settings.save(&tmp).unwrap();

        let loaded = Settings::load(&tmp);
        assert_eq!(loaded.router.tool_keywords, vec!["lookup"]);

        let _ = std::fs::remove_file(&tmp);
    }

    #[test]
    fn test_load_missing_file() {
        let settings = Settings::load(&PathBuf::from("/nonexistent/settings.json"));
        assert_eq!(settings.agent.max_iterations, 5);
    }
}
