//! `relaygraph.toml` configuration.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! usable offline configuration: echo completion, file checkpoints under
//! `.relaygraph/checkpoints`, JSON logs at `info`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub logging: LoggingConfig,
    pub executor: ExecutorSettings,
    pub checkpoint: CheckpointConfig,
    pub completion: CompletionConfig,
    pub workers: Vec<WorkerConfig>,
    pub analysis: AnalysisConfig,
    pub assistant: AssistantConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::new(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::load_from_toml(&content)
    }

    /// Load configuration from a TOML string.
    pub fn load_from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_content)
            .map_err(|e| ConfigError::new(format!("failed to parse TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.max_steps == 0 {
            return Err(ConfigError::new("executor.max_steps must be at least 1"));
        }
        if self.checkpoint.backend != CheckpointBackend::Memory
            && self.checkpoint.path.as_os_str().is_empty()
        {
            return Err(ConfigError::new(
                "checkpoint.path is required for file and sqlite backends",
            ));
        }
        if self.completion.timeout_secs == 0 {
            return Err(ConfigError::new("completion.timeout_secs must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(ConfigError::new("completion.temperature must be within 0.0..=2.0"));
        }
        if self.assistant.top_k == 0 {
            return Err(ConfigError::new("assistant.top_k must be at least 1"));
        }
        let mut seen = std::collections::BTreeSet::new();
        for worker in &self.workers {
            if worker.name.trim().is_empty() {
                return Err(ConfigError::new("workers.name cannot be empty"));
            }
            if worker.command.trim().is_empty() {
                return Err(ConfigError::new(format!(
                    "workers.command cannot be empty (worker '{}')",
                    worker.name
                )));
            }
            if !seen.insert(worker.name.as_str()) {
                return Err(ConfigError::new(format!(
                    "workers.name '{}' is declared twice",
                    worker.name
                )));
            }
        }
        Ok(())
    }

    pub fn worker(&self, name: &str) -> Option<&WorkerConfig> {
        self.workers.iter().find(|w| w.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Upper bound on node executions per run.
    pub max_steps: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self { max_steps: 25 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    Memory,
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    /// Directory for `file`, database file for `sqlite`.
    pub path: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::File,
            path: PathBuf::from(".relaygraph/checkpoints"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    #[default]
    Echo,
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub provider: CompletionProvider,
    /// Base URL of an OpenAI-compatible API.
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: CompletionProvider::Echo,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

/// A tool server process managed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_worker_timeout")]
    pub timeout_secs: u64,
}

fn default_worker_timeout() -> u64 {
    30
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout_secs: default_worker_timeout(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// SQLite database holding the `quarterly_sales` table.
    pub database: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("sales.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Plain-text manual searched by the assistant flow.
    pub manual: PathBuf,
    pub top_k: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            manual: PathBuf::from("manual.txt"),
            top_k: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RelayConfig::load_from_toml("").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.executor.max_steps, 25);
        assert_eq!(config.checkpoint.backend, CheckpointBackend::File);
        assert_eq!(config.completion.provider, CompletionProvider::Echo);
    }

    #[test]
    fn test_full_config() {
        let config = RelayConfig::load_from_toml(
            r#"
            [logging]
            level = "relaygraph=debug"
            format = "text"

            [checkpoint]
            backend = "sqlite"
            path = "agent_checkpoint.sqlite"

            [completion]
            provider = "openai"
            temperature = 0.6
            max_retries = 5

            [[workers]]
            name = "market-research"
            command = "relaygraph"
            args = ["serve", "market-research"]

            [[workers]]
            name = "report-writing"
            command = "relaygraph"
            args = ["serve", "report-writing"]
            timeout_secs = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.checkpoint.backend, CheckpointBackend::Sqlite);
        assert_eq!(config.completion.provider, CompletionProvider::OpenAi);
        assert_eq!(config.completion.max_retries, 5);
        assert_eq!(config.completion.model, "gpt-4o-mini");
        assert_eq!(config.workers.len(), 2);
        assert_eq!(config.worker("market-research").unwrap().timeout_secs, 30);
        assert_eq!(
            config.worker("report-writing").unwrap().timeout(),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_validation_errors() {
        let err = RelayConfig::load_from_toml("[executor]\nmax_steps = 0").unwrap_err();
        assert!(err.message.contains("max_steps"));

        let err = RelayConfig::load_from_toml(
            "[[workers]]\nname = \"a\"\ncommand = \"x\"\n[[workers]]\nname = \"a\"\ncommand = \"y\"",
        )
        .unwrap_err();
        assert!(err.message.contains("declared twice"));

        let err = RelayConfig::load_from_toml("[completion]\nprovider = \"mystery\"").unwrap_err();
        assert!(err.message.contains("failed to parse"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[assistant]\ntop_k = 4").unwrap();
        let config = RelayConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.assistant.top_k, 4);

        assert!(RelayConfig::load_from_file("/definitely/not/here.toml").is_err());
    }
}
