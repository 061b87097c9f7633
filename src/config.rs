//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.finderqa.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".finderqa.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Language model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Dataset settings.
    #[serde(default)]
    pub data: DataConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Resolve intents and phrase answers locally, without a language model.
    #[serde(default)]
    pub offline: bool,
}

/// Which text-completion API to talk to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Local Ollama server (`/api/chat`)
    #[default]
    Ollama,
    /// OpenAI-compatible `/chat/completions` endpoint
    Openai,
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Ollama => "llama3.2:latest",
            Provider::Openai => "gpt-4o-mini",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::Openai => "https://api.openai.com/v1",
        }
    }
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API flavour.
    #[serde(default)]
    pub provider: Provider,

    /// Model name; defaults per provider when unset.
    #[serde(default)]
    pub name: Option<String>,

    /// API base URL; defaults per provider when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// API key, only ever taken from the command line or environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            name: None,
            base_url: None,
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            api_key: None,
        }
    }
}

impl ModelConfig {
    /// Configured model name or the provider default.
    pub fn effective_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Configured base URL or the provider default, without trailing slash.
    pub fn effective_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout() -> u64 {
    120
}

/// Dataset settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Years that must each be covered by exactly one file.
    #[serde(default = "default_expected_years")]
    pub expected_years: Vec<i32>,

    /// Field delimiter of the yearly files.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Exact format of the `FechaMov` column.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Directory depth searched when a data directory is given.
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            expected_years: default_expected_years(),
            delimiter: default_delimiter(),
            date_format: default_date_format(),
            scan_depth: default_scan_depth(),
        }
    }
}

fn default_expected_years() -> Vec<i32> {
    vec![2018, 2019, 2020, 2021]
}

fn default_delimiter() -> char {
    ','
}

fn default_date_format() -> String {
    "%d/%m/%Y".to_string()
}

fn default_scan_depth() -> usize {
    1
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Where to write the session transcript, if anywhere.
    #[serde(default)]
    pub transcript: Option<PathBuf>,

    /// Where to write the dashboard data, if anywhere.
    #[serde(default)]
    pub dashboard: Option<PathBuf>,

    /// Include the intent JSON of every turn in the transcript.
    #[serde(default = "default_true")]
    pub include_intents: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            transcript: None,
            dashboard: None,
            include_intents: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(provider) = args.provider {
            self.model.provider = provider;
        }
        if let Some(ref model) = args.model {
            self.model.name = Some(model.clone());
        }
        if let Some(ref base_url) = args.base_url {
            self.model.base_url = Some(base_url.clone());
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if args.api_key.is_some() {
            self.model.api_key = args.api_key.clone();
        }

        if let Some(ref transcript) = args.transcript {
            self.report.transcript = Some(transcript.clone());
        }
        if let Some(ref dashboard) = args.dashboard {
            self.report.dashboard = Some(dashboard.clone());
        }

        // Flags always override
        if args.offline {
            self.general.offline = true;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.provider, Provider::Ollama);
        assert_eq!(config.model.effective_name(), "llama3.2:latest");
        assert_eq!(config.model.effective_base_url(), "http://localhost:11434");
        assert_eq!(config.data.expected_years, vec![2018, 2019, 2020, 2021]);
        assert_eq!(config.data.delimiter, ',');
        assert_eq!(config.data.date_format, "%d/%m/%Y");
        assert!(!config.general.offline);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true

[model]
provider = "openai"
base_url = "https://llm.internal/v1/"
temperature = 0.2

[data]
expected_years = [2020, 2021]
delimiter = ";"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.model.provider, Provider::Openai);
        assert_eq!(config.model.effective_name(), "gpt-4o-mini");
        assert_eq!(config.model.effective_base_url(), "https://llm.internal/v1");
        assert_eq!(config.model.temperature, 0.2);
        assert_eq!(config.data.expected_years, vec![2020, 2021]);
        assert_eq!(config.data.delimiter, ';');
        assert_eq!(config.data.date_format, "%d/%m/%Y");
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[data]"));
        assert!(!toml_str.contains("api_key"));
    }
}
