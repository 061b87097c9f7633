//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::Provider;
use clap::Parser;
use std::path::PathBuf;

/// FinderQA - ask questions about the Finder 2018-2021 sales data
///
/// Loads the four yearly CSV exports, resolves each question into one
/// analytical operation, runs it locally and lets a language model phrase
/// the anonymized result.
///
/// Examples:
///   finderqa --data ventas_2018.csv ventas_2019.csv ventas_2020.csv ventas_2021.csv
///   finderqa --data-dir ./datos --ask "¿Cuáles fueron las ventas en mayo del 2021?"
///   finderqa --data-dir ./datos --provider openai --model gpt-4o-mini
///   finderqa --data-dir ./datos --offline --dashboard tablero.md --family Tornillos
///   finderqa --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Yearly CSV files (file names must contain the year)
    #[arg(short, long = "data", value_name = "FILE", num_args = 1..)]
    pub data: Vec<PathBuf>,

    /// Directory searched for yearly CSV files
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Question to answer (repeatable); starts the interactive chat when omitted
    #[arg(short, long = "ask", value_name = "QUESTION")]
    pub ask: Vec<String>,

    /// Language model API flavour
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<Provider>,

    /// Model name (defaults to llama3.2:latest for Ollama, gpt-4o-mini for OpenAI)
    #[arg(short, long, env = "FINDERQA_MODEL")]
    pub model: Option<String>,

    /// API base URL
    #[arg(long, value_name = "URL", env = "FINDERQA_BASE_URL")]
    pub base_url: Option<String>,

    /// API key for OpenAI-compatible providers
    #[arg(long, value_name = "KEY", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Answer without a language model (keyword intent rules, template answers)
    #[arg(long)]
    pub offline: bool,

    /// Write the session transcript to this file
    #[arg(long, value_name = "FILE")]
    pub transcript: Option<PathBuf>,

    /// Write the dashboard data tables to this file
    #[arg(long, value_name = "FILE")]
    pub dashboard: Option<PathBuf>,

    /// Family shown in the dashboard's per-family average view
    #[arg(long, value_name = "NAME")]
    pub family: Option<String>,

    /// Output format for transcript and dashboard (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .finderqa.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(long)]
    pub quiet: bool,

    /// Generate a default .finderqa.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for transcripts and dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Base URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        for path in &self.data {
            if !path.is_file() {
                return Err(format!("Data file does not exist: {}", path.display()));
            }
        }

        if let Some(ref dir) = self.data_dir {
            if !dir.is_dir() {
                return Err(format!("Data directory does not exist: {}", dir.display()));
            }
        }

        if self.ask.iter().any(|q| q.trim().is_empty()) {
            return Err("Questions passed with --ask must not be empty".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `verbose_by_default` comes from the configuration file; `--quiet`
    /// still wins over it.
    pub fn log_level(&self, verbose_by_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_by_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// True when questions come from the command line rather than a chat loop.
    pub fn is_one_shot(&self) -> bool {
        !self.ask.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            data: Vec::new(),
            data_dir: None,
            ask: Vec::new(),
            provider: None,
            model: None,
            base_url: None,
            api_key: None,
            temperature: None,
            timeout: None,
            offline: false,
            transcript: None,
            dashboard: None,
            family: None,
            format: OutputFormat::Markdown,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.base_url = Some("localhost:11434".to_string());
        assert!(args.validate().is_err());

        args.base_url = Some("http://localhost:11434".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_data_file() {
        let mut args = make_args();
        args.data = vec![PathBuf::from("/definitely/not/here_2018.csv")];
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_temperature_and_timeout() {
        let mut args = make_args();
        args.temperature = Some(1.5);
        assert!(args.validate().is_err());

        args.temperature = Some(0.3);
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.init_config = true;
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "finderqa",
            "--data",
            "a_2018.csv",
            "b_2019.csv",
            "--ask",
            "Top 3 familias 2020",
            "--provider",
            "openai",
            "--offline",
        ])
        .unwrap();

        assert_eq!(args.data.len(), 2);
        assert_eq!(args.ask, vec!["Top 3 familias 2020"]);
        assert_eq!(args.provider, Some(Provider::Openai));
        assert!(args.offline);
        assert!(args.is_one_shot());
    }
}
