use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::model::client::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use crate::model::parser::ParseMode;
use crate::round::round_model::{DEFAULT_MAX_RETRIES, RetryPolicy, RoundConfig};

pub const DEFAULT_CONFIG_PATH: &str = "form-autofill.yaml";
pub const DEFAULT_STORE_PATH: &str = "form-autofill-store.json";

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "form-autofill",
    version,
    about = "Fill HTML forms from a personal profile using an LLM"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: form-autofill.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Profile store JSON file
    #[arg(long, global = true)]
    pub store: Option<String>,

    /// Chat completions endpoint
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Model name
    #[arg(long, global = true)]
    pub model: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fill a form in a local HTML file from the stored profile
    Fill {
        /// HTML file containing the form
        #[arg(long)]
        html: String,

        /// Output format: console (summary) or json (summary plus each
        /// control's final value and dispatched events)
        #[arg(long, default_value = "console")]
        output: String,
    },

    /// Learn from the values already typed into a form
    Learn {
        /// HTML file containing the filled-in form
        #[arg(long)]
        html: String,

        /// Page URL recorded with the saved form
        #[arg(long)]
        url: Option<String>,
    },

    /// Extract personal details from a document into the profile
    Ingest {
        /// Document to read
        #[arg(long)]
        file: String,

        /// Treat the document as a PDF (uses pdftotext)
        #[arg(long, default_value_t = false)]
        pdf: bool,
    },

    /// Inspect or replace the stored profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Manage the API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Inspect the log of learned forms
    Forms {
        #[command(subcommand)]
        action: FormsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// Print the stored profile as JSON
    Show,
    /// Store the sample profile if none exists yet
    Init {
        /// Overwrite an existing profile
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Replace the profile with the contents of a JSON file
    Set {
        #[arg(long)]
        file: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeyAction {
    /// Store the API key
    Set {
        key: String,

        /// Check the key against the service before storing it
        #[arg(long, default_value_t = false)]
        validate: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum FormsAction {
    /// List learned forms, oldest first
    List,
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `form-autofill.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Require the whole answer to be JSON and ask the service for JSON mode.
    #[serde(default)]
    pub strict_json: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            strict_json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retries")]
    pub fill_max_retries: u32,

    #[serde(default = "default_retries")]
    pub learn_max_retries: u32,

    #[serde(default = "default_retries")]
    pub ingest_max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            fill_max_retries: DEFAULT_MAX_RETRIES,
            learn_max_retries: DEFAULT_MAX_RETRIES,
            ingest_max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_timeout")]
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TraceConfig {
    /// JSONL round trace; tracing is off when unset.
    pub path: Option<String>,
}

// Serde default helpers
fn default_temperature() -> f32 { DEFAULT_TEMPERATURE }
fn default_retries() -> u32 { DEFAULT_MAX_RETRIES }
fn default_acquire_timeout() -> u64 { 120 }
fn default_ingest_timeout() -> u64 { 30 }

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or(DEFAULT_CONFIG_PATH);
    match std::fs::read_to_string(config_path) {
        Ok(content) => match serde_yaml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = config_path, error = %e, "ignoring malformed config file");
                AppConfig::default()
            }
        },
        Err(_) => AppConfig::default(),
    }
}

// ============================================================================
// Resolved settings (CLI > config file > defaults)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub strict_json: bool,
    pub store_path: String,
    pub trace_path: Option<String>,
    pub acquire_timeout: Duration,
    pub round: RoundConfig,
}

pub fn resolve_settings(cli: &Cli, config: &AppConfig) -> Settings {
    let strict_json = config.model.strict_json;
    Settings {
        endpoint: cli
            .endpoint
            .clone()
            .or_else(|| config.model.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        model: cli
            .model
            .clone()
            .or_else(|| config.model.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        temperature: config.model.temperature,
        strict_json,
        store_path: cli
            .store
            .clone()
            .or_else(|| config.store.path.clone())
            .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()),
        trace_path: config.trace.path.clone(),
        acquire_timeout: Duration::from_secs(config.gateway.acquire_timeout_secs),
        round: RoundConfig {
            fill: RetryPolicy::new(config.retry.fill_max_retries),
            learn: RetryPolicy::new(config.retry.learn_max_retries),
            ingest: RetryPolicy::new(config.retry.ingest_max_retries),
            ingest_timeout: Duration::from_secs(config.ingest.timeout_secs),
            parse_mode: if strict_json {
                ParseMode::Strict
            } else {
                ParseMode::Lenient
            },
        },
    }
}
