//! Configuration loading and config file resolution
//!
//! Bootstrap configuration lives in a single TOML file. Every section is
//! optional; a missing file or missing section falls back to compiled
//! defaults so the tools can start with zero configuration (credentials
//! excepted, see [`resolve_secret`]).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PIXVEC_CONFIG";

/// Config file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "pixvec.toml";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dataset file locations and schema
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Batching and concurrency settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Embedding service connection (optional, may come from ENV)
    #[serde(default)]
    pub vision: Option<VisionConfig>,

    /// Object storage destination (optional, may come from ENV)
    #[serde(default)]
    pub blob: Option<BlobConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Dataset locations and tabular schema
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DatasetConfig {
    /// Source dataset (delimited, header row)
    #[serde(default = "default_input")]
    pub input: PathBuf,

    /// Intermediate store of `key, vector` rows
    #[serde(default = "default_store")]
    pub store: PathBuf,

    /// Final merged dataset
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Folder the image files live in
    #[serde(default = "default_images_folder")]
    pub images_folder: PathBuf,

    /// Column holding the item key
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Field delimiter of input and output files
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Column holding the payload locator (URL or text). When unset the
    /// locator is derived from the key.
    #[serde(default)]
    pub locator_column: Option<String>,

    /// Base URL the images are served from (URL vectorization). Item
    /// locators become `<images_base_url>/<key>`.
    #[serde(default)]
    pub images_base_url: Option<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            store: default_store(),
            output: default_output(),
            images_folder: default_images_folder(),
            key_column: default_key_column(),
            delimiter: default_delimiter(),
            locator_column: None,
            images_base_url: None,
        }
    }
}

/// Batching and concurrency settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PipelineConfig {
    /// Items per sequentially processed batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum concurrent remote calls within a batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upper bound on a single remote call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Keep the intermediate store and skip keys already present
    #[serde(default)]
    pub resume: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            resume: false,
        }
    }
}

/// Embedding service connection
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VisionConfig {
    /// Base endpoint, e.g. `https://<resource>.cognitiveservices.azure.com/`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Subscription key
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Client-side request rate cap (unset = no cap)
    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

/// Object storage destination
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BlobConfig {
    /// Storage account URL, e.g. `https://<account>.blob.core.windows.net`
    #[serde(default)]
    pub account_url: Option<String>,

    #[serde(default)]
    pub container: Option<String>,

    /// Shared access signature (query string, without leading `?`)
    #[serde(default)]
    pub sas_token: Option<String>,

    #[serde(default = "default_content_type")]
    pub content_type: String,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: default_api_version(),
            model_version: default_model_version(),
            requests_per_second: None,
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            account_url: None,
            container: None,
            sas_token: None,
            content_type: default_content_type(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_input() -> PathBuf {
    PathBuf::from("dataset/dataset.csv")
}

fn default_store() -> PathBuf {
    PathBuf::from("dataset/embeddings.csv")
}

fn default_output() -> PathBuf {
    PathBuf::from("dataset/dataset_embeddings.csv")
}

fn default_images_folder() -> PathBuf {
    PathBuf::from("semart_dataset/images")
}

fn default_key_column() -> String {
    "image_file".to_string()
}

fn default_delimiter() -> char {
    '\t'
}

fn default_batch_size() -> usize {
    1000
}

fn default_concurrency() -> usize {
    4
}

fn default_call_timeout_secs() -> u64 {
    60
}

pub fn default_api_version() -> String {
    "2024-02-01".to_string()
}

pub fn default_model_version() -> String {
    "2023-04-15".to_string()
}

pub fn default_content_type() -> String {
    "image/jpeg".to_string()
}

/// Config file resolution following priority order:
/// 1. Command-line argument (highest priority)
/// 2. `PIXVEC_CONFIG` environment variable
/// 3. Platform config directory (`<config_dir>/pixvec/pixvec.toml`), if present
pub struct ConfigFileResolver {
    cli_arg: Option<PathBuf>,
}

impl ConfigFileResolver {
    pub fn new(cli_arg: Option<PathBuf>) -> Self {
        Self { cli_arg }
    }

    /// Returns the config file to load, or `None` when no source names one
    pub fn resolve(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_arg {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        dirs::config_dir()
            .map(|d| d.join("pixvec").join(CONFIG_FILE_NAME))
            .filter(|p| p.exists())
    }

    /// Resolve and load, degrading to defaults when the file is missing
    ///
    /// A file that exists but does not parse is an error.
    pub fn load(&self) -> Result<TomlConfig> {
        let (config, source) = self.load_with_source()?;
        source.log();
        Ok(config)
    }

    /// Like [`Self::load`], but reports where the config came from instead
    /// of logging it, for callers that install logging from the config
    pub fn load_with_source(&self) -> Result<(TomlConfig, ConfigSource)> {
        let Some(path) = self.resolve() else {
            return Ok((TomlConfig::default(), ConfigSource::Defaults));
        };

        if !path.exists() {
            return Ok((TomlConfig::default(), ConfigSource::Missing(path)));
        }

        let config = load_toml_config(&path)?;
        Ok((config, ConfigSource::File(path)))
    }
}

/// Origin of a loaded [`TomlConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// This file was named (CLI or ENV) but does not exist; defaults used
    Missing(PathBuf),
    /// No file named or found; defaults used
    Defaults,
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            Self::File(path) => info!("Loaded config from {}", path.display()),
            Self::Missing(path) => warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            ),
            Self::Defaults => info!("No config file found, using compiled defaults"),
        }
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Write a config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Validate a credential value (non-empty, non-whitespace)
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Resolve a credential from ENV → TOML
///
/// Returns the first valid value, trimmed. Warns when more than one source
/// provides a value since only the environment one is used.
pub fn resolve_secret(env_var: &str, toml_value: Option<&str>, label: &str) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_value(v));
    let toml_value = toml_value.filter(|v| is_valid_value(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in environment and TOML config. Using environment ({}).",
            label, env_var
        );
    }

    if let Some(value) = env_value {
        info!("{} loaded from environment variable", label);
        return Some(value.trim().to_string());
    }

    if let Some(value) = toml_value {
        info!("{} loaded from TOML config", label);
        return Some(value.trim().to_string());
    }

    None
}
