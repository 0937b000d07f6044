//! Configuration loading and root folder resolution
//!
//! Both the root folder and the service configuration resolve in the same
//! priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ENV_ROOT_FOLDER: &str = "REQDESK_ROOT_FOLDER";

/// Environment variable carrying the oracle API key
pub const ENV_ORACLE_API_KEY: &str = "REQDESK_ORACLE_API_KEY";

/// Resolve the root folder holding the database
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    get_default_root_folder()
}

/// Locate the configuration file for the platform
fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("reqdesk").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/reqdesk/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("reqdesk"))
        .unwrap_or_else(|| PathBuf::from("./reqdesk_data"))
}

/// Oracle (chat-completion service) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL of an OpenAI-compatible API; `/chat/completions` is appended
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Outbound call pacing
    pub requests_per_second: u32,
    /// Usually supplied through `REQDESK_ORACLE_API_KEY` instead of the file
    pub api_key: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            timeout_secs: 60,
            requests_per_second: 5,
            api_key: None,
        }
    }
}

/// Per-client limit on request submissions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for SubmissionLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window_secs: 900,
        }
    }
}

/// Service configuration (`config.toml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_address: String,
    /// Database file name, relative to the root folder
    pub database_file: String,
    /// Seconds between scheduled clustering passes
    pub clustering_interval_secs: u64,
    pub submission_limit: SubmissionLimitConfig,
    pub oracle: OracleConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5740".to_string(),
            database_file: "reqdesk.db".to_string(),
            clustering_interval_secs: 3600,
            submission_limit: SubmissionLimitConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Parse configuration from TOML text; missing keys take defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServiceConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one, the platform config file is
    /// used when present, otherwise defaults. The API key environment
    /// variable always overrides the file.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Cannot read config {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&content)?
            }
            None => match find_config_file() {
                Ok(path) => {
                    tracing::info!("Loading configuration from {}", path.display());
                    Self::from_toml_str(&std::fs::read_to_string(&path)?)?
                }
                Err(_) => {
                    tracing::info!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        if let Ok(key) = std::env::var(ENV_ORACLE_API_KEY) {
            if !key.trim().is_empty() {
                config.oracle.api_key = Some(key);
            }
        }

        Ok(config)
    }

    /// Reject values that would make the service misbehave silently
    pub fn validate(&self) -> Result<()> {
        if self.clustering_interval_secs == 0 {
            return Err(Error::Config(
                "clustering_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.submission_limit.max_requests == 0 || self.submission_limit.window_secs == 0 {
            return Err(Error::Config(
                "submission_limit values must be greater than 0".to_string(),
            ));
        }
        if self.oracle.requests_per_second == 0 {
            return Err(Error::Config(
                "oracle.requests_per_second must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(Error::Config(format!(
                "oracle.temperature out of range: {}",
                self.oracle.temperature
            )));
        }
        Ok(())
    }

    /// Database path inside the resolved root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.database_file)
    }
}
