//! Configuration loading and root folder resolution
//!
//! Two tiers, bootstrap first:
//! 1. **TOML bootstrap**: bind address, port, security knobs, logging
//! 2. **Database runtime**: registration switch and submission window in the
//!    `settings` table (see [`crate::db::settings`])
//!
//! Root folder priority:
//! 1. Command-line argument (highest priority)
//! 2. `CFP_ROOT_FOLDER` environment variable
//! 3. `CFP_ROOT` environment variable
//! 4. `root_folder` key of the user TOML config file
//! 5. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use chrono::Datelike;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "cfp.db";

/// Upload directory name inside the root folder
pub const UPLOADS_DIR_NAME: &str = "uploads";

/// Config file name looked up inside the root folder
pub const CONFIG_FILE_NAME: &str = "cfp.toml";

/// Bootstrap configuration loaded from TOML
///
/// Every key is optional; a missing file yields [`TomlConfig::default`].
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Root folder override (only honoured from the user config file)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Displayed application name
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Conference edition year
    #[serde(default = "default_conference_year")]
    pub conference_year: i32,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL used when building activation and reset links
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// HMAC key for account tokens. Generated and stored in the database
    /// when absent.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// bcrypt cost factor for password hashes
    #[serde(default = "default_password_hash_cost")]
    pub password_hash_cost: u32,

    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,

    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    /// Validity of activation and password reset tokens
    #[serde(default = "default_activation_timeout_days")]
    pub activation_timeout_days: i64,

    /// Submissions older than this can no longer be edited by their owner
    #[serde(default = "default_submission_edit_window_days")]
    pub submission_edit_window_days: i64,

    /// Submissions (and reviews) older than this can no longer be reviewed
    #[serde(default = "default_review_window_days")]
    pub review_window_days: i64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_application_name() -> String {
    "CFP".to_string()
}

fn default_conference_year() -> i32 {
    chrono::Utc::now().year()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5730
}

fn default_public_url() -> String {
    format!("http://{}:{}", default_bind_address(), default_port())
}

fn default_password_hash_cost() -> u32 {
    // bcrypt default (12) raised by 30%
    15
}

fn default_min_password_length() -> usize {
    12
}

fn default_max_upload_size() -> usize {
    50 * 1024 * 1024
}

fn default_session_ttl_hours() -> i64 {
    24 * 14
}

fn default_activation_timeout_days() -> i64 {
    3
}

fn default_submission_edit_window_days() -> i64 {
    90
}

fn default_review_window_days() -> i64 {
    150
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            application_name: default_application_name(),
            conference_year: default_conference_year(),
            bind_address: default_bind_address(),
            port: default_port(),
            public_url: default_public_url(),
            secret_key: None,
            password_hash_cost: default_password_hash_cost(),
            min_password_length: default_min_password_length(),
            max_upload_size: default_max_upload_size(),
            session_ttl_hours: default_session_ttl_hours(),
            activation_timeout_days: default_activation_timeout_days(),
            submission_edit_window_days: default_submission_edit_window_days(),
            review_window_days: default_review_window_days(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration for a root folder
    ///
    /// Looks for `cfp.toml` inside the root folder, then the user config
    /// file. A missing file is not an error: defaults are used and a warning
    /// is logged.
    pub fn load(root_folder: &Path) -> Result<Self> {
        let candidates = std::iter::once(root_folder.join(CONFIG_FILE_NAME))
            .chain(user_config_file());

        for path in candidates {
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let config = Self::from_toml_str(&content)?;
            info!("Loaded configuration from {}", path.display());
            return Ok(config);
        }

        warn!("No configuration file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(4..=31).contains(&self.password_hash_cost) {
            return Err(Error::Config(format!(
                "password_hash_cost must be between 4 and 31 (got {})",
                self.password_hash_cost
            )));
        }
        if self.min_password_length == 0 {
            return Err(Error::Config("min_password_length must be positive".to_string()));
        }
        if self.max_upload_size == 0 {
            return Err(Error::Config("max_upload_size must be positive".to_string()));
        }
        if self.session_ttl_hours <= 0 || self.activation_timeout_days <= 0 {
            return Err(Error::Config(
                "session_ttl_hours and activation_timeout_days must be positive".to_string(),
            ));
        }
        if let Some(key) = &self.secret_key {
            if key.trim().is_empty() {
                return Err(Error::Config("secret_key cannot be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
        }
    }
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
        }
    }

    /// Command-line override (highest priority)
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("[{}] Root folder from command line: {}", self.module_name, path.display());
            return path.clone();
        }

        for var in ["CFP_ROOT_FOLDER", "CFP_ROOT"] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    info!("[{}] Root folder from {}: {}", self.module_name, var, path);
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(path) = root_folder_from_user_config() {
            info!("[{}] Root folder from config file: {}", self.module_name, path.display());
            return path;
        }

        let path = CompiledDefaults::for_current_platform().root_folder;
        info!("[{}] Root folder from compiled default: {}", self.module_name, path.display());
        path
    }
}

/// Creates the root folder layout and hands out well-known paths
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder and its uploads directory if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder: {}", self.root_folder.display());
        }
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.uploads_path())?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.root_folder.join(UPLOADS_DIR_NAME)
    }
}

/// User-level config file (`~/.config/cfp/config.toml`, then `/etc/cfp/config.toml` on Linux)
fn user_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("cfp").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/cfp/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

fn root_folder_from_user_config() -> Option<PathBuf> {
    let path = user_config_file()?;
    let content = std::fs::read_to_string(path).ok()?;
    let value = toml::from_str::<toml::Value>(&content).ok()?;
    value
        .get("root_folder")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("cfp"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/cfp"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("cfp"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/cfp"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("cfp"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\cfp"))
    } else {
        PathBuf::from("./cfp_data")
    }
}
