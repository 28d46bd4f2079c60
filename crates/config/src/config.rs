//! Core configuration structures and loading logic

use crate::profile::{EncodingProfile, DEFAULT_PROFILE, MAX_DELAY_MINUTES};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading or writing the config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// TOML serialization error while writing a default config
    Serialize(toml::ser::Error),
    /// Configuration parsed but is not usable
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Serialize(e) => write!(f, "Failed to write default config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::Serialize(e)
    }
}

/// Filesystem roots the pipeline reads from and writes to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Root that logical source paths are resolved against
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Scratch directory for in-progress encodes
    #[serde(default = "default_transcode_dir")]
    pub transcode_dir: PathBuf,
    /// Root that finished files are placed under, mirroring `data_dir`
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_transcode_dir() -> PathBuf {
    PathBuf::from("/transcode")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("/out")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            transcode_dir: default_transcode_dir(),
            out_dir: default_out_dir(),
        }
    }
}

/// Processing queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Maximum number of jobs running at once (default 2)
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Minimum seconds between two encoder progress log lines (default 60)
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
    /// Finished jobs kept in the status snapshot (default 100)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_concurrency() -> u32 {
    2
}

fn default_progress_interval_secs() -> u64 {
    60
}

fn default_history_limit() -> usize {
    100
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            progress_interval_secs: default_progress_interval_secs(),
            history_limit: default_history_limit(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset (default "info")
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Queue status HTTP endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_status_addr")]
    pub addr: String,
}

fn default_status_addr() -> String {
    "127.0.0.1:7878".to_string()
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_status_addr(),
        }
    }
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

fn default_profiles() -> BTreeMap<String, EncodingProfile> {
    let mut profiles = BTreeMap::new();
    profiles.insert(DEFAULT_PROFILE.to_string(), EncodingProfile::starter());
    profiles
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default = "default_profiles")]
    pub profiles: BTreeMap<String, EncodingProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            queue: QueueConfig::default(),
            logging: LoggingConfig::default(),
            status: StatusConfig::default(),
            tools: ToolsConfig::default(),
            profiles: default_profiles(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - CONCURRENCY -> queue.concurrency
    /// - DATA_DIR -> paths.data_dir
    /// - TRANSCODE_DIR -> paths.transcode_dir
    /// - OUT_DIR -> paths.out_dir
    /// - DEBUG -> logging.level = "debug" (any non-empty value)
    /// - LOG_FORMAT -> logging.format ("pretty" or "json")
    /// - FFMPEG_PATH -> tools.ffmpeg
    /// - FFPROBE_PATH -> tools.ffprobe
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("CONCURRENCY") {
            if let Ok(concurrency) = val.trim().parse::<u32>() {
                self.queue.concurrency = concurrency;
            }
        }

        if let Some(dir) = non_empty_var("DATA_DIR") {
            self.paths.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_var("TRANSCODE_DIR") {
            self.paths.transcode_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_var("OUT_DIR") {
            self.paths.out_dir = PathBuf::from(dir);
        }

        if non_empty_var("DEBUG").is_some() {
            self.logging.level = "debug".to_string();
        }

        if let Ok(val) = env::var("LOG_FORMAT") {
            match val.to_lowercase().as_str() {
                "pretty" => self.logging.format = LogFormat::Pretty,
                "json" => self.logging.format = LogFormat::Json,
                _ => {} // Invalid value, keep existing
            }
        }

        if let Some(path) = non_empty_var("FFMPEG_PATH") {
            self.tools.ffmpeg = PathBuf::from(path);
        }
        if let Some(path) = non_empty_var("FFPROBE_PATH") {
            self.tools.ffprobe = PathBuf::from(path);
        }
    }

    /// Check the invariants the pipeline relies on
    ///
    /// - a `default` profile exists
    /// - concurrency is at least 1
    /// - every profile delay is a finite, non-negative number
    /// - every file rename pattern compiles
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.profiles.contains_key(DEFAULT_PROFILE) {
            return Err(ConfigError::Invalid(format!(
                "a profile named '{}' must exist",
                DEFAULT_PROFILE
            )));
        }

        if self.queue.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "queue.concurrency must be at least 1".to_string(),
            ));
        }

        for (name, profile) in &self.profiles {
            if !profile.delay_minutes.is_finite()
                || profile.delay_minutes < 0.0
                || profile.delay_minutes > MAX_DELAY_MINUTES
            {
                return Err(ConfigError::Invalid(format!(
                    "profile '{}': delay_minutes must be between 0 and {}, got {}",
                    name, MAX_DELAY_MINUTES, profile.delay_minutes
                )));
            }

            for rename in &profile.file_renames {
                if let Err(e) = Regex::new(&rename.pattern) {
                    return Err(ConfigError::Invalid(format!(
                        "profile '{}': file rename pattern '{}' does not compile: {}",
                        name, rename.pattern, e
                    )));
                }
            }
        }

        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, first writing a default file if none exists
    ///
    /// Returns the configuration and whether a default file was created.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<(Self, bool), ConfigError> {
        let path = path.as_ref();
        let mut created = false;

        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, Config::default().to_toml()?)?;
            created = true;
        }

        Ok((Self::load(path)?, created))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
