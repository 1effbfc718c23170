//! TOML Configuration File Support
//!
//! Centralized configuration for tee streams and copy pumps, loaded from an
//! optional TOML file at `~/.config/teeflow/teeflow.toml`.
//!
//! # Configuration Priority
//!
//! Values are applied with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [tee]
//! buffer_size = 81920
//!
//! [pump]
//! buffer_size = 81920
//! flush_threshold_percent = 90
//! ```
//!
//! # Environment Variables
//!
//! - `TEEFLOW_BUFFER_SIZE`: tee self-buffer capacity in bytes
//! - `TEEFLOW_PUMP_BUFFER_SIZE`: total pump staging size in bytes
//! - `TEEFLOW_FLUSH_THRESHOLD`: pump flush threshold percentage

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ConfigurationError, MIN_BUFFER_SIZE};
use crate::pump::{DEFAULT_FLUSH_THRESHOLD_PERCENT, MIN_PUMP_BUFFER_SIZE};

/// Default tee buffer size (80 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 81_920;

/// Environment variable for the tee buffer size
pub const ENV_BUFFER_SIZE: &str = "TEEFLOW_BUFFER_SIZE";
/// Environment variable for the pump buffer size
pub const ENV_PUMP_BUFFER_SIZE: &str = "TEEFLOW_PUMP_BUFFER_SIZE";
/// Environment variable for the pump flush threshold
pub const ENV_FLUSH_THRESHOLD: &str = "TEEFLOW_FLUSH_THRESHOLD";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigurationError> for ConfigError {
    fn from(err: ConfigurationError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[tee]` section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeeToml {
    /// Self-buffer capacity in bytes
    pub buffer_size: Option<usize>,
}

/// `[pump]` section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpToml {
    /// Total staging size in bytes
    pub buffer_size: Option<usize>,

    /// Fill percentage of a staging half that triggers a forwarded write
    pub flush_threshold_percent: Option<u8>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeeflowToml {
    /// Tee section
    pub tee: TeeToml,

    /// Pump section
    pub pump: PumpToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Copy pump settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PumpConfig {
    /// Total staging size; each of the two staging buffers holds half
    pub buffer_size: usize,
    /// A staging half is forwarded once filled beyond this percentage
    pub flush_threshold_percent: u8,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_threshold_percent: DEFAULT_FLUSH_THRESHOLD_PERCENT,
        }
    }
}

/// Resolved configuration for a tee stream and its pump
#[derive(Clone, Debug)]
pub struct TeeConfig {
    /// Self-buffer capacity (and minimum accepted tee buffer size is 1024)
    pub buffer_size: usize,

    /// Pump settings used by [`crate::TeeStream::copy_from`]
    pub pump: PumpConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for TeeConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            pump: PumpConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl TeeConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tee buffer size
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the pump buffer size
    #[must_use]
    pub fn with_pump_buffer_size(mut self, size: usize) -> Self {
        self.pump.buffer_size = size;
        self
    }

    /// Get the highest-priority source that contributed a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check every value against the limits construction enforces
    ///
    /// # Errors
    ///
    /// Returns the first violated limit.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(ConfigurationError::BufferTooSmall {
                size: self.buffer_size,
                min: MIN_BUFFER_SIZE,
            });
        }
        if self.pump.buffer_size < MIN_PUMP_BUFFER_SIZE {
            return Err(ConfigurationError::PumpBufferTooSmall {
                size: self.pump.buffer_size,
                min: MIN_PUMP_BUFFER_SIZE,
            });
        }
        if !(1..=100).contains(&self.pump.flush_threshold_percent) {
            return Err(ConfigurationError::InvalidFlushThreshold {
                percent: self.pump.flush_threshold_percent,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/teeflow/teeflow.toml` or
/// `~/.config/teeflow/teeflow.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("teeflow").join("teeflow.toml"))
}

/// Load configuration from the default path, then the environment
///
/// A missing config file is not an error (defaults are used).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed or
/// validated.
pub fn load_config() -> Result<TeeConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then the environment
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed or
/// validated.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<TeeConfig, ConfigError> {
    let mut config = TeeConfig::default();

    if let Some(config_path) = path {
        if config_path.exists() {
            let toml_config = read_toml(&config_path)?;
            apply_toml_config(&mut config, &toml_config);
            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
            config.config_file_path = Some(config_path);
            config.source = ConfigSource::File;
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

fn read_toml(path: &Path) -> Result<TeeflowToml, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut TeeConfig, toml: &TeeflowToml) {
    if let Some(size) = toml.tee.buffer_size {
        config.buffer_size = size;
    }
    if let Some(size) = toml.pump.buffer_size {
        config.pump.buffer_size = size;
    }
    if let Some(percent) = toml.pump.flush_threshold_percent {
        config.pump.flush_threshold_percent = percent;
    }
}

/// Apply environment overrides, reading variables through `lookup`
///
/// Unparseable values are ignored with a warning.
fn apply_env_config<F>(config: &mut TeeConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(size) = parse_env(&lookup, ENV_BUFFER_SIZE) {
        config.buffer_size = size;
        config.source = ConfigSource::Env;
    }
    if let Some(size) = parse_env(&lookup, ENV_PUMP_BUFFER_SIZE) {
        config.pump.buffer_size = size;
        config.source = ConfigSource::Env;
    }
    if let Some(percent) = parse_env(&lookup, ENV_FLUSH_THRESHOLD) {
        config.pump.flush_threshold_percent = percent;
        config.source = ConfigSource::Env;
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Tee buffer size override
    pub buffer_size: Option<usize>,

    /// Pump buffer size override
    pub pump_buffer_size: Option<usize>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set tee buffer size override
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Set pump buffer size override
    #[must_use]
    pub fn with_pump_buffer_size(mut self, size: usize) -> Self {
        self.pump_buffer_size = Some(size);
        self
    }

    /// Apply overrides to a configuration and re-validate it
    ///
    /// # Errors
    ///
    /// Returns a validation error if an override breaks a limit.
    pub fn apply(&self, config: &mut TeeConfig) -> Result<(), ConfigError> {
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
            config.source = ConfigSource::Cli;
        }
        if let Some(size) = self.pump_buffer_size {
            config.pump.buffer_size = size;
            config.source = ConfigSource::Cli;
        }
        config.validate()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn toml_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = TeeConfig::default();
        assert_eq!(config.buffer_size, 81_920);
        assert_eq!(config.pump.buffer_size, 81_920);
        assert_eq!(config.pump.flush_threshold_percent, 90);
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.ends_with("teeflow/teeflow.toml"));
        }
    }

    #[test]
    fn test_parse_valid_toml() {
        let file = toml_file(
            r#"
[tee]
buffer_size = 4096

[pump]
buffer_size = 65536
flush_threshold_percent = 75
"#,
        );
        let toml = read_toml(file.path()).unwrap();
        let mut config = TeeConfig::default();
        apply_toml_config(&mut config, &toml);

        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.pump.buffer_size, 65536);
        assert_eq!(config.pump.flush_threshold_percent, 75);
    }

    #[test]
    fn test_parse_partial_toml() {
        let file = toml_file("[pump]\nbuffer_size = 2048\n");
        let toml = read_toml(file.path()).unwrap();
        let mut config = TeeConfig::default();
        apply_toml_config(&mut config, &toml);

        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.pump.buffer_size, 2048);
        assert_eq!(
            config.pump.flush_threshold_percent,
            DEFAULT_FLUSH_THRESHOLD_PERCENT
        );
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let config = load_config_from_path(Some(path)).unwrap();
        assert!(config.config_file_path.is_none());
        assert_ne!(config.source(), ConfigSource::File);
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = toml_file("[tee\nbuffer_size = ");
        let err = read_toml(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_wrong_type_toml_error() {
        let file = toml_file("[tee]\nbuffer_size = \"big\"\n");
        assert!(matches!(
            read_toml(file.path()),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let file = toml_file("[tee]\nbuffer_size = 4096\n");
        let toml = read_toml(file.path()).unwrap();
        let mut config = TeeConfig::default();
        apply_toml_config(&mut config, &toml);
        apply_env_config(
            &mut config,
            env(&[
                (ENV_BUFFER_SIZE, "8192"),
                (ENV_PUMP_BUFFER_SIZE, " 1024 "),
                (ENV_FLUSH_THRESHOLD, "50"),
            ]),
        );

        assert_eq!(config.buffer_size, 8192);
        assert_eq!(config.pump.buffer_size, 1024);
        assert_eq!(config.pump.flush_threshold_percent, 50);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_unparseable_env_ignored() {
        let mut config = TeeConfig::default();
        apply_env_config(&mut config, env(&[(ENV_BUFFER_SIZE, "lots")]));
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_validation_limits() {
        let too_small = TeeConfig::default().with_buffer_size(1023);
        assert!(matches!(
            too_small.validate(),
            Err(ConfigurationError::BufferTooSmall { size: 1023, .. })
        ));

        let tiny_pump = TeeConfig::default().with_pump_buffer_size(1);
        assert!(matches!(
            tiny_pump.validate(),
            Err(ConfigurationError::PumpBufferTooSmall { size: 1, .. })
        ));

        let mut bad_threshold = TeeConfig::default();
        bad_threshold.pump.flush_threshold_percent = 0;
        assert!(matches!(
            bad_threshold.validate(),
            Err(ConfigurationError::InvalidFlushThreshold { percent: 0 })
        ));
    }

    #[test]
    fn test_load_config_from_file_path() {
        let file = toml_file("[tee]\nbuffer_size = 2048\n");
        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        // An ambient TEEFLOW_BUFFER_SIZE would legitimately win here
        if std::env::var(ENV_BUFFER_SIZE).is_err() {
            assert_eq!(config.buffer_size, 2048);
            assert_eq!(config.source(), ConfigSource::File);
        }
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_load_config_rejects_invalid_file_values() {
        let file = toml_file("[tee]\nbuffer_size = 10\n");
        if std::env::var(ENV_BUFFER_SIZE).is_err() {
            let err = load_config_from_path(Some(file.path().to_path_buf())).unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError(_)));
        }
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = TeeConfig::default();
        apply_env_config(&mut config, env(&[(ENV_BUFFER_SIZE, "8192")]));

        ConfigOverrides::new()
            .with_buffer_size(16384)
            .with_pump_buffer_size(4096)
            .apply(&mut config)
            .unwrap();

        assert_eq!(config.buffer_size, 16384);
        assert_eq!(config.pump.buffer_size, 4096);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_cli_override_validation() {
        let mut config = TeeConfig::default();
        let err = ConfigOverrides::new()
            .with_buffer_size(100)
            .apply(&mut config)
            .unwrap_err();
        assert!(err.to_string().contains("below the minimum"));
    }

    #[test]
    fn test_empty_overrides_no_change() {
        let mut config = TeeConfig::default();
        ConfigOverrides::new().apply(&mut config).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Cli.to_string(), "CLI");
        assert_eq!(ConfigSource::Env.to_string(), "environment");
        assert_eq!(ConfigSource::File.to_string(), "config file");
        assert_eq!(ConfigSource::Default.to_string(), "default");
    }

    #[test]
    fn test_toml_round_trip() {
        let original = TeeflowToml {
            tee: TeeToml {
                buffer_size: Some(2048),
            },
            pump: PumpToml {
                buffer_size: Some(4096),
                flush_threshold_percent: Some(80),
            },
        };
        let text = toml::to_string(&original).unwrap();
        let parsed: TeeflowToml = toml::from_str(&text).unwrap();
        assert_eq!(parsed.tee.buffer_size, Some(2048));
        assert_eq!(parsed.pump.flush_threshold_percent, Some(80));
    }
}
