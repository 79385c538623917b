//! Service configuration.
//!
//! Settings are read from a TOML file; every field is optional and falls back
//! to the protocol defaults. Lookup order:
//!
//! 1. an explicit path (the CLI's `--config`)
//! 2. `$FANLINK_CONFIG`
//! 3. `<config dir>/fanlink/config.toml`, if it exists
//! 4. built-in defaults
//!
//! ```toml
//! listen_port = 5625
//! command_port = 5600
//! device_timeout_ms = 5000
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use fanlink_protocol::{BEACON_PORT, COMMAND_PORT};

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "FANLINK_CONFIG";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Runtime settings for the discovery service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// UDP port beacons are received on (bound on 0.0.0.0)
    pub listen_port: u16,

    /// UDP port commands are sent to on the device
    pub command_port: u16,

    /// Silence after which a device is evicted
    pub device_timeout_ms: u64,

    /// Period of the cleanup sweep
    pub sweep_interval_ms: u64,

    /// Upper bound on a single command send
    pub send_timeout_ms: u64,

    /// Receive buffer for beacon datagrams
    pub recv_buffer_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_port: BEACON_PORT,
            command_port: COMMAND_PORT,
            device_timeout_ms: 5_000,
            sweep_interval_ms: 1_000,
            send_timeout_ms: 5_000,
            recv_buffer_size: 4096,
        }
    }
}

impl ServiceConfig {
    /// Loads configuration following the documented lookup order.
    ///
    /// # Errors
    ///
    /// Fails if an explicitly named file (argument or env var) cannot be read,
    /// or if any file found is not valid TOML for this schema.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reads and parses a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parses TOML text; missing fields keep their defaults.
    ///
    /// Only checks syntax and types; see [`ServiceConfig::validate`].
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Rejects values the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "sweep_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.device_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "device_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        if self.send_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "send_timeout_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Returns `<config dir>/fanlink/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fanlink").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_protocol() {
        let config = ServiceConfig::default();
        assert_eq!(config.listen_port, 5625);
        assert_eq!(config.command_port, 5600);
        assert_eq!(config.device_timeout(), Duration::from_secs(5));
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.send_timeout(), Duration::from_secs(5));
        assert_eq!(config.recv_buffer_size, 4096);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServiceConfig::from_toml("listen_port = 15625\ndevice_timeout_ms = 2500\n").unwrap();
        assert_eq!(config.listen_port, 15625);
        assert_eq!(config.device_timeout(), Duration::from_millis(2500));
        assert_eq!(config.command_port, 5600);
        assert_eq!(config.send_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(ServiceConfig::from_toml("").unwrap(), ServiceConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(ServiceConfig::from_toml("listen_prot = 1").is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "command_port = 16000").unwrap();

        let config = ServiceConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.command_port, 16000);
        assert_eq!(config.listen_port, 5625);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        let err = ServiceConfig::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let config = ServiceConfig::from_toml("sweep_interval_ms = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "sweep_interval_ms",
                ..
            }
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sweep_interval_ms = 0").unwrap();
        let err = ServiceConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("sweep_interval_ms"));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let config = ServiceConfig {
            device_timeout_ms: 0,
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "device_timeout_ms",
                ..
            })
        ));

        let config = ServiceConfig {
            send_timeout_ms: 0,
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "send_timeout_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_load_invalid_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_port = \"not a number\"").unwrap();

        let err = ServiceConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}
