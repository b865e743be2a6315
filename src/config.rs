//! Configuration loading for the sendgate binary.
//!
//! `sendgate.toml` only says where the rule table lives and how to log; the
//! rule table itself is a separate file (see [`crate::rules`]). Every
//! section uses `#[serde(default)]`, so an empty or missing file is valid.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// File name of the rule table inside the config directory.
pub const DEFAULT_RULES_FILE: &str = "messaging-rules.json";

/// File name of the config inside the config directory.
pub const DEFAULT_CONFIG_FILE: &str = "sendgate.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rule table location and reload behaviour.
    pub rules: RulesConfig,
    /// Log level and optional log directory.
    pub logging: LoggingConfig,
}

/// Where the rule table lives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Rules file path. Defaults to `~/.sendgate/messaging-rules.json`.
    pub path: Option<PathBuf>,
    /// Reload the rules file when it changes (used by `watch`).
    pub watch: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rotated JSON logs; stderr only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            dir: None,
        }
    }
}

impl Config {
    /// Load config from `explicit`, `$SENDGATE_CONFIG`, or the default
    /// location, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    /// [`Config::load`] with a custom env resolver (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match env("SENDGATE_CONFIG") {
                Some(p) => PathBuf::from(p),
                None => config_dir()?.join(DEFAULT_CONFIG_FILE),
            },
        };

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read config at {}: {e}",
                    path.display()
                ))
            }
        };

        config.apply_overrides(env);
        Ok(config)
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("SENDGATE_RULES") {
            self.rules.path = Some(PathBuf::from(v));
        }
        if let Some(v) = env("SENDGATE_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Resolved rules file path.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is configured and the home directory
    /// cannot be determined.
    pub fn rules_path(&self) -> anyhow::Result<PathBuf> {
        match &self.rules.path {
            Some(p) => Ok(p.clone()),
            None => Ok(config_dir()?.join(DEFAULT_RULES_FILE)),
        }
    }
}

/// Resolve the default config directory (`~/.sendgate/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".sendgate"))
}
