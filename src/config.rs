//! Configuration loading for the `sluice` binary.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.sluice/config.toml` (user)
//! 3. `/etc/sluice/config.toml` (system)
//!
//! With no file at all, built-in defaults apply. The API key never lives in
//! the config file; it comes from `SLUICE_API_KEY` or the `--key` flag.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::invoker::HttpConfig;
use crate::invoker::http::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::options::DispatchOptions;
use crate::{Result, SluiceError};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "SLUICE_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub http: HttpSection,
}

/// Concurrency, deadline and result policy.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Worker count (default: 1).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Window size (default: twice the worker count).
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Overall deadline in seconds (default: none).
    #[serde(default)]
    pub deadline_secs: Option<f64>,
    /// Raise on the first failed call (default: true).
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
    /// Emit `{input, output}` pairs (default: false).
    #[serde(default)]
    pub with_inputs: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            capacity: None,
            deadline_secs: None,
            fail_fast: default_fail_fast(),
            with_inputs: false,
        }
    }
}

fn default_workers() -> usize {
    1
}

fn default_fail_fast() -> bool {
    true
}

/// Endpoint and timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSection {
    #[serde(default)]
    pub url: Option<String>,
    /// Connect timeout in milliseconds (default: 3050).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Read timeout in seconds (default: 600).
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT.as_secs()
}

impl DispatchConfig {
    pub fn to_options(&self) -> Result<DispatchOptions> {
        let deadline = match self.deadline_secs {
            None => None,
            Some(secs) => Some(Duration::try_from_secs_f64(secs).map_err(|e| {
                SluiceError::Configuration(format!("invalid deadline_secs {secs}: {e}"))
            })?),
        };
        let options = DispatchOptions {
            workers: self.workers,
            capacity: self.capacity,
            deadline,
            fail_fast: self.fail_fast,
            pair_with_input: self.with_inputs,
        };
        options.validate()?;
        Ok(options)
    }
}

impl HttpSection {
    /// Build the invoker settings; `url` overrides the configured one.
    pub fn to_http_config(&self, url: Option<&str>, api_key: Option<String>) -> Result<HttpConfig> {
        let url = url
            .map(str::to_string)
            .or_else(|| self.url.clone())
            .ok_or_else(|| {
                SluiceError::Configuration(
                    "no endpoint URL given; pass --url or set [http] url".to_string(),
                )
            })?;
        let mut config = HttpConfig::new(url)
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .read_timeout(Duration::from_secs(self.read_timeout_secs));
        if let Some(key) = api_key {
            config = config.api_key(key);
        }
        Ok(config)
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.sluice/config.toml`
    /// 3. `/etc/sluice/config.toml`
    /// 4. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SluiceError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            SluiceError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(SluiceError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".sluice").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/sluice/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

/// API key from the environment, if set and non-empty.
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}
