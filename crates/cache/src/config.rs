//! `config.toml`.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Base url of the Canvas instance.
    pub url: String,
    pub access_token: String,

    /// Seconds between synchronization passes.  Nothing in this crate loops; whatever calls
    /// [crate::Synchronizer::run_once] repeatedly waits [Config::sleep_duration] between calls.
    #[serde(default = "default_sleep_time")]
    pub sleep_time: u64,

    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default = "default_download_root")]
    pub download_root: PathBuf,

    /// An env_logger filter.  When unset, `RUST_LOG` applies.
    #[serde(default)]
    pub log_filter: Option<String>,
}

fn default_sleep_time() -> u64 {
    60
}

fn default_database() -> PathBuf {
    "canvas-cache.db".into()
}

fn default_download_root() -> PathBuf {
    "canvas".into()
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text)
            .context("Invalid config file: missing url or access_token")?;
        if config.url.is_empty() || config.access_token.is_empty() {
            anyhow::bail!("Invalid config file: url and access_token may not be empty");
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        Config::from_toml_str(&text).with_context(|| format!("In {}", path.display()))
    }

    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs(self.sleep_time)
    }

    pub fn init_logging(&self) {
        canvas_logging::log_to_stderr_with_filter(self.log_filter.as_deref());
    }
}
