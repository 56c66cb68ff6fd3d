//! Runtime settings for the oracle, the coding agent and the store.
//!
//! Defaults can be overridden by a YAML file; command-line flags are applied
//! on top by the caller.

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;

use crate::describe::DEFAULT_SAMPLE_ROWS;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Copy, Deserialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LookupMode {
    /// Ask the oracle to find the mapping file in the log text.
    #[default]
    Oracle,
    /// Parse the log lines and take the newest exact match.
    Exact,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RemapConfig {
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    /// No timeout when unset.
    pub request_timeout_secs: Option<u64>,
    pub sample_rows: usize,
    pub memory_window: usize,
    pub max_agent_iterations: usize,
    pub store_dir: PathBuf,
    pub lookup: LookupMode,
}

impl Default for RemapConfig {
    fn default() -> Self {
        RemapConfig {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: None,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            memory_window: 5,
            max_agent_iterations: 15,
            store_dir: PathBuf::from("saved"),
            lookup: LookupMode::Oracle,
        }
    }
}

impl RemapConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .with_context(|| format!("Reading config file {path:?}"))?;
        Self::from_yaml(&raw).with_context(|| format!("Parsing config file {path:?}"))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(RemapConfig::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(RemapConfig::default()),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
