use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FailureKind, KindSet};
use crate::retry::{default_retryable_kinds, RetryPolicy};

/// Retry policy parameters as written in config.toml.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt, in seconds (e.g. 0.25 = 250ms).
    pub initial_delay_secs: f64,
    /// Ceiling on any single delay, in seconds.
    pub max_delay_secs: f64,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Draw each delay uniformly from [0, computed delay].
    pub jitter: bool,
    /// Failure kinds worth another attempt.
    pub retry_on: Vec<FailureKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_secs: 1.0,
            max_delay_secs: 60.0,
            backoff_multiplier: 2.0,
            jitter: true,
            retry_on: default_retryable_kinds().iter().collect(),
        }
    }
}

impl RetryConfig {
    /// Build a validated policy from these values.
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        let initial = secs("initial_delay_secs", self.initial_delay_secs)?;
        let max = secs("max_delay_secs", self.max_delay_secs)?;
        let policy = RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .initial_delay(initial)
            .max_delay(max)
            .backoff_multiplier(self.backoff_multiplier)
            .jitter(self.jitter)
            .retry_on(self.retry_on.iter().copied().collect::<KindSet>())
            .build()?;
        Ok(policy)
    }
}

fn secs(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{field} must be a non-negative number of seconds, got {value}"))
}

/// Global configuration loaded from `~/.config/resil/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilConfig {
    /// Policy used when no profile is named.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Named policies, e.g. `[profiles.llm]`.
    #[serde(default)]
    pub profiles: BTreeMap<String, RetryConfig>,
}

impl ResilConfig {
    /// Settings for `profile`, or the default `[retry]` section when `None`.
    pub fn retry_config(&self, profile: Option<&str>) -> Result<&RetryConfig> {
        match profile {
            None => Ok(&self.retry),
            Some(name) => self
                .profiles
                .get(name)
                .with_context(|| format!("no retry profile named {name:?}")),
        }
    }

    pub fn policy(&self, profile: Option<&str>) -> Result<RetryPolicy> {
        let cfg = self.retry_config(profile)?;
        cfg.to_policy()
            .with_context(|| format!("invalid retry profile {}", profile.unwrap_or("default")))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("resil")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ResilConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ResilConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<ResilConfig> {
    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ResilConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
