//! User settings (`config.toml`)
//!
//! ```toml
//! jobs = 8
//! timeout_secs = 30
//! retry_delay_ms = 250
//! threshold = 0.7
//! ```
//!
//! Every key is optional; command line flags win over the file.

use crate::paths;
use anyhow::{Context, Result, bail};
use conformance::{CallPolicy, RetryPolicy, RunOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default failure threshold: controls at or above this impact fail the run
pub const DEFAULT_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Controls evaluated concurrently
    pub jobs: usize,
    /// Per-call observation timeout
    pub timeout_secs: u64,
    /// Delay before the single retry of a transient failure
    pub retry_delay_ms: u64,
    /// Lowest impact whose failure fails the run
    pub threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        let call = CallPolicy::default();
        Self {
            jobs: RunOptions::default().jobs,
            timeout_secs: call.timeout.as_secs(),
            retry_delay_ms: u64::try_from(call.retry.base_delay.as_millis()).unwrap_or(u64::MAX),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Settings {
    /// Load from the config directory, or defaults if there is no file
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load from a specific file, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Settings file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            bail!("jobs must be at least 1");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            bail!("threshold must be between 0.0 and 1.0, got {}", self.threshold);
        }
        Ok(())
    }

    /// Observation call policy
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy::with_delay(Duration::from_millis(self.retry_delay_ms)),
            ..CallPolicy::default()
        }
    }

    /// Runner options
    pub fn run_options(&self) -> RunOptions {
        RunOptions { jobs: self.jobs }
    }
}
