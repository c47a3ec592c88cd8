//! Path resolution for gke-conform
//!
//! # Environment Variables
//!
//! - `GKE_CONFORM_CONFIG_DIR` - Override config directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `GKE_CONFORM_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/gke-conform` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\gke-conform`
//!    - macOS/Linux: `~/.config/gke-conform`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "GKE_CONFORM_CONFIG_DIR";

const APP_DIR: &str = "gke-conform";

/// Name of the settings file inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the gke-conform config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP_DIR);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Path of the settings file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Expand ~ and environment variables in a path string.
///
/// Declaration and observation paths given on the command line go through
/// this as well, so `~/infra/outputs.json` works when quoted.
///
/// # Examples
///
/// ```ignore
/// let home_path = paths::expand("~/infra/outputs.json");
/// let var_path = paths::expand("$HOME/infra/outputs.json");
/// ```
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand a path argument that clap already parsed
pub fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => expand(s),
        None => path.to_path_buf(),
    }
}
