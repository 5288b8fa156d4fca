use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::models::RemoteSource;
use crate::env;
use crate::error::LauncherError;

const DEFAULT_COOLDOWN_MINUTES: u64 = 15;

/// Static description of one managed title, as read from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleSpec {
    /// Internal name; the install directory and marker files derive from it,
    /// and the downloaded archive must contain a top-level folder with it.
    pub name: String,
    /// Executable path relative to the title's install directory.
    pub exe: String,
    #[serde(default)]
    pub source: Option<RemoteSource>,
}

/// Resolved launcher configuration, passed by value into each controller.
///
/// The core never reads ambient settings; everything it needs arrives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default = "env::default_games_dir")]
    pub games_root: PathBuf,
    #[serde(default = "env::default_downloads_dir")]
    pub downloads_root: PathBuf,
    /// Keep downloaded archives around after a successful install.
    #[serde(default)]
    pub keep_downloads: bool,
    /// Minimum interval between two remote version checks per title.
    #[serde(default = "default_cooldown_minutes")]
    pub check_cooldown_minutes: u64,
    #[serde(default)]
    pub titles: Vec<TitleSpec>,
}

fn default_cooldown_minutes() -> u64 {
    DEFAULT_COOLDOWN_MINUTES
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            games_root: env::default_games_dir(),
            downloads_root: env::default_downloads_dir(),
            keep_downloads: false,
            check_cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            titles: Vec::new(),
        }
    }
}

impl LauncherConfig {
    pub fn load(path: &Path) -> Result<Self, LauncherError> {
        debug!("config: loading {}", path.display());
        let contents = fs::read_to_string(path)
            .map_err(|e| LauncherError::io("unable to read config file", e))?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            LauncherError::io(
                "unable to parse config file",
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, LauncherError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("config: {} missing, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn check_cooldown(&self) -> Duration {
        Duration::from_secs(self.check_cooldown_minutes * 60)
    }
}
