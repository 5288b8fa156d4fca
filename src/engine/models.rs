use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::TitleSpec;
use crate::version::VersionValue;

/// Where a title's version and download information comes from.
///
/// Set once at title creation and never mutated afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteSource {
    /// A plain-text version endpoint plus a fixed archive URL. Without a
    /// version endpoint the title is a pure download link: nothing to check,
    /// activation fetches the archive directly.
    DirectLinks {
        #[serde(default)]
        version_url: Option<String>,
        download_url: String,
    },
    /// A hosted releases listing; the asset name is matched against a
    /// case-insensitive pattern, by default `<name>(.+)?.zip`.
    ReleaseFeed {
        owner: String,
        repo: String,
        #[serde(default)]
        asset_pattern: Option<String>,
    },
}

impl RemoteSource {
    /// Whether this source can answer "what is the newest version?".
    pub fn can_check_version(&self) -> bool {
        match self {
            RemoteSource::DirectLinks { version_url, .. } => version_url.is_some(),
            RemoteSource::ReleaseFeed { .. } => true,
        }
    }

    /// Download URL known without a remote round trip, if any.
    pub fn static_download_url(&self) -> Option<&str> {
        match self {
            RemoteSource::DirectLinks { download_url, .. } => Some(download_url),
            RemoteSource::ReleaseFeed { .. } => None,
        }
    }
}

/// Locate the directory actually holding a title's files.
///
/// Older installer packaging produced folders like `MothershipDefender2_v2.3.1`
/// instead of the canonical `MothershipDefender2`; when the canonical path is
/// missing, the versioned one is probed and used if present. Re-evaluated at
/// startup and after every successful install.
pub fn resolve_effective_install_dir(
    root: &Path,
    name: &str,
    local_version: Option<&VersionValue>,
) -> PathBuf {
    let canonical = root.join(name);
    if canonical.exists() {
        return canonical;
    }
    if let Some(version) = local_version {
        let legacy = root.join(format!("{name}_v{version}"));
        if legacy.exists() {
            debug!("install dir: using legacy folder {}", legacy.display());
            return legacy;
        }
    }
    canonical
}

/// One managed, independently updatable application.
#[derive(Debug, Clone)]
pub struct Title {
    pub name: String,
    exe_name: String,
    games_root: PathBuf,
    pub source: Option<RemoteSource>,
    pub local_version: Option<VersionValue>,
    pub online_version: Option<VersionValue>,
    install_dir: PathBuf,
}

impl Title {
    pub fn new(spec: TitleSpec, games_root: &Path) -> Self {
        let local_version = read_version_file(&version_file_path(games_root, &spec.name));
        let install_dir =
            resolve_effective_install_dir(games_root, &spec.name, local_version.as_ref());
        Self {
            name: spec.name,
            exe_name: spec.exe,
            games_root: games_root.to_path_buf(),
            source: spec.source,
            local_version,
            online_version: None,
            install_dir,
        }
    }

    pub fn games_root(&self) -> &Path {
        &self.games_root
    }

    /// Directory currently holding the title's files (legacy-aware).
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn exe_path(&self) -> PathBuf {
        self.install_dir.join(&self.exe_name)
    }

    pub fn is_installed(&self) -> bool {
        self.exe_path().exists()
    }

    /// Plain-text file holding the installed version string; its mtime doubles
    /// as the check-throttle timestamp.
    pub fn version_file(&self) -> PathBuf {
        version_file_path(&self.games_root, &self.name)
    }

    /// Marker recording a detected-but-not-yet-installed online version.
    pub fn update_file(&self) -> PathBuf {
        self.games_root.join(format!("{}-update.txt", self.name))
    }

    /// Where the downloaded archive for `version` lands before installing.
    pub fn archive_path(&self, downloads_root: &Path, version: &VersionValue) -> PathBuf {
        downloads_root.join(format!("{}_v{}.zip", self.name, version))
    }

    /// Regex text used to pick this title's asset out of a release listing.
    pub fn default_asset_pattern(&self) -> String {
        format!("{}(.+)?.zip", self.name)
    }

    /// Re-read the version marker and re-resolve the effective install dir.
    pub fn refresh_local_state(&mut self) {
        self.local_version = read_version_file(&self.version_file());
        self.install_dir =
            resolve_effective_install_dir(&self.games_root, &self.name, self.local_version.as_ref());
    }
}

fn version_file_path(games_root: &Path, name: &str) -> PathBuf {
    games_root.join(format!("{name}-version.txt"))
}

fn read_version_file(path: &Path) -> Option<VersionValue> {
    let contents = fs::read_to_string(path).ok()?;
    contents.trim().parse().ok()
}
