use std::env;
use std::fs;
use std::path::PathBuf;

/// Returns the root directory used by the launcher for local data.
pub fn default_app_dir() -> PathBuf {
    let base = match env::consts::OS {
        "windows" => env::var_os("LOCALAPPDATA")
            .or_else(|| env::var_os("APPDATA"))
            .map(PathBuf::from),
        "macos" => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join("Library").join("Application Support")),
        _ => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".local").join("share")),
    }
    .unwrap_or_else(|| PathBuf::from("."));

    base.join("hangar-launcher")
}

/// Default root for installed titles; each title owns one directory below it.
pub fn default_games_dir() -> PathBuf {
    default_app_dir().join("games")
}

/// Default location for downloaded archives before they are installed.
pub fn default_downloads_dir() -> PathBuf {
    default_app_dir().join("downloads")
}

pub fn default_config_path() -> PathBuf {
    default_app_dir().join("titles.json")
}

/// Create the on-disk folder layout expected by the launcher.
pub fn ensure_base_dirs() -> std::io::Result<()> {
    for dir in [
        default_app_dir(),
        default_games_dir(),
        default_downloads_dir(),
    ] {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
