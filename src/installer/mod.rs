use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use sysinfo::System;
use zip::read::ZipArchive;

use crate::engine::models::Title;
use crate::error::LauncherError;
use crate::version::VersionValue;

/// Replace a title's local install with the contents of a downloaded archive
/// and update the version bookkeeping.
///
/// The archive is expected to hold a single top-level directory named after
/// the title (possibly with a legacy `_v<version>` suffix); extraction targets
/// the games root and entries are not remapped. A failed wipe or extraction
/// leaves the directory as-is; there is no rollback to a prior good state.
/// Calling this twice with the same archive and version is idempotent.
pub async fn install(
    title: &mut Title,
    archive: &Path,
    version: &VersionValue,
    keep_archive: bool,
) -> Result<PathBuf, LauncherError> {
    let games_root = title.games_root().to_path_buf();
    let canonical = games_root.join(&title.name);
    let archive = archive.to_path_buf();
    let version_file = title.version_file();
    let update_file = title.update_file();
    let version_text = version.to_string();

    // Wiping, unzipping and marker writes are blocking disk I/O.
    tokio::task::spawn_blocking(move || {
        wipe_install_dir(&canonical)?;
        extract_archive(&archive, &games_root)?;

        if !keep_archive {
            if let Err(err) = fs::remove_file(&archive) {
                warn!(
                    "install: could not delete archive {}: {err}",
                    archive.display()
                );
            }
        }

        write_version_marker(&version_file, &version_text)?;

        // Pending-update marker is obsolete once the install landed.
        if update_file.exists()
            && let Err(err) = fs::remove_file(&update_file)
        {
            warn!(
                "install: could not delete update marker {}: {err}",
                update_file.display()
            );
        }
        Ok::<(), LauncherError>(())
    })
    .await
    .map_err(|e| LauncherError::io("install task failed", io::Error::other(e)))??;

    // The freshly extracted folder may use the legacy versioned name; pick up
    // the new version string and the effective directory in one pass.
    title.refresh_local_state();
    let effective = title.install_dir().to_path_buf();
    info!(
        "install: {} {} ready at {}",
        title.name,
        version,
        effective.display()
    );
    Ok(effective)
}

fn wipe_install_dir(canonical: &Path) -> Result<(), LauncherError> {
    if !canonical.exists() {
        return Ok(());
    }
    debug!("install: removing {}", canonical.display());
    fs::remove_dir_all(canonical).map_err(|err| {
        if executable_running_under(canonical) {
            LauncherError::FileLocked {
                path: canonical.to_path_buf(),
            }
        } else {
            LauncherError::io("unable to remove old install", err)
        }
    })
}

/// Whether any running process executes from below `dir`.
fn executable_running_under(dir: &Path) -> bool {
    let system = System::new_all();
    system
        .processes()
        .values()
        .any(|process| process.exe().is_some_and(|exe| exe.starts_with(dir)))
}

fn extract_archive(archive_path: &Path, dest_root: &Path) -> Result<(), LauncherError> {
    debug!(
        "install: extracting {} into {}",
        archive_path.display(),
        dest_root.display()
    );
    let file = fs::File::open(archive_path)
        .map_err(|e| LauncherError::io("unable to open archive", e))?;
    let mut archive = ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("install: skipping archive entry with unsafe path");
            continue;
        };
        let out_path = dest_root.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| LauncherError::io("unable to create extracted dir", e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LauncherError::io("unable to create extracted dir", e))?;
        }
        let mut out_file = fs::File::create(&out_path)
            .map_err(|e| LauncherError::io("unable to create extracted file", e))?;
        io::copy(&mut entry, &mut out_file)
            .map_err(|e| LauncherError::io("unable to write extracted file", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = fs::set_permissions(&out_path, fs::Permissions::from_mode(mode));
            }
        }
    }
    Ok(())
}

/// Full-file overwrite via write-then-rename so a concurrent reader never
/// observes a half-written version string.
fn write_version_marker(marker: &Path, version_text: &str) -> Result<(), LauncherError> {
    let tmp = marker.with_extension("txt.tmp");
    fs::write(&tmp, version_text)
        .map_err(|e| LauncherError::io("unable to write version marker", e))?;
    fs::rename(&tmp, marker)
        .map_err(|e| LauncherError::io("unable to replace version marker", e))
}
