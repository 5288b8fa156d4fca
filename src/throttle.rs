use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use log::{debug, warn};

/// Rate limiter for remote version checks.
///
/// The timestamp source is the title's version-marker file: its mtime records
/// when the last check happened. Policy is touch-on-skip, leave-on-check: a
/// skipped check bumps the mtime so the next opportunity is a full cooldown
/// away, while a real check leaves it alone and the install path rewrites the
/// marker afterwards. The touch is metadata-only and never rewrites the
/// version string stored in the file.
#[derive(Debug, Clone, Copy)]
pub struct CheckThrottle {
    cooldown: Duration,
}

impl CheckThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    /// Whether the upcoming remote check should be skipped.
    ///
    /// A missing marker file never skips (the very first check always runs).
    /// Filesystem errors are treated as "check anyway" and logged.
    pub fn should_skip(&self, marker: &Path) -> bool {
        match self.evaluate(marker) {
            Ok(skip) => skip,
            Err(err) => {
                warn!(
                    "throttle: could not inspect {}: {err}; checking anyway",
                    marker.display()
                );
                false
            }
        }
    }

    fn evaluate(&self, marker: &Path) -> io::Result<bool> {
        if !marker.exists() {
            return Ok(false);
        }

        let modified = marker.metadata()?.modified()?;
        let last_checked: DateTime<Local> = modified.into();
        debug!(
            "throttle: {} last checked {}",
            marker.display(),
            last_checked.format("%Y-%m-%d %H:%M:%S")
        );

        let elapsed = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if elapsed < self.cooldown {
            touch(marker)?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// Bump the file's mtime to now without touching its contents.
fn touch(path: &Path) -> io::Result<()> {
    let file: File = OpenOptions::new().append(true).open(path)?;
    file.set_modified(SystemTime::now())
}
