use std::path::Path;
use std::process::{Command, Stdio};

use log::{info, warn};

use crate::error::LauncherError;

/// Starts a title's installed executable.
///
/// One atomic spawn call: either the process starts or a `Launch` error is
/// returned. The launcher does not track the child afterwards.
#[derive(Clone, Default)]
pub struct TitleLauncher;

impl TitleLauncher {
    pub fn new() -> Self {
        Self
    }

    pub fn launch(&self, exe_path: &Path) -> Result<(), LauncherError> {
        if !exe_path.exists() {
            warn!("launch: executable not found at {}", exe_path.display());
            return Err(LauncherError::Launch {
                exe: exe_path.to_path_buf(),
                details: "executable not found".into(),
            });
        }

        let mut cmd = Command::new(exe_path);
        if let Some(dir) = exe_path.parent() {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        cmd.spawn().map_err(|e| LauncherError::Launch {
            exe: exe_path.to_path_buf(),
            details: e.to_string(),
        })?;
        info!("launch: started {}", exe_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_executable_is_a_launch_error() {
        let launcher = TitleLauncher::new();
        let err = launcher
            .launch(Path::new("/nonexistent/Game.exe"))
            .expect_err("missing exe should fail");
        assert!(matches!(err, LauncherError::Launch { .. }));
    }
}
