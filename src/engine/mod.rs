use std::fs;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::config::{LauncherConfig, TitleSpec};
use crate::engine::models::Title;
use crate::engine::state::UpdateState;
use crate::error::LauncherError;
use crate::installer;
use crate::networking::Downloader;
use crate::process::TitleLauncher;
use crate::resolver::{Resolved, VersionResolver};
use crate::throttle::CheckThrottle;
use crate::util::progress_percent;
use crate::version::VersionValue;

pub mod models;
pub mod state;

/// Snapshot published to observers on every state change. The display fields
/// are derived from the state at publish time, never stored independently.
#[derive(Clone, Debug)]
pub struct TitleEvent {
    pub title: String,
    pub state: UpdateState,
    pub status_text: String,
    pub actionable: bool,
    /// Download completion in percent, set while `Downloading` with a known
    /// content length.
    pub percent: Option<f32>,
}

impl TitleEvent {
    fn from_state(title: &str, state: UpdateState) -> Self {
        let percent = match &state {
            UpdateState::Downloading {
                received,
                total: total @ Some(_),
            } => Some(progress_percent(*received, *total)),
            _ => None,
        };
        Self {
            title: title.to_owned(),
            status_text: state.status_text(),
            actionable: state.is_actionable(),
            percent,
            state,
        }
    }
}

/// Per-title orchestrator: inspects local disk state, consults the remote
/// source, and drives download + install when the user activates the title.
///
/// The state machine itself serializes work: no transition lets a second
/// `activate` start anything while `Downloading` or `Installing` is active.
pub struct TitleController {
    pub title: Title,
    state: UpdateState,
    config: LauncherConfig,
    resolver: VersionResolver,
    downloader: Downloader,
    launcher: TitleLauncher,
    throttle: CheckThrottle,
    /// Last successfully resolved (version, URL), kept for download retries.
    pending: Option<Resolved>,
    cancel_flag: Arc<AtomicBool>,
}

impl TitleController {
    pub fn new(spec: TitleSpec, config: LauncherConfig, cancel_flag: Arc<AtomicBool>) -> Self {
        Self::with_services(
            spec,
            config,
            VersionResolver::new(),
            Downloader::new(),
            TitleLauncher::new(),
            cancel_flag,
        )
    }

    pub fn with_services(
        spec: TitleSpec,
        config: LauncherConfig,
        resolver: VersionResolver,
        downloader: Downloader,
        launcher: TitleLauncher,
        cancel_flag: Arc<AtomicBool>,
    ) -> Self {
        let title = Title::new(spec, &config.games_root);
        let throttle = CheckThrottle::new(config.check_cooldown());
        Self {
            title,
            state: UpdateState::Start,
            config,
            resolver,
            downloader,
            launcher,
            throttle,
            pending: None,
            cancel_flag,
        }
    }

    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    /// Inspect local disk state and, unless throttled, ask the remote source
    /// for the newest version. Runs once after construction.
    pub async fn initialise(&mut self, updates: &mpsc::UnboundedSender<TitleEvent>) {
        self.set_state(UpdateState::Start, updates);

        let checkable = self
            .title
            .source
            .as_ref()
            .is_some_and(|source| source.can_check_version());
        if !checkable {
            debug!("{}: no version source configured", self.title.name);
            self.set_state(UpdateState::ReadyToFind, updates);
            return;
        }

        let skip = self.title.is_installed()
            && self.title.version_file().exists()
            && !self.title.update_file().exists()
            && self.throttle.should_skip(&self.title.version_file());
        if skip {
            info!("{}: recently checked, skipping remote check", self.title.name);
            self.set_state(UpdateState::ReadyToPlay, updates);
            return;
        }

        self.run_resolve(updates).await;
    }

    /// The single entry point behind the front end's button.
    pub async fn activate(&mut self, updates: &mpsc::UnboundedSender<TitleEvent>) {
        match self.state.clone() {
            UpdateState::ReadyToPlay => {
                if let Err(err) = self.launcher.launch(&self.title.exe_path()) {
                    error!("{}: {}", self.title.name, err.diagnostic());
                }
            }
            UpdateState::ReadyToFind => {
                if self.can_check_version() {
                    self.run_resolve(updates).await;
                } else if let Some(target) = self.download_target() {
                    self.run_download_and_install(target, updates).await;
                } else {
                    // No source at all; resolving reports the failure.
                    self.run_resolve(updates).await;
                }
            }
            UpdateState::ReadyToInstall | UpdateState::ReadyToUpdate => {
                if let Some(target) = self.download_target() {
                    self.run_download_and_install(target, updates).await;
                } else {
                    warn!("{}: no download target, re-checking", self.title.name);
                    self.run_resolve(updates).await;
                }
            }
            // Retry re-checks the source when it can answer version queries;
            // the pure download-link flow retries the transfer directly.
            UpdateState::FailedRetryable { .. } => {
                if self.can_check_version() {
                    self.run_resolve(updates).await;
                } else if let Some(target) = self.download_target() {
                    self.run_download_and_install(target, updates).await;
                } else {
                    self.run_resolve(updates).await;
                }
            }
            // Busy and terminal states ignore the button.
            UpdateState::Start
            | UpdateState::Downloading { .. }
            | UpdateState::Installing
            | UpdateState::FailedTerminal { .. } => {
                debug!(
                    "{}: activate ignored in state {:?}",
                    self.title.name, self.state
                );
            }
        }
    }

    fn can_check_version(&self) -> bool {
        self.title
            .source
            .as_ref()
            .is_some_and(|source| source.can_check_version())
    }

    /// What to download next: the last resolved target, or the static link
    /// with the best version string we know about.
    fn download_target(&self) -> Option<Resolved> {
        if let Some(pending) = &self.pending {
            return Some(pending.clone());
        }
        let url = self
            .title
            .source
            .as_ref()
            .and_then(|source| source.static_download_url())?;
        Some(Resolved {
            version: self.best_known_version(),
            download_url: url.to_owned(),
        })
    }

    fn best_known_version(&self) -> VersionValue {
        if let Ok(contents) = fs::read_to_string(self.title.update_file())
            && let Ok(version) = contents.trim().parse()
        {
            return version;
        }
        self.title
            .online_version
            .clone()
            .or_else(|| self.title.local_version.clone())
            .unwrap_or_default()
    }

    async fn run_resolve(&mut self, updates: &mpsc::UnboundedSender<TitleEvent>) {
        let Some(source) = self.title.source.clone() else {
            self.finish_failed_resolve(LauncherError::SourceUnavailable.diagnostic(), updates);
            return;
        };
        let pattern = self.title.default_asset_pattern();
        // No state change until the check completes; the front end keeps
        // rendering the previous state as "checking".
        match self.resolver.resolve(&source, &pattern).await {
            Ok(resolved) => self.apply_resolved(resolved, updates),
            Err(err) => self.finish_failed_resolve(err.diagnostic(), updates),
        }
    }

    fn apply_resolved(
        &mut self,
        resolved: Resolved,
        updates: &mpsc::UnboundedSender<TitleEvent>,
    ) {
        info!(
            "{}: online version {} -> {}",
            self.title.name, resolved.version, resolved.download_url
        );
        self.title.online_version = Some(resolved.version.clone());

        if self.title.local_version.is_none() || !self.title.is_installed() {
            self.pending = Some(resolved);
            self.set_state(UpdateState::ReadyToInstall, updates);
            return;
        }

        let up_to_date = self
            .title
            .local_version
            .as_ref()
            .is_some_and(|local| *local == resolved.version);
        if up_to_date {
            self.pending = Some(resolved);
            self.set_state(UpdateState::ReadyToPlay, updates);
        } else {
            // Record the detected version so the next launch resumes the
            // update instead of skipping the check.
            if let Err(err) = fs::write(self.title.update_file(), resolved.version.to_string()) {
                warn!(
                    "{}: could not write update marker: {err}",
                    self.title.name
                );
            }
            self.pending = Some(resolved);
            self.set_state(UpdateState::ReadyToUpdate, updates);
        }
    }

    /// A failed check is best effort when a playable copy exists; without one
    /// there is nothing to fall back to.
    fn finish_failed_resolve(
        &mut self,
        reason: String,
        updates: &mpsc::UnboundedSender<TitleEvent>,
    ) {
        if self.title.is_installed() {
            warn!(
                "{}: version check failed ({reason}); keeping installed copy playable",
                self.title.name
            );
            self.set_state(UpdateState::ReadyToPlay, updates);
        } else {
            error!("{}: version check failed: {reason}", self.title.name);
            self.set_state(UpdateState::FailedTerminal { reason }, updates);
        }
    }

    async fn run_download_and_install(
        &mut self,
        target: Resolved,
        updates: &mpsc::UnboundedSender<TitleEvent>,
    ) {
        self.set_state(
            UpdateState::Downloading {
                received: 0,
                total: None,
            },
            updates,
        );

        let dest = self
            .title
            .archive_path(&self.config.downloads_root, &target.version);
        let name = self.title.name.clone();
        let sender = updates.clone();
        let downloaded = self
            .downloader
            .download(
                &target.download_url,
                &dest,
                Some(self.cancel_flag.clone()),
                move |progress| {
                    let state = UpdateState::Downloading {
                        received: progress.received,
                        total: progress.total,
                    };
                    let _ = sender.send(TitleEvent::from_state(&name, state));
                },
            )
            .await;

        let archive = match downloaded {
            Ok(path) => path,
            Err(err) => {
                error!("{}: download failed: {}", self.title.name, err.diagnostic());
                self.set_state(
                    UpdateState::FailedRetryable {
                        reason: err.diagnostic(),
                    },
                    updates,
                );
                return;
            }
        };

        self.set_state(UpdateState::Installing, updates);
        match installer::install(
            &mut self.title,
            &archive,
            &target.version,
            self.config.keep_downloads,
        )
        .await
        {
            Ok(path) => {
                info!(
                    "{}: installed {} at {}",
                    self.title.name,
                    target.version,
                    path.display()
                );
                self.set_state(UpdateState::ReadyToPlay, updates);
            }
            Err(err) => {
                error!("{}: install failed: {}", self.title.name, err.diagnostic());
                self.set_state(
                    UpdateState::FailedRetryable {
                        reason: err.diagnostic(),
                    },
                    updates,
                );
            }
        }
    }

    /// Store the new state and notify observers before returning control.
    fn set_state(&mut self, state: UpdateState, updates: &mpsc::UnboundedSender<TitleEvent>) {
        self.state = state.clone();
        let _ = updates.send(TitleEvent::from_state(&self.title.name, state));
    }

    #[cfg(test)]
    fn force_state(&mut self, state: UpdateState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::engine::models::RemoteSource;

    fn config(root: &Path) -> LauncherConfig {
        LauncherConfig {
            games_root: root.join("games"),
            downloads_root: root.join("downloads"),
            keep_downloads: false,
            check_cooldown_minutes: 15,
            titles: Vec::new(),
        }
    }

    fn controller(spec: TitleSpec, config: LauncherConfig) -> TitleController {
        TitleController::new(spec, config, Arc::new(AtomicBool::new(false)))
    }

    fn install_fake_copy(config: &LauncherConfig, name: &str, version: &str) {
        let dir = config.games_root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{name}.exe")), "bytes").unwrap();
        fs::write(
            config.games_root.join(format!("{name}-version.txt")),
            version,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn titles_without_a_source_wait_for_one() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        fs::create_dir_all(&config.games_root).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = controller(
            TitleSpec {
                name: "Game".into(),
                exe: "Game.exe".into(),
                source: None,
            },
            config,
        );
        controller.initialise(&tx).await;

        assert!(matches!(controller.state(), UpdateState::ReadyToFind));
        // Start then ReadyToFind, both published synchronously.
        assert!(matches!(rx.try_recv().unwrap().state, UpdateState::Start));
        let event = rx.try_recv().unwrap();
        assert!(matches!(event.state, UpdateState::ReadyToFind));
        assert_eq!(event.status_text, "Get Download");
        assert!(event.actionable);
    }

    #[tokio::test]
    async fn recently_checked_installed_title_is_playable_without_a_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        install_fake_copy(&config, "Game", "1.0");
        // Marker freshly written above, so the cooldown has not expired; the
        // resolver would hit an unroutable URL if it were consulted.
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut controller = controller(
            TitleSpec {
                name: "Game".into(),
                exe: "Game.exe".into(),
                source: Some(RemoteSource::DirectLinks {
                    version_url: Some("http://127.0.0.1:9/version.txt".into()),
                    download_url: "http://127.0.0.1:9/Game.zip".into(),
                }),
            },
            config,
        );
        controller.initialise(&tx).await;

        assert!(matches!(controller.state(), UpdateState::ReadyToPlay));
    }

    #[tokio::test]
    async fn failed_check_keeps_an_installed_title_playable() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        install_fake_copy(&config, "Game", "1.0");
        // Age the marker past the cooldown so the check actually runs.
        let marker = config.games_root.join("Game-version.txt");
        let file = fs::OpenOptions::new().append(true).open(&marker).unwrap();
        file.set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(3600))
            .unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut controller = controller(
            TitleSpec {
                name: "Game".into(),
                exe: "Game.exe".into(),
                source: Some(RemoteSource::DirectLinks {
                    version_url: Some("http://127.0.0.1:9/version.txt".into()),
                    download_url: "http://127.0.0.1:9/Game.zip".into(),
                }),
            },
            config,
        );
        controller.initialise(&tx).await;

        assert!(matches!(controller.state(), UpdateState::ReadyToPlay));
    }

    #[tokio::test]
    async fn failed_check_without_a_local_copy_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        fs::create_dir_all(&config.games_root).unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut controller = controller(
            TitleSpec {
                name: "Game".into(),
                exe: "Game.exe".into(),
                source: Some(RemoteSource::DirectLinks {
                    version_url: Some("http://127.0.0.1:9/version.txt".into()),
                    download_url: "http://127.0.0.1:9/Game.zip".into(),
                }),
            },
            config,
        );
        controller.initialise(&tx).await;

        assert!(matches!(
            controller.state(),
            UpdateState::FailedTerminal { .. }
        ));
    }

    #[tokio::test]
    async fn activate_is_a_no_op_while_busy() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        fs::create_dir_all(&config.games_root).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = controller(
            TitleSpec {
                name: "Game".into(),
                exe: "Game.exe".into(),
                source: None,
            },
            config,
        );
        controller.force_state(UpdateState::Installing);
        controller.activate(&tx).await;

        assert!(matches!(controller.state(), UpdateState::Installing));
        assert!(rx.try_recv().is_err(), "no event for an ignored activation");
    }
}
