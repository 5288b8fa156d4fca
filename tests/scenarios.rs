//! End-to-end state-machine runs against a local mock server: fresh install,
//! up-to-date check, failed update download and release-feed install.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;

use hangar_launcher::config::{LauncherConfig, TitleSpec};
use hangar_launcher::engine::models::RemoteSource;
use hangar_launcher::engine::state::UpdateState;
use hangar_launcher::engine::{TitleController, TitleEvent};
use hangar_launcher::networking::Downloader;
use hangar_launcher::process::TitleLauncher;
use hangar_launcher::resolver::VersionResolver;

fn config(root: &Path) -> LauncherConfig {
    LauncherConfig {
        games_root: root.join("games"),
        downloads_root: root.join("downloads"),
        keep_downloads: false,
        check_cooldown_minutes: 15,
        titles: Vec::new(),
    }
}

fn direct_links_controller(config: LauncherConfig, server_url: &str) -> TitleController {
    TitleController::new(
        TitleSpec {
            name: "Game".into(),
            exe: "Game.exe".into(),
            source: Some(RemoteSource::DirectLinks {
                version_url: Some(format!("{server_url}/version.txt")),
                download_url: format!("{server_url}/Game.zip"),
            }),
        },
        config,
        Arc::new(AtomicBool::new(false)),
    )
}

/// Zip holding `<folder>/<exe>`, the layout every release archive uses.
fn zip_bytes(folder: &str, exe: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    writer
        .add_directory(format!("{folder}/"), options)
        .expect("directory entry");
    writer
        .start_file(format!("{folder}/{exe}"), options)
        .expect("file entry");
    writer.write_all(b"executable bytes").expect("entry body");
    writer.finish().expect("archive finalized").into_inner()
}

fn install_fake_copy(config: &LauncherConfig, name: &str, version: &str) {
    let dir = config.games_root.join(name);
    fs::create_dir_all(&dir).expect("install dir");
    fs::write(dir.join(format!("{name}.exe")), "old bytes").expect("exe");
    fs::write(
        config.games_root.join(format!("{name}-version.txt")),
        version,
    )
    .expect("version marker");
}

/// Push the version marker's mtime past the cooldown so a check runs.
fn age_version_marker(config: &LauncherConfig, name: &str) {
    let marker = config.games_root.join(format!("{name}-version.txt"));
    let file = fs::OpenOptions::new()
        .append(true)
        .open(&marker)
        .expect("marker open");
    file.set_modified(SystemTime::now() - Duration::from_secs(3600))
        .expect("marker mtime");
}

fn drain(rx: &mut mpsc::UnboundedReceiver<TitleEvent>) -> Vec<TitleEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn fresh_install_over_direct_links_ends_playable() {
    let mut server = mockito::Server::new_async().await;
    let version_mock = server
        .mock("GET", "/version.txt")
        .with_body("v2.0")
        .create_async()
        .await;
    let archive_mock = server
        .mock("GET", "/Game.zip")
        .with_body(zip_bytes("Game", "Game.exe"))
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    fs::create_dir_all(&config.games_root).expect("games root");
    let mut controller = direct_links_controller(config.clone(), &server.url());

    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.initialise(&tx).await;
    assert!(matches!(controller.state(), UpdateState::ReadyToInstall));

    controller.activate(&tx).await;
    assert!(matches!(controller.state(), UpdateState::ReadyToPlay));
    assert!(
        config
            .games_root
            .join("Game")
            .join("Game.exe")
            .exists()
    );
    assert_eq!(
        fs::read_to_string(config.games_root.join("Game-version.txt")).expect("marker"),
        "2.0"
    );
    assert!(
        !config
            .downloads_root
            .join("Game_v2.0.zip")
            .exists(),
        "keep_downloads=false must delete the archive"
    );

    // Busy states are never actionable and come in download-then-install
    // order, ending on a playable state.
    let events = drain(&mut rx);
    for event in &events {
        if matches!(
            event.state,
            UpdateState::Downloading { .. } | UpdateState::Installing
        ) {
            assert!(!event.actionable, "{:?} must not be actionable", event.state);
        }
    }
    let installing_at = events
        .iter()
        .position(|e| matches!(e.state, UpdateState::Installing))
        .expect("an Installing event");
    let last_download_at = events
        .iter()
        .rposition(|e| matches!(e.state, UpdateState::Downloading { .. }))
        .expect("a Downloading event");
    assert!(last_download_at < installing_at);
    assert_eq!(
        events[last_download_at].percent,
        Some(100.0),
        "terminal download report covers the whole archive"
    );
    assert!(matches!(
        events.last().expect("final event").state,
        UpdateState::ReadyToPlay
    ));

    version_mock.assert_async().await;
    archive_mock.assert_async().await;
}

#[tokio::test]
async fn matching_remote_version_skips_the_download() {
    let mut server = mockito::Server::new_async().await;
    let version_mock = server
        .mock("GET", "/version.txt")
        .with_body("1.0")
        .create_async()
        .await;
    let archive_mock = server
        .mock("GET", "/Game.zip")
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    install_fake_copy(&config, "Game", "1.0");
    age_version_marker(&config, "Game");
    let mut controller = direct_links_controller(config, &server.url());

    let (tx, _rx) = mpsc::unbounded_channel();
    controller.initialise(&tx).await;

    assert!(matches!(controller.state(), UpdateState::ReadyToPlay));
    version_mock.assert_async().await;
    archive_mock.assert_async().await;
}

#[tokio::test]
async fn failed_update_download_is_retryable_and_leaves_local_files_intact() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/version.txt")
        .with_body("1.1")
        .create_async()
        .await;
    server
        .mock("GET", "/Game.zip")
        .with_status(500)
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    install_fake_copy(&config, "Game", "1.0");
    age_version_marker(&config, "Game");
    let mut controller = direct_links_controller(config.clone(), &server.url());

    let (tx, _rx) = mpsc::unbounded_channel();
    controller.initialise(&tx).await;
    assert!(matches!(controller.state(), UpdateState::ReadyToUpdate));
    assert_eq!(
        fs::read_to_string(config.games_root.join("Game-update.txt")).expect("pending marker"),
        "1.1"
    );

    controller.activate(&tx).await;
    assert!(matches!(
        controller.state(),
        UpdateState::FailedRetryable { .. }
    ));
    assert_eq!(
        fs::read_to_string(config.games_root.join("Game").join("Game.exe")).expect("exe"),
        "old bytes"
    );
    assert_eq!(
        fs::read_to_string(config.games_root.join("Game-version.txt")).expect("marker"),
        "1.0"
    );
    assert_eq!(
        fs::read_to_string(config.games_root.join("Game-update.txt")).expect("pending marker"),
        "1.1"
    );
}

#[tokio::test]
async fn release_feed_install_skips_assetless_releases() {
    let mut server = mockito::Server::new_async().await;
    let archive_url = format!("{}/assets/Game-2.9.zip", server.url());
    let releases = serde_json::json!([
        { "tag_name": "v3.0", "assets": [] },
        {
            "tag_name": "v2.9",
            "assets": [
                { "name": "Game-2.9.zip", "browser_download_url": archive_url }
            ]
        }
    ]);
    server
        .mock("GET", "/repos/hangar/game/releases")
        .with_header("content-type", "application/json")
        .with_body(releases.to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/assets/Game-2.9.zip")
        .with_body(zip_bytes("Game", "Game.exe"))
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    fs::create_dir_all(&config.games_root).expect("games root");
    let mut controller = TitleController::with_services(
        TitleSpec {
            name: "Game".into(),
            exe: "Game.exe".into(),
            source: Some(RemoteSource::ReleaseFeed {
                owner: "hangar".into(),
                repo: "game".into(),
                asset_pattern: None,
            }),
        },
        config.clone(),
        VersionResolver::new().with_releases_api_base(server.url()),
        Downloader::new(),
        TitleLauncher::new(),
        Arc::new(AtomicBool::new(false)),
    );

    let (tx, _rx) = mpsc::unbounded_channel();
    controller.initialise(&tx).await;
    assert!(matches!(controller.state(), UpdateState::ReadyToInstall));
    assert_eq!(
        controller
            .title
            .online_version
            .as_ref()
            .map(ToString::to_string)
            .as_deref(),
        Some("2.9")
    );

    controller.activate(&tx).await;
    assert!(matches!(controller.state(), UpdateState::ReadyToPlay));
    assert_eq!(
        fs::read_to_string(config.games_root.join("Game-version.txt")).expect("marker"),
        "2.9"
    );
}

#[tokio::test]
async fn retry_after_a_failed_download_succeeds_once_the_remote_recovers() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/version.txt")
        .with_body("2.0")
        .create_async()
        .await;
    let broken = server
        .mock("GET", "/Game.zip")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    fs::create_dir_all(&config.games_root).expect("games root");
    let mut controller = direct_links_controller(config.clone(), &server.url());

    let (tx, _rx) = mpsc::unbounded_channel();
    controller.initialise(&tx).await;
    controller.activate(&tx).await;
    assert!(matches!(
        controller.state(),
        UpdateState::FailedRetryable { .. }
    ));
    broken.assert_async().await;

    // Remote comes back. Retry re-runs the version check first, then the
    // next activation downloads and installs.
    server
        .mock("GET", "/Game.zip")
        .with_body(zip_bytes("Game", "Game.exe"))
        .create_async()
        .await;
    controller.activate(&tx).await;
    assert!(matches!(controller.state(), UpdateState::ReadyToInstall));
    controller.activate(&tx).await;
    assert!(matches!(controller.state(), UpdateState::ReadyToPlay));
    assert_eq!(
        fs::read_to_string(config.games_root.join("Game-version.txt")).expect("marker"),
        "2.0"
    );
}
