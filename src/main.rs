use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, warn};
use tokio::sync::mpsc;

use hangar_launcher::config::LauncherConfig;
use hangar_launcher::engine::state::UpdateState;
use hangar_launcher::engine::{TitleController, TitleEvent};
use hangar_launcher::env;
use hangar_launcher::error::LauncherError;
use hangar_launcher::util::format_bytes;

#[derive(Parser, Debug)]
#[command(
    name = "Hangar Launcher",
    author,
    version,
    about = "Keeps a catalogue of titles downloaded, up to date and launchable"
)]
struct Cli {
    /// Path to the titles config file (defaults to the per-user data dir).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Check every title against its remote source and print the result.
    Status,
    /// Download and install whatever is missing or outdated.
    Sync {
        /// Only sync the named title.
        title: Option<String>,
    },
    /// Make sure the named title is current, then start it.
    Play { title: String },
}

#[tokio::main]
async fn main() -> Result<(), LauncherError> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(env::default_config_path);
    let config = LauncherConfig::load_or_default(&config_path)?;
    env::ensure_base_dirs().map_err(|e| LauncherError::io("unable to create data dirs", e))?;

    match cli.command {
        CliCommand::Status => status(&config).await,
        CliCommand::Sync { title } => sync(&config, title.as_deref()).await,
        CliCommand::Play { title } => play(&config, &title).await,
    }
}

async fn status(config: &LauncherConfig) -> Result<(), LauncherError> {
    if config.titles.is_empty() {
        println!("No titles configured.");
        return Ok(());
    }
    for spec in &config.titles {
        let mut controller = controller_for(config, spec.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        controller.initialise(&tx).await;
        drop(tx);
        while rx.try_recv().is_ok() {}

        let local = controller
            .title
            .local_version
            .as_ref()
            .map_or_else(|| "-".to_owned(), ToString::to_string);
        let online = controller
            .title
            .online_version
            .as_ref()
            .map_or_else(|| "-".to_owned(), ToString::to_string);
        println!(
            "{:<24} {:<16} local {:<10} online {}",
            controller.title.name,
            controller.state().status_text(),
            local,
            online
        );
    }
    Ok(())
}

async fn sync(config: &LauncherConfig, only: Option<&str>) -> Result<(), LauncherError> {
    let mut synced = 0usize;
    for spec in &config.titles {
        if only.is_some_and(|name| name != spec.name) {
            continue;
        }
        synced += 1;
        let mut controller = controller_for(config, spec.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = tokio::spawn(report_progress(spec.name.clone(), rx));
        controller.initialise(&tx).await;

        if matches!(
            controller.state(),
            UpdateState::ReadyToInstall | UpdateState::ReadyToUpdate | UpdateState::ReadyToFind
        ) {
            controller.activate(&tx).await;
        }
        drop(tx);
        if let Err(err) = reporter.await {
            warn!("{}: progress reporter panicked: {err}", spec.name);
        }

        match controller.state() {
            UpdateState::ReadyToPlay => println!("{}: up to date", spec.name),
            UpdateState::FailedRetryable { reason } | UpdateState::FailedTerminal { reason } => {
                error!("{}: {reason}", spec.name);
            }
            other => println!("{}: {}", spec.name, other.status_text()),
        }
    }
    if let Some(name) = only
        && synced == 0
    {
        return Err(LauncherError::Parse {
            text: name.to_owned(),
            reason: "no such title in the config file",
        });
    }
    Ok(())
}

async fn play(config: &LauncherConfig, name: &str) -> Result<(), LauncherError> {
    let Some(spec) = config.titles.iter().find(|spec| spec.name == name) else {
        return Err(LauncherError::Parse {
            text: name.to_owned(),
            reason: "no such title in the config file",
        });
    };
    let mut controller = controller_for(config, spec.clone());
    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(spec.name.clone(), rx));
    controller.initialise(&tx).await;

    // Bring the title current first; a fresh install may need two steps
    // (download then install both happen inside one activation).
    if matches!(
        controller.state(),
        UpdateState::ReadyToInstall | UpdateState::ReadyToUpdate | UpdateState::ReadyToFind
    ) {
        controller.activate(&tx).await;
    }
    if matches!(controller.state(), UpdateState::ReadyToPlay) {
        controller.activate(&tx).await;
    } else {
        error!(
            "{}: not playable ({})",
            spec.name,
            controller.state().status_text()
        );
    }
    drop(tx);
    if let Err(err) = reporter.await {
        warn!("{}: progress reporter panicked: {err}", spec.name);
    }
    Ok(())
}

fn controller_for(config: &LauncherConfig, spec: hangar_launcher::config::TitleSpec) -> TitleController {
    TitleController::new(spec, config.clone(), Arc::new(AtomicBool::new(false)))
}

/// Drain controller events, rendering download progress as a terminal bar.
async fn report_progress(name: String, mut rx: mpsc::UnboundedReceiver<TitleEvent>) {
    let mut bar: Option<ProgressBar> = None;
    while let Some(event) = rx.recv().await {
        match event.state {
            UpdateState::Downloading { received, total } => {
                let pb = bar.get_or_insert_with(|| {
                    let pb = match total {
                        Some(total) => {
                            let pb = ProgressBar::new(total);
                            pb.set_style(
                                ProgressStyle::default_bar()
                                    .template(
                                        "  {msg} [{bar:30.white/dim}] {bytes}/{total_bytes} {bytes_per_sec}",
                                    )
                                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                                    .progress_chars("=>-"),
                            );
                            pb
                        }
                        None => ProgressBar::new_spinner(),
                    };
                    pb.enable_steady_tick(Duration::from_millis(100));
                    pb.set_message(name.clone());
                    pb
                });
                if total.is_some() {
                    pb.set_position(received);
                } else {
                    pb.set_message(format!("{name} {}", format_bytes(received)));
                }
            }
            UpdateState::Installing => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
                println!("{name}: installing...");
            }
            _ => {
                if let Some(pb) = bar.take() {
                    pb.finish_and_clear();
                }
            }
        }
    }
}
