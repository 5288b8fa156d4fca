// The per-title source of truth rendered by the front end.
#[derive(Clone, Debug)]
pub enum UpdateState {
    /// Initial state while local disk state is being inspected.
    Start,
    /// Installed and current; activation launches the executable.
    ReadyToPlay,
    /// No usable remote source resolved yet; activation looks one up.
    ReadyToFind,
    /// A newer build was found; activation downloads it.
    ReadyToUpdate,
    /// Nothing installed locally; activation downloads the latest build.
    ReadyToInstall,
    Downloading { received: u64, total: Option<u64> },
    Installing,
    /// The last check, download or install failed; activation retries it.
    FailedRetryable { reason: String },
    /// No local copy exists to fall back on.
    FailedTerminal { reason: String },
}

impl UpdateState {
    /// Button label derived from the state; recomputed on every change.
    pub fn status_text(&self) -> String {
        match self {
            UpdateState::Start => "Checking For Updates...".into(),
            UpdateState::ReadyToPlay => "Play".into(),
            UpdateState::ReadyToFind => "Get Download".into(),
            UpdateState::ReadyToUpdate => "Update".into(),
            UpdateState::ReadyToInstall => "Install".into(),
            UpdateState::Downloading { .. } => "Downloading...".into(),
            UpdateState::Installing => "Installing...".into(),
            UpdateState::FailedRetryable { .. } => "Failed - Retry?".into(),
            UpdateState::FailedTerminal { .. } => "Failed".into(),
        }
    }

    /// Whether a button press would do anything in this state.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            UpdateState::ReadyToPlay
                | UpdateState::ReadyToFind
                | UpdateState::ReadyToUpdate
                | UpdateState::ReadyToInstall
                | UpdateState::FailedRetryable { .. }
        )
    }

    /// True while a download or install owns the title.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            UpdateState::Downloading { .. } | UpdateState::Installing
        )
    }
}
