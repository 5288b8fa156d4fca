use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::LauncherError;
use crate::util::{cancel_requested, format_bytes, format_speed};

// Full archives can be large; allow a long transfer but fail eventually.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const PROGRESS_TICK: Duration = Duration::from_millis(200);

/// Snapshot of a transfer in flight. `total` is absent when the remote does
/// not report a content length, in which case no percentage can be computed.
#[derive(Debug, Clone, Copy)]
pub struct DownloadProgress {
    pub received: u64,
    pub total: Option<u64>,
}

#[derive(Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(TRANSFER_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!("downloader: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self::with_client(client)
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Stream `url` to `dest`, reporting progress at a throttled cadence.
    ///
    /// The destination directory is created if absent and any partial file at
    /// `dest` is overwritten; there is no resume, every call transfers the
    /// whole archive. The final progress report always fires. A raised cancel
    /// flag aborts the transfer and removes the partial file.
    pub async fn download<F>(
        &self,
        url: &str,
        dest: &Path,
        cancel: Option<Arc<AtomicBool>>,
        mut progress: F,
    ) -> Result<PathBuf, LauncherError>
    where
        F: FnMut(DownloadProgress),
    {
        if cancel_requested(&cancel) {
            return Err(LauncherError::network("download", "cancelled"));
        }
        debug!("download: GET {url} -> {}", dest.display());
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LauncherError::network_from("download", e))?;
        if !response.status().is_success() {
            return Err(LauncherError::network(
                "download",
                format!("download returned HTTP {}", response.status()),
            ));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io("unable to create download dir", e))?;
        }
        let mut file = fs::File::create(dest)
            .await
            .map_err(|e| LauncherError::io("unable to create download file", e))?;

        let total = response.content_length();
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        let mut last_tick = Instant::now();
        let mut tick_received: u64 = 0;

        while let Some(chunk) = stream.next().await {
            if cancel_requested(&cancel) {
                let _ = fs::remove_file(dest).await;
                return Err(LauncherError::network("download", "cancelled"));
            }
            let chunk = chunk.map_err(|e| LauncherError::network_from("download", e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| LauncherError::io("unable to write download data", e))?;
            received += chunk.len() as u64;

            let elapsed = last_tick.elapsed();
            if elapsed >= PROGRESS_TICK {
                let speed = (received - tick_received) as f32 / elapsed.as_secs_f32();
                debug!(
                    "download: {} received ({})",
                    format_bytes(received),
                    format_speed(speed)
                );
                progress(DownloadProgress { received, total });
                last_tick = Instant::now();
                tick_received = received;
            }
        }

        // Terminal report, regardless of cadence.
        progress(DownloadProgress { received, total });

        file.flush()
            .await
            .map_err(|e| LauncherError::io("unable to flush download file", e))?;

        if let Some(total) = total
            && received < total
        {
            return Err(LauncherError::network(
                "download",
                format!("incomplete transfer: received {received} of {total} bytes"),
            ));
        }

        info!("download: {} complete ({received} bytes)", dest.display());
        Ok(dest.to_path_buf())
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}
