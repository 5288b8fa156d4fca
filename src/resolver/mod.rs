use std::time::Duration;

use log::{debug, info, warn};
use regex::RegexBuilder;
use reqwest::Client;
use serde::Deserialize;

use crate::engine::models::RemoteSource;
use crate::error::LauncherError;
use crate::version::VersionValue;

const RELEASES_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "hangar-launcher";

/// Newest available build for a title: its version and where to fetch it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub version: VersionValue,
    pub download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Clone)]
pub struct VersionResolver {
    client: Client,
    releases_api_base: String,
}

impl VersionResolver {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|err| {
                warn!("resolver: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self::with_client(client)
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            releases_api_base: RELEASES_API_BASE.to_owned(),
        }
    }

    /// Point the releases listing at a different host (test servers).
    pub fn with_releases_api_base(mut self, base: impl Into<String>) -> Self {
        self.releases_api_base = base.into();
        self
    }

    /// Find the newest available version and its download URL.
    ///
    /// One round trip per call; no title state is mutated here, the caller
    /// applies the result. `fallback_pattern` is used for release feeds that
    /// do not carry their own asset pattern.
    pub async fn resolve(
        &self,
        source: &RemoteSource,
        fallback_pattern: &str,
    ) -> Result<Resolved, LauncherError> {
        match source {
            RemoteSource::DirectLinks {
                version_url: Some(version_url),
                download_url,
            } => self.resolve_direct(version_url, download_url).await,
            RemoteSource::DirectLinks {
                version_url: None, ..
            } => Err(LauncherError::SourceUnavailable),
            RemoteSource::ReleaseFeed {
                owner,
                repo,
                asset_pattern,
            } => {
                let pattern = asset_pattern.as_deref().unwrap_or(fallback_pattern);
                self.resolve_release_feed(owner, repo, pattern).await
            }
        }
    }

    async fn resolve_direct(
        &self,
        version_url: &str,
        download_url: &str,
    ) -> Result<Resolved, LauncherError> {
        debug!("resolver: GET {version_url}");
        let response = self
            .client
            .get(version_url)
            .send()
            .await
            .map_err(|e| LauncherError::network_from("version check", e))?;
        if !response.status().is_success() {
            return Err(LauncherError::network(
                "version check",
                format!("version endpoint returned HTTP {}", response.status()),
            ));
        }
        let body = response
            .text()
            .await
            .map_err(|e| LauncherError::network_from("version check", e))?;
        let version: VersionValue = body.trim().parse()?;
        info!("resolver: {version_url} -> {version}");
        Ok(Resolved {
            version,
            download_url: download_url.to_owned(),
        })
    }

    async fn resolve_release_feed(
        &self,
        owner: &str,
        repo: &str,
        pattern: &str,
    ) -> Result<Resolved, LauncherError> {
        let url = format!("{}/repos/{owner}/{repo}/releases", self.releases_api_base);
        debug!("resolver: GET {url}");
        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| LauncherError::network_from("release listing", e))?;
        if !response.status().is_success() {
            return Err(LauncherError::network(
                "release listing",
                format!("releases endpoint returned HTTP {}", response.status()),
            ));
        }
        let releases: Vec<Release> = response
            .json()
            .await
            .map_err(|e| LauncherError::network_from("release listing", e))?;

        let matcher = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|_| LauncherError::Parse {
                text: pattern.to_owned(),
                reason: "invalid asset pattern",
            })?;

        // Releases arrive newest first; the first matching asset wins.
        for release in &releases {
            for asset in &release.assets {
                if matcher.is_match(&asset.name) {
                    let tag = release.tag_name.trim();
                    let version: VersionValue = tag.parse()?;
                    info!(
                        "resolver: {owner}/{repo} {version} -> {}",
                        asset.browser_download_url
                    );
                    return Ok(Resolved {
                        version,
                        download_url: asset.browser_download_url.clone(),
                    });
                }
            }
        }

        Err(LauncherError::AssetNotFound {
            repo: format!("{owner}/{repo}"),
            pattern: pattern.to_owned(),
        })
    }
}

impl Default for VersionResolver {
    fn default() -> Self {
        Self::new()
    }
}
