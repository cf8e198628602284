//! GitHub Releases driver. `id` is `"owner/repo"`.

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::catalogue::RepositoryKind;
use crate::error::PluginError;

use super::{select_file, status_error, write_artifact, LocalFile, RepositoryDriver, VersionData};

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Deserialize, Clone)]
struct Asset {
    id: u64,
    name: String,
    browser_download_url: String,
}

/// Talks to `api.github.com/repos/{owner}/{repo}/releases`.
pub struct GitHubDriver {
    client: Client,
    api_base: String,
}

impl GitHubDriver {
    /// Builds a driver using `client` for all requests.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            api_base: "https://api.github.com".to_string(),
        }
    }

    #[cfg(test)]
    fn with_base(client: Client, api_base: String) -> Self {
        Self { client, api_base }
    }

    fn split(&self, id: &str) -> Result<(&str, &str), PluginError> {
        id.split_once('/')
            .filter(|(owner, repo)| !owner.is_empty() && !repo.is_empty())
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: id.to_string(),
                reason: format!("'{id}' is not a valid owner/repo GitHub id"),
            })
    }

    async fn releases(&self, id: &str) -> Result<Vec<Release>, PluginError> {
        let (owner, repo) = self.split(id)?;
        let url = format!("{}/repos/{owner}/{repo}/releases", self.api_base);
        let response = self
            .client
            .get(&url)
            .header("User-Agent", "mpm")
            .send()
            .await
            .map_err(|e| PluginError::DownloadFailed {
                name: id.to_string(),
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(status_error(id, response.status()));
        }
        response
            .json()
            .await
            .map_err(|e| PluginError::DownloadFailed {
                name: id.to_string(),
                reason: format!("malformed GitHub releases response: {e}"),
            })
    }
}

#[async_trait]
impl RepositoryDriver for GitHubDriver {
    fn kind(&self) -> RepositoryKind {
        RepositoryKind::GitHub
    }

    async fn get_latest_version(&self, id: &str) -> Result<VersionData, PluginError> {
        let releases = self.releases(id).await?;
        let first = releases
            .first()
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: id.to_string(),
                reason: "repository has no releases".to_string(),
            })?;
        Ok(VersionData {
            download_id: first.tag_name.clone(),
            version: first.tag_name.clone(),
        })
    }

    async fn get_version_by_name(
        &self,
        id: &str,
        raw_version: &str,
    ) -> Result<VersionData, PluginError> {
        let releases = self.releases(id).await?;
        releases
            .iter()
            .find(|r| r.tag_name == raw_version)
            .map(|r| VersionData {
                download_id: r.tag_name.clone(),
                version: r.tag_name.clone(),
            })
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: id.to_string(),
                reason: format!("no release tagged '{raw_version}'"),
            })
    }

    async fn get_all_versions(&self, id: &str) -> Result<Vec<VersionData>, PluginError> {
        let releases = self.releases(id).await?;
        Ok(releases
            .into_iter()
            .map(|r| VersionData {
                download_id: r.tag_name.clone(),
                version: r.tag_name,
            })
            .collect())
    }

    async fn download_by_version(
        &self,
        id: &str,
        version_data: &VersionData,
        file_name_pattern: Option<&Regex>,
        dest_dir: &Path,
    ) -> Result<LocalFile, PluginError> {
        let releases = self.releases(id).await?;
        let release = releases
            .iter()
            .find(|r| r.tag_name == version_data.version)
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: id.to_string(),
                reason: format!("no release tagged '{}'", version_data.version),
            })?;
        let candidates: Vec<(String, String)> = release
            .assets
            .iter()
            .map(|a| (a.name.clone(), a.browser_download_url.clone()))
            .collect();
        let (file_name, url) = select_file(&candidates, file_name_pattern)
            .ok_or_else(|| PluginError::DownloadFailed {
                name: id.to_string(),
                reason: "no release asset matched the configured file name pattern".to_string(),
            })?
            .clone();

        let response = self
            .client
            .get(&url)
            .header("User-Agent", "mpm")
            .send()
            .await
            .map_err(|e| PluginError::DownloadFailed {
                name: id.to_string(),
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(status_error(id, response.status()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PluginError::DownloadFailed {
                name: id.to_string(),
                reason: e.to_string(),
            })?;
        let sha256 = write_artifact(dest_dir, &file_name, &bytes)
            .await
            .map_err(|e| PluginError::DownloadFailed {
                name: id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(LocalFile {
            path: dest_dir.join(&file_name),
            file_name,
            sha256: Some(sha256),
            url,
        })
    }
}
