//! SpigotMC driver, via the public Spiget mirror API. `id` is a numeric
//! SpigotMC resource id.

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::catalogue::RepositoryKind;
use crate::error::PluginError;

use super::{status_error, write_artifact, LocalFile, RepositoryDriver, VersionData};

#[derive(Debug, Deserialize)]
struct SpigetVersion {
    id: u64,
    name: String,
}

/// Talks to `api.spiget.org/v2/resources/{id}/versions`.
///
/// Spiget exposes exactly one artifact per version (no file list to choose
/// from), so `file_name_pattern` is accepted but never consulted.
pub struct SpigotDriver {
    client: Client,
    api_base: String,
}

impl SpigotDriver {
    /// Builds a driver using `client` for all requests.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            api_base: "https://api.spiget.org/v2".to_string(),
        }
    }

    #[cfg(test)]
    fn with_base(client: Client, api_base: String) -> Self {
        Self { client, api_base }
    }

    async fn versions(&self, id: &str) -> Result<Vec<SpigetVersion>, PluginError> {
        let url = format!(
            "{}/resources/{id}/versions?sort=-releaseDate&size=500",
            self.api_base
        );
        let response = self
            .client
            .get(&url)
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
                reason: format!("malformed Spiget versions response: {e}"),
            })
    }
}

#[async_trait]
impl RepositoryDriver for SpigotDriver {
    fn kind(&self) -> RepositoryKind {
        RepositoryKind::SpigotMC
    }

    async fn get_latest_version(&self, id: &str) -> Result<VersionData, PluginError> {
        let versions = self.versions(id).await?;
        let first = versions
            .first()
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: id.to_string(),
                reason: "resource has no published versions".to_string(),
            })?;
        Ok(VersionData {
            download_id: first.id.to_string(),
            version: first.name.clone(),
        })
    }

    async fn get_version_by_name(
        &self,
        id: &str,
        raw_version: &str,
    ) -> Result<VersionData, PluginError> {
        let versions = self.versions(id).await?;
        versions
            .iter()
            .find(|v| v.name == raw_version)
            .map(|v| VersionData {
                download_id: v.id.to_string(),
                version: v.name.clone(),
            })
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: id.to_string(),
                reason: format!("no version named '{raw_version}'"),
            })
    }

    async fn get_all_versions(&self, id: &str) -> Result<Vec<VersionData>, PluginError> {
        let versions = self.versions(id).await?;
        Ok(versions
            .into_iter()
            .map(|v| VersionData {
                download_id: v.id.to_string(),
                version: v.name,
            })
            .collect())
    }

    async fn download_by_version(
        &self,
        id: &str,
        version_data: &VersionData,
        _file_name_pattern: Option<&Regex>,
        dest_dir: &Path,
    ) -> Result<LocalFile, PluginError> {
        let url = format!(
            "{}/resources/{id}/versions/{}/download",
            self.api_base, version_data.download_id
        );
        let response = self
            .client
            .get(&url)
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
        let file_name = format!("{id}-{}.jar", version_data.version);
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
