//! Hangar driver. `id` is `"Owner/Slug"`.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::catalogue::RepositoryKind;
use crate::error::PluginError;

use super::{status_error, write_artifact, LocalFile, RepositoryDriver, VersionData};

#[derive(Debug, Deserialize)]
struct VersionPage {
    result: Vec<HangarVersion>,
}

#[derive(Debug, Deserialize, Clone)]
struct HangarVersion {
    name: String,
    downloads: HashMap<String, PlatformDownload>,
}

#[derive(Debug, Deserialize, Clone)]
struct PlatformDownload {
    #[serde(rename = "downloadUrl")]
    download_url: Option<String>,
    #[serde(rename = "fileInfo")]
    file_info: Option<FileInfo>,
}

#[derive(Debug, Deserialize, Clone)]
struct FileInfo {
    name: String,
}

/// Talks to `hangar.papermc.io/api/v1/projects/{owner}/{slug}/versions`.
pub struct HangarDriver {
    client: Client,
    api_base: String,
}

impl HangarDriver {
    /// Builds a driver using `client` for all requests.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            api_base: "https://hangar.papermc.io/api/v1".to_string(),
        }
    }

    #[cfg(test)]
    fn with_base(client: Client, api_base: String) -> Self {
        Self { client, api_base }
    }

    fn split(&self, id: &str) -> Result<(&str, &str), PluginError> {
        id.split_once('/')
            .filter(|(owner, slug)| !owner.is_empty() && !slug.is_empty())
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: id.to_string(),
                reason: format!("'{id}' is not a valid Owner/Slug Hangar id"),
            })
    }

    async fn versions(&self, id: &str) -> Result<Vec<HangarVersion>, PluginError> {
        let (owner, slug) = self.split(id)?;
        let url = format!("{}/projects/{owner}/{slug}/versions", self.api_base);
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
        let page: VersionPage = response
            .json()
            .await
            .map_err(|e| PluginError::DownloadFailed {
                name: id.to_string(),
                reason: format!("malformed Hangar versions response: {e}"),
            })?;
        Ok(page.result)
    }

    fn first_download(version: &HangarVersion) -> Option<&PlatformDownload> {
        version.downloads.values().next()
    }
}

#[async_trait]
impl RepositoryDriver for HangarDriver {
    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Hangar
    }

    async fn get_latest_version(&self, id: &str) -> Result<VersionData, PluginError> {
        let versions = self.versions(id).await?;
        let first = versions
            .first()
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: id.to_string(),
                reason: "project has no published versions".to_string(),
            })?;
        Ok(VersionData {
            download_id: first.name.clone(),
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
                download_id: v.name.clone(),
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
                download_id: v.name.clone(),
                version: v.name,
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
        let versions = self.versions(id).await?;
        let version = versions
            .iter()
            .find(|v| v.name == version_data.version)
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: id.to_string(),
                reason: format!("no version named '{}'", version_data.version),
            })?;

        let download = match file_name_pattern {
            Some(re) => version.downloads.values().find(|d| {
                d.file_info
                    .as_ref()
                    .is_some_and(|info| re.is_match(&info.name))
            }),
            None => Self::first_download(version),
        }
        .ok_or_else(|| PluginError::DownloadFailed {
            name: id.to_string(),
            reason: "no platform download matched the configured file name pattern".to_string(),
        })?;

        let url = download
            .download_url
            .clone()
            .ok_or_else(|| PluginError::DownloadFailed {
                name: id.to_string(),
                reason: "Hangar platform entry has no downloadUrl".to_string(),
            })?;
        let file_name = download
            .file_info
            .as_ref()
            .map(|info| info.name.clone())
            .unwrap_or_else(|| format!("{id}-{}.jar", version_data.version));

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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_latest_version_returns_first_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects/Owner/Slug/versions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [{"name": "1.0.0", "downloads": {}}],
            })))
            .mount(&server)
            .await;

        let driver = HangarDriver::with_base(Client::new(), server.uri());
        let version = driver.get_latest_version("Owner/Slug").await.unwrap();
        assert_eq!(version.version, "1.0.0");
    }

    #[tokio::test]
    async fn download_by_version_uses_first_platform_when_no_pattern() {
        let server = MockServer::start().await;
        let file_url = format!("{}/file", server.uri());
        Mock::given(method("GET"))
            .and(path("/projects/Owner/Slug/versions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": [{
                    "name": "1.0.0",
                    "downloads": {
                        "PAPER": {
                            "downloadUrl": file_url,
                            "fileInfo": {"name": "plugin.jar"},
                        },
                    },
                }],
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jar".to_vec()))
            .mount(&server)
            .await;

        let driver = HangarDriver::with_base(Client::new(), server.uri());
        let dir = tempfile::tempdir().unwrap();
        let version = VersionData {
            download_id: "1.0.0".to_string(),
            version: "1.0.0".to_string(),
        };
        let local = driver
            .download_by_version("Owner/Slug", &version, None, dir.path())
            .await
            .unwrap();
        assert_eq!(local.file_name, "plugin.jar");
    }
}
