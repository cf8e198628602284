//! Modrinth driver. `id` is a Modrinth project id or slug.

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::catalogue::RepositoryKind;
use crate::error::PluginError;

use super::{select_file, status_error, write_artifact, LocalFile, RepositoryDriver, VersionData};

#[derive(Debug, Deserialize)]
struct ProjectVersion {
    id: String,
    version_number: String,
    files: Vec<VersionFile>,
}

#[derive(Debug, Deserialize, Clone)]
struct VersionFile {
    url: String,
    filename: String,
    #[serde(default)]
    primary: bool,
}

/// Talks to `api.modrinth.com/v2/project/{id}/version`.
pub struct ModrinthDriver {
    client: Client,
    api_base: String,
}

impl ModrinthDriver {
    /// Builds a driver using `client` for all requests.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            api_base: "https://api.modrinth.com/v2".to_string(),
        }
    }

    #[cfg(test)]
    fn with_base(client: Client, api_base: String) -> Self {
        Self { client, api_base }
    }

    async fn versions(&self, id: &str) -> Result<Vec<ProjectVersion>, PluginError> {
        let url = format!("{}/project/{id}/version", self.api_base);
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
                reason: format!("malformed Modrinth version response: {e}"),
            })
    }
}

#[async_trait]
impl RepositoryDriver for ModrinthDriver {
    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Modrinth
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
            download_id: first.id.clone(),
            version: first.version_number.clone(),
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
            .find(|v| v.version_number == raw_version)
            .map(|v| VersionData {
                download_id: v.id.clone(),
                version: v.version_number.clone(),
            })
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: id.to_string(),
                reason: format!("no version numbered '{raw_version}'"),
            })
    }

    async fn get_all_versions(&self, id: &str) -> Result<Vec<VersionData>, PluginError> {
        let versions = self.versions(id).await?;
        Ok(versions
            .into_iter()
            .map(|v| VersionData {
                download_id: v.id,
                version: v.version_number,
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
            .find(|v| v.id == version_data.download_id)
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: id.to_string(),
                reason: format!("no version with id '{}'", version_data.download_id),
            })?;

        let chosen = if let Some(re) = file_name_pattern {
            let candidates: Vec<(String, String)> = version
                .files
                .iter()
                .map(|f| (f.filename.clone(), f.url.clone()))
                .collect();
            select_file(&candidates, Some(re)).cloned()
        } else {
            version
                .files
                .iter()
                .find(|f| f.primary)
                .or_else(|| version.files.first())
                .map(|f| (f.filename.clone(), f.url.clone()))
        };
        let (file_name, url) = chosen.ok_or_else(|| PluginError::DownloadFailed {
            name: id.to_string(),
            reason: "no file matched the configured file name pattern".to_string(),
        })?;

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

    fn version_json(id: &str, number: &str, file_url: &str) -> serde_json::Value {
        serde_json::json!([{
            "id": id,
            "version_number": number,
            "files": [{"url": file_url, "filename": "plugin.jar", "primary": true}],
        }])
    }

    #[tokio::test]
    async fn get_latest_version_returns_first_entry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/abc/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(version_json(
                "v-1",
                "1.0.0",
                &format!("{}/file", server.uri()),
            )))
            .mount(&server)
            .await;

        let driver = ModrinthDriver::with_base(Client::new(), server.uri());
        let version = driver.get_latest_version("abc").await.unwrap();
        assert_eq!(version.version, "1.0.0");
        assert_eq!(version.download_id, "v-1");
    }

    #[tokio::test]
    async fn download_by_version_picks_primary_file() {
        let server = MockServer::start().await;
        let file_url = format!("{}/file", server.uri());
        Mock::given(method("GET"))
            .and(path("/project/abc/version"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(version_json("v-1", "1.0.0", &file_url)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"bytes".to_vec()))
            .mount(&server)
            .await;

        let driver = ModrinthDriver::with_base(Client::new(), server.uri());
        let dir = tempfile::tempdir().unwrap();
        let version = VersionData {
            download_id: "v-1".to_string(),
            version: "1.0.0".to_string(),
        };
        let local = driver
            .download_by_version("abc", &version, None, dir.path())
            .await
            .unwrap();
        assert_eq!(local.file_name, "plugin.jar");
        assert!(local.path.exists());
    }
}
