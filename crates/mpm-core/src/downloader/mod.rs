//! Downloader Dispatch: one driver per upstream repository kind, behind a
//! single trait object so callers do a plain `match kind { ... }`.

pub mod github;
pub mod hangar;
pub mod modrinth;
pub mod spigot;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use crate::catalogue::RepositoryKind;
use crate::error::PluginError;

/// A resolved upstream version: the repository-kind-specific id needed to
/// fetch it, and the raw version token as published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionData {
    /// Release asset id / version id / file id, depending on the driver.
    pub download_id: String,
    /// The upstream's raw version token (e.g. `"v5.4.102"`).
    pub version: String,
}

/// A downloaded artifact, written to a caller-supplied directory.
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// Where the artifact was written.
    pub path: PathBuf,
    /// The file name chosen for it.
    pub file_name: String,
    /// Hex SHA-256, if the upstream published one.
    pub sha256: Option<String>,
    /// The URL it was fetched from.
    pub url: String,
}

/// The common contract every upstream kind implements.
///
/// `id` is the opaque, kind-specific address carried by
/// [`RepositoryConfig::id`](crate::catalogue::RepositoryConfig::id) (e.g.
/// `"owner/repo"` for GitHub). Parsing it into a structured address is the
/// driver's own business — folded into each call rather than exposed as a
/// separate step, since it is cheap string parsing, not a network round trip.
#[async_trait]
pub trait RepositoryDriver: Send + Sync {
    /// Which [`RepositoryKind`] this driver serves.
    fn kind(&self) -> RepositoryKind;

    /// The newest published version.
    async fn get_latest_version(&self, id: &str) -> Result<VersionData, PluginError>;

    /// The version matching `raw_version` exactly, or
    /// [`PluginError::VersionResolutionFailed`] if none does.
    async fn get_version_by_name(
        &self,
        id: &str,
        raw_version: &str,
    ) -> Result<VersionData, PluginError>;

    /// All published versions, newest first.
    async fn get_all_versions(&self, id: &str) -> Result<Vec<VersionData>, PluginError>;

    /// Downloads the artifact for `version_data` into `dest_dir`.
    ///
    /// When a version exposes more than one file: if `file_name_pattern` is
    /// `None`, the repository's primary/featured file is chosen; otherwise
    /// the first file whose name matches the regex; failure if none match.
    async fn download_by_version(
        &self,
        id: &str,
        version_data: &VersionData,
        file_name_pattern: Option<&Regex>,
        dest_dir: &Path,
    ) -> Result<LocalFile, PluginError>;
}

/// Resolves the driver for a given kind, or `None` for kinds this build does
/// not (yet) implement a remote driver for (`Local` is handled entirely by
/// the Repository Source Layer, not the Downloader Dispatch).
pub fn driver_for(kind: RepositoryKind, client: Client) -> Option<Box<dyn RepositoryDriver>> {
    match kind {
        RepositoryKind::GitHub => Some(Box::new(github::GitHubDriver::new(client))),
        RepositoryKind::Modrinth => Some(Box::new(modrinth::ModrinthDriver::new(client))),
        RepositoryKind::SpigotMC => Some(Box::new(spigot::SpigotDriver::new(client))),
        RepositoryKind::Hangar => Some(Box::new(hangar::HangarDriver::new(client))),
        RepositoryKind::Jenkins | RepositoryKind::Local => None,
    }
}

/// Writes `bytes` to `dest_dir/file_name`, returning the digest computed
/// along the way. Shared by every driver's `download_by_version`.
pub(crate) async fn write_artifact(
    dest_dir: &Path,
    file_name: &str,
    bytes: &[u8],
) -> std::io::Result<String> {
    tokio::fs::create_dir_all(dest_dir).await?;
    let path = dest_dir.join(file_name);
    tokio::fs::write(&path, bytes).await?;
    Ok(mpm_common::sha256::hex_digest_from_bytes(bytes))
}

/// Picks the file to download out of a list of `(name, url)` candidates,
/// per the artifact-selection rule in [`RepositoryDriver::download_by_version`].
pub(crate) fn select_file<'a>(
    candidates: &'a [(String, String)],
    pattern: Option<&Regex>,
) -> Option<&'a (String, String)> {
    match pattern {
        None => candidates.first(),
        Some(re) => candidates.iter().find(|(name, _)| re.is_match(name)),
    }
}

pub(crate) fn status_error(name: &str, status: reqwest::StatusCode) -> PluginError {
    PluginError::DownloadFailed {
        name: name.to_string(),
        reason: format!("upstream returned HTTP {status}"),
    }
}
