//! The Metadata Store: per-plugin installation state, content-addressed by
//! [`PluginName`](crate::manifest::PluginName).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::catalogue::{RepositoryConfig, RepositoryKind};
use crate::downloader::VersionData;
use crate::error::PluginError;
use crate::manifest::PluginName;

/// An upstream version token, verbatim and normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedVersion {
    /// The raw token as returned by the upstream (e.g. `"v5.4.102"`).
    pub raw: String,
    /// `raw` after applying the repository's `versionPattern`, if any.
    pub normalized: String,
}

impl LockedVersion {
    /// Builds a [`LockedVersion`] from a raw upstream token, normalizing it
    /// against `pattern` if given.
    pub fn from_raw(raw: impl Into<String>, pattern: Option<&Regex>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw, pattern);
        Self { raw, normalized }
    }
}

fn normalize(raw: &str, pattern: Option<&Regex>) -> String {
    match pattern.and_then(|p| p.find(raw)) {
        Some(m) => m.as_str().to_string(),
        None => raw.to_string(),
    }
}

/// The downloaded-artifact record for the currently installed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Direct download URL used for the last fetch.
    pub url: String,
    /// Repository-kind-specific id (release asset id, version id, file id).
    pub download_id: String,
    /// File name as written into the plugin directory.
    pub file_name: String,
    /// Hex SHA-256 of the artifact, if the repository provided a checksum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Why a history entry was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    /// Manifest entry created (`add`).
    Add,
    /// Artifact fetched and placed (`install`).
    Install,
    /// A newer version was installed in place of an older one.
    Update,
    /// An update was cancelled by an event subscriber.
    Cancelled,
    /// The plugin was pinned against updates.
    Lock,
    /// The plugin was un-pinned.
    Unlock,
}

/// One entry in a plugin's installation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Version involved (normalized form).
    pub version: String,
    /// When this entry was recorded.
    pub installed_at: DateTime<Utc>,
    /// What happened.
    pub action: HistoryAction,
}

/// Static identity fields, set once at `create` time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// The plugin's name.
    pub name: PluginName,
    /// The raw upstream token of the currently installed version.
    pub current_version_raw: String,
}

/// Which repository this plugin resolves against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Upstream kind.
    pub kind: RepositoryKind,
    /// Kind-specific address.
    pub id: String,
}

/// Installed-vs-latest version bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// The version actually installed.
    pub current: LockedVersion,
    /// The newest version known at last check.
    pub latest: LockedVersion,
    /// When `latest` was last refreshed.
    pub last_checked_at: DateTime<Utc>,
}

/// Per-plugin operator toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// If true, `update()` skips this plugin.
    pub lock: bool,
    /// Reserved for a future scheduled-check feature; not read by this engine.
    pub auto_update: bool,
    /// Reserved for a future scheduled-check feature; not read by this engine.
    pub auto_check: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lock: false,
            auto_update: true,
            auto_check: true,
        }
    }
}

/// The full on-disk installation record for one managed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Identity.
    pub plugin_info: PluginInfo,
    /// Upstream address.
    pub repository: RepositoryRef,
    /// Version bookkeeping.
    pub version: VersionInfo,
    /// The last successful download.
    pub download: DownloadRecord,
    /// Operator toggles.
    pub settings: Settings,
    /// Append-only log of lifecycle actions.
    pub history: Vec<HistoryEntry>,
    /// Regex selecting the artifact file when a version has more than one,
    /// carried over from the owning [`RepositoryConfig`] at `create` time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name_pattern: Option<String>,
    /// Template for the installed file name, likewise carried over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name_template: Option<String>,
}

const METADATA_DIR: &str = "metadata";
const METADATA_EXT: &str = "yaml";

/// Content-addressed, per-name-serialized store of [`PluginMetadata`].
pub struct MetadataStore {
    root: PathBuf,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MetadataStore {
    /// Opens a store rooted at `root` (the engine's data directory; metadata
    /// files live under `root/metadata`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Path to a given plugin's metadata file.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root
            .join(METADATA_DIR)
            .join(format!("{name}.{METADATA_EXT}"))
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Creates a fresh metadata record for `name`, with a single `Add`
    /// history entry, and persists it.
    pub async fn create(
        &self,
        name: &str,
        repo_cfg: &RepositoryConfig,
        version_data: &VersionData,
        action: HistoryAction,
    ) -> Result<PluginMetadata, PluginError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let pattern = compiled_pattern(repo_cfg);
        let locked = LockedVersion::from_raw(version_data.version.clone(), pattern.as_ref());
        let now = Utc::now();
        let metadata = PluginMetadata {
            plugin_info: PluginInfo {
                name: name.to_string(),
                current_version_raw: version_data.version.clone(),
            },
            repository: RepositoryRef {
                kind: repo_cfg.kind,
                id: repo_cfg.id.clone(),
            },
            version: VersionInfo {
                current: locked.clone(),
                latest: locked.clone(),
                last_checked_at: now,
            },
            download: DownloadRecord {
                url: String::new(),
                download_id: version_data.download_id.clone(),
                file_name: String::new(),
                sha256: None,
            },
            settings: Settings::default(),
            history: vec![HistoryEntry {
                version: locked.normalized,
                installed_at: now,
                action,
            }],
            file_name_pattern: repo_cfg.file_name_pattern.clone(),
            file_name_template: repo_cfg.file_name_template.clone(),
        };
        self.write(name, &metadata)?;
        Ok(metadata)
    }

    /// Loads the metadata record for `name`.
    pub async fn load(&self, name: &str) -> Result<PluginMetadata, PluginError> {
        let path = self.path_for(name);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| PluginError::MetadataNotFound(name.to_string()))?;
        serde_yaml::from_str(&text).map_err(|e| PluginError::MetadataSaveFailed {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Overwrites the metadata record for `name`.
    pub async fn save(&self, name: &str, metadata: &PluginMetadata) -> Result<(), PluginError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        self.write(name, metadata)
    }

    /// Applies a resolved version to an existing record: updates `current`,
    /// refreshes `latest` from `latest_version_data`, stamps
    /// `last_checked_at`, and appends a history entry. Does not touch
    /// `download` or `settings` — callers update those separately.
    pub async fn update(
        &self,
        name: &str,
        repo_cfg: &RepositoryConfig,
        version_data: &VersionData,
        latest_version_data: &VersionData,
        action: HistoryAction,
    ) -> Result<PluginMetadata, PluginError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        let path = self.path_for(name);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| PluginError::MetadataNotFound(name.to_string()))?;
        let mut metadata: PluginMetadata =
            serde_yaml::from_str(&text).map_err(|e| PluginError::MetadataSaveFailed {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let pattern = compiled_pattern(repo_cfg);
        let current = LockedVersion::from_raw(version_data.version.clone(), pattern.as_ref());
        let latest = LockedVersion::from_raw(latest_version_data.version.clone(), pattern.as_ref());
        let now = Utc::now();

        metadata.plugin_info.current_version_raw = current.raw.clone();
        metadata.history.push(HistoryEntry {
            version: current.normalized.clone(),
            installed_at: now,
            action,
        });
        metadata.version = VersionInfo {
            current,
            latest,
            last_checked_at: now,
        };
        self.write(name, &metadata)?;
        Ok(metadata)
    }

    /// Deletes the metadata record for `name`, if present.
    pub async fn delete(&self, name: &str) -> Result<(), PluginError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;
        let path = self.path_for(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PluginError::MetadataSaveFailed {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn write(&self, name: &str, metadata: &PluginMetadata) -> Result<(), PluginError> {
        let path = self.path_for(name);
        let yaml = serde_yaml::to_string(metadata).map_err(|e| PluginError::MetadataSaveFailed {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        mpm_common::atomic::write_atomic(&path, yaml).map_err(|e| PluginError::MetadataSaveFailed {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        tracing::info!(plugin = name, path = %path.display(), "wrote metadata");
        Ok(())
    }
}

fn compiled_pattern(repo_cfg: &RepositoryConfig) -> Option<Regex> {
    repo_cfg
        .version_pattern
        .as_deref()
        .and_then(|p| Regex::new(p).ok())
}
