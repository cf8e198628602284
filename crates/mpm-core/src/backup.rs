//! Backup Manager: archives the plugin directory into a ZIP and restores
//! from one, tracked by a YAML index.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;

use crate::catalogue::LOCAL_SUBTREE;
use crate::manifest::PluginName;

const INDEX_FILE: &str = "index.yaml";
const BACKUPS_DIR: &str = "backups";
const DEFAULT_RETENTION: usize = 5;

/// Why a backup was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BackupReason {
    /// Operator-requested.
    Manual,
    /// Taken automatically before `update()`.
    Update,
    /// Taken automatically before an install that could overwrite state.
    Install,
}

/// One recorded backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerBackupInfo {
    /// Unique id for this backup, also used as its directory-safe file stem.
    pub id: String,
    /// When the archive was written.
    pub created_at: DateTime<Utc>,
    /// Why it was taken.
    pub reason: BackupReason,
    /// File name of the ZIP archive under the backups directory.
    pub file_name: String,
    /// Names of managed plugins captured in this archive.
    pub plugins_included: Vec<PluginName>,
    /// Archive size in bytes.
    pub size_bytes: u64,
}

/// What a restore actually touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreResult {
    /// Plugin artifact file names restored.
    pub restored_plugins: Vec<String>,
    /// Any other (config) file names restored.
    pub restored_configs: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    #[serde(default)]
    backups: Vec<ServerBackupInfo>,
}

/// Manages point-in-time ZIP backups of a plugin directory.
pub struct BackupManager {
    root: PathBuf,
    plugins_dir: PathBuf,
}

impl BackupManager {
    /// `root` is the engine's data directory (backups live under
    /// `root/backups`); `plugins_dir` is the host plugin directory archived.
    pub fn new(root: impl Into<PathBuf>, plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            plugins_dir: plugins_dir.into(),
        }
    }

    fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUPS_DIR)
    }

    fn index_path(&self) -> PathBuf {
        self.backups_dir().join(INDEX_FILE)
    }

    fn load_index(&self) -> anyhow::Result<Index> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Index::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    fn save_index(&self, index: &Index) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(index)?;
        mpm_common::atomic::write_atomic(self.index_path(), yaml)?;
        Ok(())
    }

    /// Archives `plugins_dir` (skipping [`LOCAL_SUBTREE`]) into a new ZIP,
    /// recording it in the index.
    pub async fn create(
        &self,
        reason: BackupReason,
        plugins_included: Vec<PluginName>,
    ) -> anyhow::Result<ServerBackupInfo> {
        let id = new_backup_id();
        let created_at = Utc::now();
        let file_name = format!("backup-{}-{id}.zip", created_at.format("%Y-%m-%d-%H%M%S"));
        let backups_dir = self.backups_dir();
        let plugins_dir = self.plugins_dir.clone();
        let archive_path = backups_dir.join(&file_name);

        std::fs::create_dir_all(&backups_dir)?;
        let _guard = mpm_common::sloth::warn_if_slothful(
            5_000,
            format!("backup of {} is taking longer than expected", mpm_common::ui::quoted_path(&plugins_dir)),
        );
        let archive_path_for_blocking = archive_path.clone();
        let plugins_dir_for_blocking = plugins_dir.clone();
        tokio::task::spawn_blocking(move || {
            write_archive(&plugins_dir_for_blocking, &archive_path_for_blocking)
        })
        .await??;

        let size_bytes = tokio::fs::metadata(&archive_path).await?.len();
        let info = ServerBackupInfo {
            id,
            created_at,
            reason,
            file_name,
            plugins_included,
            size_bytes,
        };

        let mut index = self.load_index()?;
        index.backups.push(info.clone());
        self.save_index(&index)?;
        tracing::info!(backup = %info.id, "created backup");
        Ok(info)
    }

    /// Restores the backup with the given `id` into the plugin directory,
    /// first clearing it (skipping [`LOCAL_SUBTREE`]).
    pub async fn restore(&self, id: &str) -> anyhow::Result<RestoreResult> {
        let index = self.load_index()?;
        let info = index
            .backups
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| anyhow::anyhow!("no backup with id '{id}'"))?
            .clone();
        let archive_path = self.backups_dir().join(&info.file_name);

        clear_plugins_dir(&self.plugins_dir)?;

        let _guard = mpm_common::sloth::warn_if_slothful(
            5_000,
            format!("restoring backup {id} is taking longer than expected"),
        );
        let plugins_dir = self.plugins_dir.clone();
        let result = tokio::task::spawn_blocking(move || extract_archive(&archive_path, &plugins_dir))
            .await??;
        tracing::info!(backup = %id, "restored backup");
        Ok(result)
    }

    /// Deletes the archive for `id`, then its index entry. If the file
    /// delete fails, the index is left untouched.
    pub async fn delete_backup(&self, id: &str) -> anyhow::Result<()> {
        let mut index = self.load_index()?;
        let pos = index
            .backups
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| anyhow::anyhow!("no backup with id '{id}'"))?;
        let archive_path = self.backups_dir().join(&index.backups[pos].file_name);

        tokio::fs::remove_file(&archive_path).await?;
        index.backups.remove(pos);
        self.save_index(&index)?;
        Ok(())
    }

    /// Keeps only the `keep` most recent backups (default 5), deleting the
    /// rest (file then index entry, oldest first).
    pub async fn cleanup_old_backups(&self, keep: Option<usize>) -> anyhow::Result<usize> {
        let keep = keep.unwrap_or(DEFAULT_RETENTION);
        let mut index = self.load_index()?;
        index.backups.sort_by_key(|b| b.created_at);
        let excess = index.backups.len().saturating_sub(keep);
        let to_remove: Vec<String> = index.backups[..excess].iter().map(|b| b.id.clone()).collect();
        drop(index);

        let mut removed = 0;
        for id in to_remove {
            self.delete_backup(&id).await?;
            removed += 1;
        }
        Ok(removed)
    }
}

fn new_backup_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn walk_files(root: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .and_then(|rel| rel.components().next())
                .map(|first| first.as_os_str() != LOCAL_SUBTREE)
                .unwrap_or(true)
        })
        .map(|e| e.path().to_path_buf())
        .collect()
}

fn write_archive(plugins_dir: &Path, archive_path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(archive_path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for path in walk_files(plugins_dir) {
        let rel = path.strip_prefix(plugins_dir)?;
        let name = rel.to_string_lossy().replace('\\', "/");
        zip.start_file(name, options)?;
        let mut contents = Vec::new();
        std::fs::File::open(&path)?.read_to_end(&mut contents)?;
        zip.write_all(&contents)?;
    }
    zip.finish()?;
    Ok(())
}

fn clear_plugins_dir(plugins_dir: &Path) -> anyhow::Result<()> {
    if !plugins_dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(plugins_dir)? {
        let entry = entry?;
        if entry.file_name() == LOCAL_SUBTREE {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Extracts `archive_path` into `dest_dir`, rejecting any entry whose
/// normalized path would escape `dest_dir` (zip-slip). Normalization walks
/// path components rather than calling `canonicalize`, since the
/// destination path does not exist until the entry is written.
fn extract_archive(archive_path: &Path, dest_dir: &Path) -> anyhow::Result<RestoreResult> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut result = RestoreResult::default();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(enclosed) = entry.enclosed_name() else {
            anyhow::bail!("zip entry '{}' has an unsafe path", entry.name());
        };
        let dest_path = safe_join(dest_dir, &enclosed)?;

        if entry.is_dir() {
            std::fs::create_dir_all(&dest_path)?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        std::fs::write(&dest_path, &contents)?;

        let file_name = dest_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if file_name.ends_with(".jar") {
            result.restored_plugins.push(file_name);
        } else {
            result.restored_configs.push(file_name);
        }
    }
    Ok(result)
}

/// Joins `relative` onto `base`, normalizing `.`/`..` components by hand and
/// failing if the result would leave `base`.
fn safe_join(base: &Path, relative: &Path) -> anyhow::Result<PathBuf> {
    let mut depth: i64 = 0;
    let mut joined = base.to_path_buf();
    for component in relative.components() {
        match component {
            std::path::Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    anyhow::bail!(
                        "zip entry '{}' escapes the destination directory",
                        relative.display()
                    );
                }
                joined.pop();
            }
            std::path::Component::RootDir | std::path::Component::Prefix(_) => {
                anyhow::bail!(
                    "zip entry '{}' has an absolute path",
                    relative.display()
                );
            }
        }
    }
    Ok(joined)
}
