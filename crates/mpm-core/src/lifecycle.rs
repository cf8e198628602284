//! Lifecycle Orchestrator: the single entry point that sequences manifest
//! edits, metadata updates, downloads, and event dispatch for every
//! operator-facing operation.

use std::collections::HashMap;
use std::path::PathBuf;

use reqwest::Client;

use crate::backup::{BackupManager, BackupReason};
use crate::catalogue::SELF_ARTIFACT_NAME;
use crate::deps::DependencyAnalyzer;
use crate::error::PluginError;
use crate::events::{EventBus, EventKind};
use crate::manifest::{Manifest, PluginName, PluginSpec};
use crate::metadata::{HistoryAction, MetadataStore};
use crate::repository::RepositoryManager;
use crate::resolver::Resolver;
use crate::version::VersionSpecifier;

/// What `install` actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallResult {
    /// Whether a new or changed artifact was placed.
    pub installed: bool,
    /// The old file name, if it was replaced.
    pub removed: Option<String>,
}

/// One entry of an outdated-check pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedEntry {
    /// The plugin checked.
    pub name: PluginName,
    /// Its currently installed (normalized) version.
    pub current: String,
    /// The newest version known upstream (normalized).
    pub latest: String,
    /// Whether `current != latest`.
    pub needs_update: bool,
}

/// What happened to one plugin during an `update()` pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Already current; nothing to do.
    UpToDate,
    /// Installed successfully.
    Updated(InstallResult),
    /// An event subscriber cancelled the install.
    Cancelled,
    /// The plugin is locked against updates.
    Locked,
    /// The install attempt failed.
    Failed(String),
}

/// Tally from `installAll()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallAllSummary {
    /// Plugins whose artifact was installed or changed.
    pub installed: Vec<PluginName>,
    /// Plugins whose old artifact was replaced.
    pub removed: Vec<PluginName>,
    /// Plugins that failed, with the reason.
    pub failed: Vec<(PluginName, String)>,
}

/// Ties the Manifest Model, Metadata Store, Repository Source Layer,
/// Downloader Dispatch, Resolution Engine, Event Hook Bus, and Backup
/// Manager together behind the operator-facing operations of §4.G.
pub struct Lifecycle {
    manifest_path: PathBuf,
    manifest: tokio::sync::Mutex<Manifest>,
    metadata: MetadataStore,
    repositories: RepositoryManager,
    client: Client,
    events: EventBus,
    backups: BackupManager,
    plugins_dir: PathBuf,
}

impl Lifecycle {
    /// Builds an orchestrator over an already-loaded `manifest` persisted at
    /// `manifest_path`, with `plugins_dir` as the host plugin directory and
    /// `data_dir` as the root for metadata/backups.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manifest_path: impl Into<PathBuf>,
        manifest: Manifest,
        plugins_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        repositories: RepositoryManager,
        client: Client,
        events: EventBus,
    ) -> Self {
        let plugins_dir = plugins_dir.into();
        let data_dir = data_dir.into();
        Self {
            manifest_path: manifest_path.into(),
            manifest: tokio::sync::Mutex::new(manifest),
            metadata: MetadataStore::new(&data_dir),
            repositories,
            client,
            events,
            backups: BackupManager::new(&data_dir, &plugins_dir),
            plugins_dir,
        }
    }

    fn analyzer(&self) -> DependencyAnalyzer {
        DependencyAnalyzer::new(&self.plugins_dir)
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.repositories, &self.metadata, self.client.clone())
    }

    /// Clears the Repository Source Layer's listing cache so the next
    /// lookup re-fetches from every available source.
    pub async fn reload(&self) {
        self.repositories.reload().await;
    }

    /// Adds a manifest entry for `name` with `spec`, without downloading
    /// anything. Fires `PluginAdd`.
    pub async fn add(&self, name: &str, spec: VersionSpecifier) -> Result<(), PluginError> {
        let mut manifest = self.manifest.lock().await;

        let resolution = {
            let mut probe = manifest.clone();
            probe.add(name, PluginSpec::Managed(spec.clone()))?;
            self.resolver().resolve(&probe, name).await?
        };

        self.metadata
            .create(
                name,
                &resolution.repository,
                &resolution.version_data,
                HistoryAction::Add,
            )
            .await?;

        if self.events.fire(EventKind::PluginAdd, name) {
            self.metadata.delete(name).await?;
            return Err(PluginError::OperationCancelled {
                name: name.to_string(),
                operation: "add",
            });
        }

        let stored = match spec {
            VersionSpecifier::Fixed(_) | VersionSpecifier::Pattern(_) => {
                VersionSpecifier::Fixed(resolution.version_data.version.clone())
            }
            other => other,
        };
        manifest.add(name, PluginSpec::Managed(stored))?;
        self.save_manifest(&manifest)?;
        Ok(())
    }

    /// Resolves `name`'s requirement against the current manifest and
    /// installs whatever that resolves to, honoring `Latest`/`Fixed`/
    /// `Pattern`/`Sync` alike rather than always chasing the driver's latest.
    pub async fn install(&self, name: &str) -> Result<InstallResult, PluginError> {
        let resolution = {
            let manifest = self.manifest.lock().await;
            self.resolver().resolve(&manifest, name).await?
        };
        let cfg = resolution.repository;
        let target = resolution.version_data;
        let driver = self.resolver().driver(&cfg)?;

        let upstream_latest = match driver.get_latest_version(&cfg.id).await {
            Ok(latest) => latest,
            Err(_) => target.clone(),
        };

        let mut metadata = self
            .metadata
            .update(name, &cfg, &target, &upstream_latest, HistoryAction::Install)
            .await?;

        if self.events.fire(EventKind::PluginInstall, name) {
            return Err(PluginError::OperationCancelled {
                name: name.to_string(),
                operation: "install",
            });
        }

        let pattern = metadata
            .file_name_pattern
            .as_deref()
            .and_then(|p| regex::Regex::new(p).ok());
        let local_file = driver
            .download_by_version(&cfg.id, &target, pattern.as_ref(), &self.plugins_dir)
            .await?;

        let final_name = render_file_name(
            metadata.file_name_template.as_deref(),
            name,
            &metadata.version.current.normalized,
        );

        let mut removed = None;
        if !metadata.download.file_name.is_empty() && metadata.download.file_name != final_name {
            let old_path = self.plugins_dir.join(&metadata.download.file_name);
            if old_path.exists() {
                std::fs::remove_file(&old_path).map_err(|e| PluginError::InstallFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            }
            removed = Some(metadata.download.file_name.clone());
        }

        let final_path = self.plugins_dir.join(&final_name);
        if local_file.path != final_path {
            std::fs::copy(&local_file.path, &final_path).map_err(|e| PluginError::InstallFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            std::fs::remove_file(&local_file.path).ok();
        }

        metadata.download.url = local_file.url;
        metadata.download.download_id = target.download_id.clone();
        metadata.download.file_name = final_name;
        metadata.download.sha256 = local_file.sha256;
        self.metadata.save(name, &metadata).await?;

        Ok(InstallResult {
            installed: true,
            removed,
        })
    }

    /// Removes the installed artifact and manifest entry for `name`.
    pub async fn uninstall(&self, name: &str) -> Result<(), PluginError> {
        let mut manifest = self.manifest.lock().await;
        if !manifest.plugins.contains_key(name) {
            return Err(PluginError::NotFound(name.to_string()));
        }

        let artifact = self.analyzer().artifact_path(name).ok();

        let cancelled = match &artifact {
            Some(path) => self.events.fire_with_path(EventKind::PluginUninstall, name, path.clone()),
            None => self.events.fire(EventKind::PluginUninstall, name),
        };
        if cancelled {
            return Err(PluginError::OperationCancelled {
                name: name.to_string(),
                operation: "uninstall",
            });
        }

        if let Some(path) = artifact {
            std::fs::remove_file(&path).map_err(|e| PluginError::UninstallFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        }

        manifest.remove(name)?;
        self.save_manifest(&manifest)?;
        self.metadata.delete(name).await?;
        Ok(())
    }

    /// Removes `name` from the manifest only; no filesystem effect.
    pub async fn remove(&self, name: &str) -> Result<(), PluginError> {
        let mut manifest = self.manifest.lock().await;
        if !manifest.plugins.contains_key(name) {
            return Err(PluginError::NotFound(name.to_string()));
        }
        if self.events.fire(EventKind::PluginRemove, name) {
            return Err(PluginError::OperationCancelled {
                name: name.to_string(),
                operation: "remove",
            });
        }
        manifest.remove(name)?;
        self.save_manifest(&manifest)?;
        Ok(())
    }

    /// Deletes every installed `.jar` not declared in the manifest, skipping
    /// the `local/` subtree and the tool's own artifact. Returns the count
    /// removed.
    pub async fn remove_unmanaged(&self) -> Result<usize, PluginError> {
        let manifest = self.manifest.lock().await;
        let analyzer = self.analyzer();
        let artifacts = analyzer
            .installed_artifacts()
            .map_err(|e| PluginError::UninstallFailed {
                name: "*".to_string(),
                reason: e.to_string(),
            })?;

        let mut removed = 0;
        for (name, path) in artifacts {
            if name == SELF_ARTIFACT_NAME {
                continue;
            }
            if path
                .strip_prefix(&self.plugins_dir)
                .ok()
                .and_then(|rel| rel.components().next())
                .is_some_and(|first| first.as_os_str() == crate::catalogue::LOCAL_SUBTREE)
            {
                continue;
            }
            if manifest.plugins.contains_key(&name) {
                continue;
            }
            std::fs::remove_file(&path).map_err(|e| PluginError::UninstallFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Builds the `{name, current, latest, needsUpdate}` report for every
    /// managed, non-`Unmanaged` plugin.
    pub async fn check_all_outdated(&self) -> Result<Vec<OutdatedEntry>, PluginError> {
        let manifest = self.manifest.lock().await;
        let mut entries = Vec::new();
        for (name, spec) in &manifest.plugins {
            if spec.is_unmanaged() {
                continue;
            }
            let Ok(metadata) = self.metadata.load(name).await else {
                continue;
            };
            let resolution = self.resolver().resolve(&manifest, name).await;
            let latest_raw = match resolution {
                Ok(r) => r.version_data.version,
                Err(_) => metadata.version.latest.raw.clone(),
            };
            entries.push(OutdatedEntry {
                name: name.clone(),
                current: metadata.version.current.normalized.clone(),
                latest: latest_raw.clone(),
                needs_update: metadata.version.current.raw != latest_raw,
            });
        }
        Ok(entries)
    }

    /// Updates every outdated, unlocked plugin, then fans out to anything
    /// `sync:`-coupled to a just-updated plugin.
    pub async fn update(&self) -> Result<Vec<(PluginName, UpdateOutcome)>, PluginError> {
        let _guard = mpm_common::sloth::warn_if_slothful(10_000, "update() is taking longer than expected");
        let outdated = self.check_all_outdated().await?;
        let needs_update: Vec<&OutdatedEntry> = outdated.iter().filter(|e| e.needs_update).collect();

        if !needs_update.is_empty() {
            if let Err(e) = self.backups.create(BackupReason::Update, Vec::new()).await {
                tracing::warn!(error = %e, "pre-update backup failed; continuing");
            }
        }

        let mut results = Vec::new();
        let mut updated_names = Vec::new();

        for entry in &needs_update {
            let metadata = self.metadata.load(&entry.name).await.ok();
            if metadata.as_ref().is_some_and(|m| m.settings.lock) {
                results.push((entry.name.clone(), UpdateOutcome::Locked));
                continue;
            }

            if self.events.fire(EventKind::PluginUpdate, &entry.name) {
                if let Ok(mut m) = self.metadata.load(&entry.name).await {
                    m.history.push(crate::metadata::HistoryEntry {
                        version: m.version.current.normalized.clone(),
                        installed_at: chrono::Utc::now(),
                        action: HistoryAction::Cancelled,
                    });
                    let _ = self.metadata.save(&entry.name, &m).await;
                }
                results.push((entry.name.clone(), UpdateOutcome::Cancelled));
                continue;
            }

            match self.install(&entry.name).await {
                Ok(result) => {
                    updated_names.push(entry.name.clone());
                    results.push((entry.name.clone(), UpdateOutcome::Updated(result)));
                }
                Err(e) => results.push((entry.name.clone(), UpdateOutcome::Failed(e.to_string()))),
            }
        }

        let updated_set: std::collections::HashSet<&str> =
            updated_names.iter().map(String::as_str).collect();
        let already_handled: std::collections::HashSet<&str> =
            results.iter().map(|(n, _)| n.as_str()).collect();

        for updated in &updated_names {
            let manifest = self.manifest.lock().await;
            let dependents = manifest.get_plugins_syncing_to(updated);
            drop(manifest);
            for dependent in dependents {
                if already_handled.contains(dependent.as_str()) || updated_set.contains(dependent.as_str()) {
                    continue;
                }
                let locked = self
                    .metadata
                    .load(&dependent)
                    .await
                    .map(|m| m.settings.lock)
                    .unwrap_or(false);
                if locked {
                    results.push((dependent, UpdateOutcome::Locked));
                    continue;
                }
                match self.install(&dependent).await {
                    Ok(result) => results.push((dependent, UpdateOutcome::Updated(result))),
                    Err(e) => results.push((dependent, UpdateOutcome::Failed(e.to_string()))),
                }
            }
        }

        Ok(results)
    }

    /// Installs every managed plugin in `sync:`-respecting topological
    /// order, skipping ones whose resolved version already matches what is
    /// installed.
    pub async fn install_all(&self) -> Result<InstallAllSummary, PluginError> {
        let manifest = {
            let guard = self.manifest.lock().await;
            guard
                .validate_sync()
                .map_err(crate::error::ProjectError::SyncValidationFailed)?;
            guard.clone()
        };

        let mut summary = InstallAllSummary::default();
        let mut resolved_this_pass: HashMap<PluginName, String> = HashMap::new();

        for name in manifest.topological_order() {
            let Some(spec) = manifest.plugins.get(&name) else {
                continue;
            };
            if spec.is_unmanaged() {
                continue;
            }

            let existing = self.metadata.load(&name).await.ok();
            let target_raw = match spec.requirement() {
                Some(VersionSpecifier::Sync(target)) => resolved_this_pass.get(target).cloned(),
                Some(VersionSpecifier::Latest) => existing.as_ref().map(|m| m.version.current.raw.clone()),
                Some(VersionSpecifier::Fixed(v)) => Some(v.clone()),
                _ => None,
            };

            let needs_refresh = matches!(spec.requirement(), Some(VersionSpecifier::Latest)) || existing.is_none();
            let should_install = needs_refresh
                || existing
                    .as_ref()
                    .zip(target_raw.as_ref())
                    .is_some_and(|(m, raw)| &m.version.current.raw != raw);

            if !should_install {
                if let Some(raw) = &target_raw {
                    resolved_this_pass.insert(name.clone(), raw.clone());
                }
                continue;
            }

            if existing.is_none() {
                let resolution = match self.resolver().resolve(&manifest, &name).await {
                    Ok(r) => r,
                    Err(e) => {
                        summary.failed.push((name.clone(), e.to_string()));
                        continue;
                    }
                };
                if let Err(e) = self
                    .metadata
                    .create(&name, &resolution.repository, &resolution.version_data, HistoryAction::Add)
                    .await
                {
                    summary.failed.push((name.clone(), e.to_string()));
                    continue;
                }
                resolved_this_pass.insert(name.clone(), resolution.version_data.version.clone());
            } else if let Some(raw) = &target_raw {
                resolved_this_pass.insert(name.clone(), raw.clone());
            }

            match self.install(&name).await {
                Ok(result) => {
                    summary.installed.push(name.clone());
                    if let Some(old) = result.removed {
                        summary.removed.push(old);
                    }
                }
                Err(e) => summary.failed.push((name.clone(), e.to_string())),
            }
        }

        Ok(summary)
    }

    /// Pins `name` against `update()`. Fails if already locked.
    pub async fn lock(&self, name: &str) -> Result<(), PluginError> {
        let mut metadata = self.metadata.load(name).await?;
        if metadata.settings.lock {
            return Err(PluginError::AlreadyLocked(name.to_string()));
        }
        metadata.settings.lock = true;
        self.metadata.save(name, &metadata).await?;
        self.events.fire(EventKind::PluginLock, name);
        Ok(())
    }

    /// Un-pins `name`. Fails if not locked.
    pub async fn unlock(&self, name: &str) -> Result<(), PluginError> {
        let mut metadata = self.metadata.load(name).await?;
        if !metadata.settings.lock {
            return Err(PluginError::NotLocked(name.to_string()));
        }
        metadata.settings.lock = false;
        self.metadata.save(name, &metadata).await?;
        self.events.fire(EventKind::PluginUnlock, name);
        Ok(())
    }

    fn save_manifest(&self, manifest: &Manifest) -> Result<(), PluginError> {
        manifest
            .save(&self.manifest_path)
            .map_err(|e| PluginError::ManifestSaveFailed(e.to_string()))
    }
}

/// Fills `<pluginInfo.name>` and `<mpmInfo.version.current.normalized>`
/// placeholders in a file name template; falls back to
/// `"<name>-<normalized>.jar"` when no template is given.
fn render_file_name(template: Option<&str>, name: &str, normalized: &str) -> String {
    match template {
        Some(t) => t
            .replace("<pluginInfo.name>", name)
            .replace("<mpmInfo.version.current.normalized>", normalized),
        None => format!("{name}-{normalized}.jar"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{RepositoryConfig, RepositoryKind};
    use crate::downloader::VersionData;

    #[test]
    fn render_file_name_uses_default_when_no_template() {
        assert_eq!(render_file_name(None, "Essentials", "2.0.0"), "Essentials-2.0.0.jar");
    }

    #[test]
    fn render_file_name_fills_placeholders() {
        let rendered = render_file_name(
            Some("<pluginInfo.name>_v<mpmInfo.version.current.normalized>.jar"),
            "Essentials",
            "2.0.0",
        );
        assert_eq!(rendered, "Essentials_v2.0.0.jar");
    }

    fn repo_cfg() -> RepositoryConfig {
        RepositoryConfig {
            kind: RepositoryKind::GitHub,
            id: "owner/essentials".to_string(),
            version_pattern: None,
            download_url_template: None,
            file_name_pattern: None,
            file_name_template: None,
        }
    }

    async fn seed_lifecycle(
        data_dir: &std::path::Path,
        plugins_dir: &std::path::Path,
        manifest_path: &std::path::Path,
        name: &str,
        raw_version: &str,
    ) -> Lifecycle {
        let store = MetadataStore::new(data_dir);
        store
            .create(
                name,
                &repo_cfg(),
                &VersionData {
                    download_id: "asset-1".to_string(),
                    version: raw_version.to_string(),
                },
                HistoryAction::Add,
            )
            .await
            .unwrap();

        let mut manifest = Manifest::new("server");
        manifest
            .add(name, PluginSpec::Managed(VersionSpecifier::Latest))
            .unwrap();
        manifest.save(manifest_path).unwrap();

        Lifecycle::new(
            manifest_path,
            manifest,
            plugins_dir,
            data_dir,
            RepositoryManager::new(Vec::new()),
            reqwest::Client::new(),
            EventBus::new(),
        )
    }

    fn write_fake_jar(path: &std::path::Path, plugin_name: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("plugin.yml", zip::write::SimpleFileOptions::default())
            .unwrap();
        std::io::Write::write_all(&mut zip, format!("name: {plugin_name}\nversion: 1.0\n").as_bytes())
            .unwrap();
        zip.finish().unwrap();
    }

    #[tokio::test]
    async fn lock_then_unlock_roundtrip() {
        let data_dir = tempfile::tempdir().unwrap();
        let plugins_dir = tempfile::tempdir().unwrap();
        let manifest_path = data_dir.path().join("plugins.json");
        let lifecycle = seed_lifecycle(data_dir.path(), plugins_dir.path(), &manifest_path, "Essentials", "2.0.0").await;

        lifecycle.lock("Essentials").await.unwrap();
        assert!(matches!(
            lifecycle.lock("Essentials").await.unwrap_err(),
            PluginError::AlreadyLocked(n) if n == "Essentials"
        ));

        lifecycle.unlock("Essentials").await.unwrap();
        assert!(matches!(
            lifecycle.unlock("Essentials").await.unwrap_err(),
            PluginError::NotLocked(n) if n == "Essentials"
        ));
    }

    #[tokio::test]
    async fn remove_deletes_manifest_entry_but_leaves_artifact() {
        let data_dir = tempfile::tempdir().unwrap();
        let plugins_dir = tempfile::tempdir().unwrap();
        let manifest_path = data_dir.path().join("plugins.json");
        let lifecycle = seed_lifecycle(data_dir.path(), plugins_dir.path(), &manifest_path, "Essentials", "2.0.0").await;
        write_fake_jar(&plugins_dir.path().join("Essentials-2.0.0.jar"), "Essentials");

        lifecycle.remove("Essentials").await.unwrap();
        assert!(plugins_dir.path().join("Essentials-2.0.0.jar").exists());

        let manifest = Manifest::load(&manifest_path).unwrap();
        assert!(!manifest.plugins.contains_key("Essentials"));

        assert!(matches!(
            lifecycle.remove("Essentials").await.unwrap_err(),
            PluginError::NotFound(n) if n == "Essentials"
        ));
    }

    #[tokio::test]
    async fn uninstall_deletes_artifact_manifest_entry_and_metadata() {
        let data_dir = tempfile::tempdir().unwrap();
        let plugins_dir = tempfile::tempdir().unwrap();
        let manifest_path = data_dir.path().join("plugins.json");
        let lifecycle = seed_lifecycle(data_dir.path(), plugins_dir.path(), &manifest_path, "Essentials", "2.0.0").await;
        let artifact = plugins_dir.path().join("Essentials-2.0.0.jar");
        write_fake_jar(&artifact, "Essentials");

        lifecycle.uninstall("Essentials").await.unwrap();

        assert!(!artifact.exists());
        let manifest = Manifest::load(&manifest_path).unwrap();
        assert!(!manifest.plugins.contains_key("Essentials"));
        assert!(matches!(
            lifecycle.uninstall("Essentials").await.unwrap_err(),
            PluginError::NotFound(n) if n == "Essentials"
        ));
    }

    #[tokio::test]
    async fn remove_unmanaged_skips_local_subtree_and_self_artifact_and_managed() {
        let data_dir = tempfile::tempdir().unwrap();
        let plugins_dir = tempfile::tempdir().unwrap();
        let manifest_path = data_dir.path().join("plugins.json");
        let lifecycle = seed_lifecycle(data_dir.path(), plugins_dir.path(), &manifest_path, "Essentials", "2.0.0").await;

        write_fake_jar(&plugins_dir.path().join("Essentials-2.0.0.jar"), "Essentials");
        write_fake_jar(&plugins_dir.path().join("Stray.jar"), "Stray");
        write_fake_jar(&plugins_dir.path().join("mpm.jar"), "mpm");
        write_fake_jar(&plugins_dir.path().join("local").join("Keep.jar"), "Keep");

        let removed = lifecycle.remove_unmanaged().await.unwrap();

        assert_eq!(removed, 1);
        assert!(!plugins_dir.path().join("Stray.jar").exists());
        assert!(plugins_dir.path().join("Essentials-2.0.0.jar").exists());
        assert!(plugins_dir.path().join("mpm.jar").exists());
        assert!(plugins_dir.path().join("local").join("Keep.jar").exists());
    }

    #[tokio::test]
    async fn check_all_outdated_reports_current_as_up_to_date_when_repository_is_unreachable() {
        let data_dir = tempfile::tempdir().unwrap();
        let plugins_dir = tempfile::tempdir().unwrap();
        let manifest_path = data_dir.path().join("plugins.json");
        let lifecycle = seed_lifecycle(data_dir.path(), plugins_dir.path(), &manifest_path, "Essentials", "2.0.0").await;

        let entries = lifecycle.check_all_outdated().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Essentials");
        assert!(!entries[0].needs_update);
    }

    #[tokio::test]
    async fn install_all_surfaces_sync_validation_failure_for_a_cycle() {
        let data_dir = tempfile::tempdir().unwrap();
        let plugins_dir = tempfile::tempdir().unwrap();
        let manifest_path = data_dir.path().join("plugins.json");

        let mut manifest = Manifest::new("server");
        manifest
            .add("A", PluginSpec::Managed(VersionSpecifier::Sync("B".to_string())))
            .unwrap();
        manifest
            .add("B", PluginSpec::Managed(VersionSpecifier::Sync("A".to_string())))
            .unwrap();
        manifest.save(&manifest_path).unwrap();

        let lifecycle = Lifecycle::new(
            &manifest_path,
            manifest,
            plugins_dir.path(),
            data_dir.path(),
            RepositoryManager::new(Vec::new()),
            reqwest::Client::new(),
            EventBus::new(),
        );

        let err = lifecycle.install_all().await.unwrap_err();
        assert!(matches!(
            err,
            PluginError::Project(crate::error::ProjectError::SyncValidationFailed(_))
        ));
    }
}
