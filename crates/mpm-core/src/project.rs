//! Composition root: wires the Manifest Model, Repository Source Layer,
//! Event Hook Bus, and Lifecycle Orchestrator into a single project handle,
//! the way `init`/`open` are expected to produce one ready-to-use graph
//! rather than a DI container assembling it lazily.

use std::path::{Path, PathBuf};

use reqwest::Client;

use crate::deps::DependencyAnalyzer;
use crate::error::ProjectError;
use crate::events::EventBus;
use crate::lifecycle::Lifecycle;
use crate::manifest::{Manifest, PluginSpec};
use crate::repository::{RepositoryManager, RepositorySource};

const DATA_DIR_NAME: &str = ".mpm";
const PLUGINS_DIR_NAME: &str = "plugins";

/// An open project: a manifest at a known path, a host plugin directory,
/// and every collaborator the [`Lifecycle`] needs, constructed once.
pub struct Project {
    root: PathBuf,
    manifest_path: PathBuf,
    plugins_dir: PathBuf,
    lifecycle: Lifecycle,
    analyzer: DependencyAnalyzer,
    events: EventBus,
}

impl Project {
    /// Opens an already-initialized project. `root` may be the project
    /// directory itself or a direct path to its manifest file. Fails with
    /// [`ProjectError::NotInitialized`] if no manifest can be found there.
    pub fn open(
        root: impl Into<PathBuf>,
        repository_sources: Vec<Box<dyn RepositorySource>>,
    ) -> Result<Self, ProjectError> {
        let provided = root.into();
        let manifest_path =
            mpm_common::paths::resolve_manifest_file_path(&provided).map_err(|_| {
                ProjectError::NotInitialized {
                    path: provided.join(mpm_common::paths::DEFAULT_MANIFEST_FILE),
                }
            })?;
        let root = mpm_common::paths::parent_dir(&manifest_path).map_err(|_| {
            ProjectError::NotInitialized {
                path: manifest_path.clone(),
            }
        })?;
        let manifest = Manifest::load(&manifest_path)?;
        Ok(Self::build(root, manifest_path, manifest, repository_sources))
    }

    /// Initializes a fresh project rooted at `root`: scans the plugin
    /// directory for artifacts already present and seeds an `unmanaged`
    /// manifest entry for each, then writes the manifest. Fails with
    /// [`ProjectError::InitializationFailed`] if a manifest already exists
    /// and `overwrite` is false.
    pub fn init(
        root: impl Into<PathBuf>,
        name: impl Into<String>,
        overwrite: bool,
        repository_sources: Vec<Box<dyn RepositorySource>>,
    ) -> Result<Self, ProjectError> {
        let root = root.into();
        let manifest_path = root.join(mpm_common::paths::DEFAULT_MANIFEST_FILE);
        if manifest_path.is_file() && !overwrite {
            return Err(ProjectError::InitializationFailed {
                path: root,
                message: "a manifest already exists; pass overwrite to replace it".to_string(),
            });
        }

        let plugins_dir = root.join(PLUGINS_DIR_NAME);
        std::fs::create_dir_all(&plugins_dir).map_err(|e| ProjectError::InitializationFailed {
            path: root.clone(),
            message: e.to_string(),
        })?;

        let mut manifest = Manifest::new(name);
        let analyzer = DependencyAnalyzer::new(&plugins_dir);
        let mut discovered: Vec<String> = analyzer
            .installed_artifacts()
            .map_err(|e| ProjectError::InitializationFailed {
                path: root.clone(),
                message: e.to_string(),
            })?
            .into_iter()
            .map(|(found_name, _)| found_name)
            .collect();
        discovered.sort_by_key(|n| n.to_lowercase());
        for found_name in discovered {
            manifest.add(found_name, PluginSpec::Unmanaged).ok();
        }

        manifest.save(&manifest_path)?;
        tracing::info!(path = %manifest_path.display(), "initialized project manifest");

        Ok(Self::build(root, manifest_path, manifest, repository_sources))
    }

    fn build(
        root: PathBuf,
        manifest_path: PathBuf,
        manifest: Manifest,
        repository_sources: Vec<Box<dyn RepositorySource>>,
    ) -> Self {
        let plugins_dir = root.join(PLUGINS_DIR_NAME);
        let data_dir = root.join(DATA_DIR_NAME);
        let repositories = RepositoryManager::new(repository_sources);
        let client = Client::new();
        let events = EventBus::new();
        let analyzer = DependencyAnalyzer::new(&plugins_dir);
        let lifecycle = Lifecycle::new(
            manifest_path.clone(),
            manifest,
            plugins_dir.clone(),
            data_dir,
            repositories,
            client,
            events.clone(),
        );
        Self {
            root,
            manifest_path,
            plugins_dir,
            lifecycle,
            analyzer,
            events,
        }
    }

    /// The lifecycle orchestrator: `add`/`install`/`uninstall`/`update`/...
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// The dependency analyzer over this project's plugin directory.
    pub fn analyzer(&self) -> &DependencyAnalyzer {
        &self.analyzer
    }

    /// The event bus shared with the lifecycle orchestrator. Subscribe
    /// before invoking a lifecycle operation that should observe it.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Root directory this project was opened at.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the manifest file.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Path to the host plugin directory.
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Clears the Repository Source Layer's listing cache. Backs the
    /// `reload` CLI operation.
    pub async fn reload(&self) {
        self.lifecycle.reload().await;
    }
}
