//! Resolution Engine: turns a plugin's [`VersionSpecifier`] into a concrete
//! [`VersionData`] plus the [`RepositoryConfig`] used to fetch it.

use reqwest::Client;

use crate::catalogue::RepositoryConfig;
use crate::downloader::{self, VersionData};
use crate::error::PluginError;
use crate::manifest::{Manifest, PluginSpec};
use crate::metadata::MetadataStore;
use crate::repository::RepositoryManager;
use crate::version::VersionSpecifier;

/// What [`Resolver::resolve`] produces for one plugin.
pub struct Resolution {
    /// The concrete version chosen.
    pub version_data: VersionData,
    /// The repository route used to fetch it.
    pub repository: RepositoryConfig,
}

/// Resolves manifest entries to concrete versions, per §4.F.
pub struct Resolver<'a> {
    repositories: &'a RepositoryManager,
    metadata: &'a MetadataStore,
    client: Client,
}

impl<'a> Resolver<'a> {
    /// Builds a resolver over the given repository aggregator, metadata
    /// store, and shared HTTP client.
    pub fn new(repositories: &'a RepositoryManager, metadata: &'a MetadataStore, client: Client) -> Self {
        Self {
            repositories,
            metadata,
            client,
        }
    }

    pub(crate) async fn repository_config(&self, name: &str) -> Result<RepositoryConfig, PluginError> {
        let file = self
            .repositories
            .get_repository_file(name)
            .await
            .ok_or_else(|| PluginError::RepositoryNotFound(name.to_string()))?;
        file.repositories
            .into_iter()
            .next()
            .ok_or_else(|| PluginError::RepositoryNotFound(name.to_string()))
    }

    pub(crate) fn driver(&self, cfg: &RepositoryConfig) -> Result<Box<dyn downloader::RepositoryDriver>, PluginError> {
        downloader::driver_for(cfg.kind, self.client.clone())
            .ok_or_else(|| PluginError::UnsupportedRepository(format!("{:?}", cfg.kind)))
    }

    /// Resolves `name`'s requirement against `manifest`. Does not download
    /// anything.
    pub async fn resolve(
        &self,
        manifest: &Manifest,
        name: &str,
    ) -> Result<Resolution, PluginError> {
        manifest
            .validate_sync()
            .map_err(|e| PluginError::VersionResolutionFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let spec = manifest
            .plugins
            .get(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        let PluginSpec::Managed(requirement) = spec else {
            return Err(PluginError::NotManaged(name.to_string()));
        };

        let cfg = self.repository_config(name).await?;
        let driver = self.driver(&cfg)?;

        let version_data = match requirement {
            VersionSpecifier::Latest => driver.get_latest_version(&cfg.id).await?,
            VersionSpecifier::Fixed(v) => driver.get_version_by_name(&cfg.id, v).await?,
            VersionSpecifier::Pattern(pattern) => {
                let re = regex::Regex::new(pattern).map_err(|e| {
                    PluginError::VersionResolutionFailed {
                        name: name.to_string(),
                        reason: format!("invalid pattern '{pattern}': {e}"),
                    }
                })?;
                let all = driver.get_all_versions(&cfg.id).await?;
                all.into_iter()
                    .find(|v| re.is_match(&v.version))
                    .ok_or_else(|| PluginError::VersionResolutionFailed {
                        name: name.to_string(),
                        reason: format!("no version matched pattern '{pattern}'"),
                    })?
            }
            VersionSpecifier::Tag(_) => {
                return Err(PluginError::VersionResolutionFailed {
                    name: name.to_string(),
                    reason: "tag unsupported".to_string(),
                })
            }
            VersionSpecifier::Sync(target) => {
                self.resolve_sync(manifest, name, &cfg, driver.as_ref(), target)
                    .await?
            }
        };

        Ok(Resolution {
            version_data,
            repository: cfg,
        })
    }

    async fn resolve_sync(
        &self,
        manifest: &Manifest,
        name: &str,
        dependent_cfg: &RepositoryConfig,
        dependent_driver: &dyn downloader::RepositoryDriver,
        target: &str,
    ) -> Result<VersionData, PluginError> {
        let target_spec = manifest
            .plugins
            .get(target)
            .ok_or_else(|| PluginError::VersionResolutionFailed {
                name: name.to_string(),
                reason: format!("sync target '{target}' does not exist"),
            })?;
        let PluginSpec::Managed(target_requirement) = target_spec else {
            return Err(PluginError::VersionResolutionFailed {
                name: name.to_string(),
                reason: format!("sync target '{target}' is unmanaged"),
            });
        };
        if target_requirement.is_sync() {
            return Err(PluginError::VersionResolutionFailed {
                name: name.to_string(),
                reason: format!("sync target '{target}' is itself a sync specifier"),
            });
        }

        let resolved_raw = match target_requirement {
            VersionSpecifier::Latest => match self.metadata.load(target).await {
                Ok(md) => md.version.current.raw,
                Err(_) => {
                    let target_cfg = self.repository_config(target).await?;
                    let target_driver = self.driver(&target_cfg)?;
                    target_driver.get_latest_version(&target_cfg.id).await?.version
                }
            },
            VersionSpecifier::Fixed(v) => v.clone(),
            VersionSpecifier::Pattern(pattern) => {
                let target_cfg = self.repository_config(target).await?;
                let target_driver = self.driver(&target_cfg)?;
                let re = regex::Regex::new(pattern).map_err(|e| {
                    PluginError::VersionResolutionFailed {
                        name: name.to_string(),
                        reason: format!("invalid pattern '{pattern}' on sync target: {e}"),
                    }
                })?;
                target_driver
                    .get_all_versions(&target_cfg.id)
                    .await?
                    .into_iter()
                    .find(|v| re.is_match(&v.version))
                    .ok_or_else(|| PluginError::VersionResolutionFailed {
                        name: name.to_string(),
                        reason: format!("sync target '{target}' has no version matching '{pattern}'"),
                    })?
                    .version
            }
            VersionSpecifier::Tag(_) => {
                return Err(PluginError::VersionResolutionFailed {
                    name: name.to_string(),
                    reason: "tag unsupported".to_string(),
                })
            }
            VersionSpecifier::Sync(_) => unreachable!("validated non-sync above"),
        };

        dependent_driver
            .get_version_by_name(&dependent_cfg.id, &resolved_raw)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{RepositoryFile, RepositoryKind};
    use crate::manifest::Manifest;
    use crate::repository::{LocalSource, RepositoryManager};

    fn write_catalogue_entry(dir: &std::path::Path, name: &str) {
        std::fs::create_dir_all(dir.join("plugins")).unwrap();
        let file = RepositoryFile {
            id: name.to_string(),
            website: None,
            source: None,
            license: None,
            repositories: vec![RepositoryConfig {
                kind: RepositoryKind::Modrinth,
                id: format!("project-{name}"),
                version_pattern: None,
                download_url_template: None,
                file_name_pattern: None,
                file_name_template: None,
            }],
        };
        std::fs::write(
            dir.join("plugins").join(format!("{name}.json")),
            serde_json::to_vec(&file).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn resolve_fails_not_found_for_missing_manifest_entry() {
        let catalogue_dir = tempfile::tempdir().unwrap();
        let repositories =
            RepositoryManager::new(vec![Box::new(LocalSource::new(catalogue_dir.path()))]);
        let metadata_dir = tempfile::tempdir().unwrap();
        let metadata = MetadataStore::new(metadata_dir.path());
        let resolver = Resolver::new(&repositories, &metadata, Client::new());

        let manifest = Manifest::new("server");
        let err = resolver.resolve(&manifest, "Ghost").await.unwrap_err();
        assert!(matches!(err, PluginError::NotFound(n) if n == "Ghost"));
    }

    #[tokio::test]
    async fn resolve_fails_not_managed_for_unmanaged_entry() {
        let catalogue_dir = tempfile::tempdir().unwrap();
        let repositories =
            RepositoryManager::new(vec![Box::new(LocalSource::new(catalogue_dir.path()))]);
        let metadata_dir = tempfile::tempdir().unwrap();
        let metadata = MetadataStore::new(metadata_dir.path());
        let resolver = Resolver::new(&repositories, &metadata, Client::new());

        let mut manifest = Manifest::new("server");
        manifest.add("WorldEdit", PluginSpec::Unmanaged).unwrap();
        let err = resolver.resolve(&manifest, "WorldEdit").await.unwrap_err();
        assert!(matches!(err, PluginError::NotManaged(n) if n == "WorldEdit"));
    }

    #[tokio::test]
    async fn resolve_tag_is_explicitly_unsupported() {
        let catalogue_dir = tempfile::tempdir().unwrap();
        write_catalogue_entry(catalogue_dir.path(), "Essentials");
        let repositories =
            RepositoryManager::new(vec![Box::new(LocalSource::new(catalogue_dir.path()))]);
        let metadata_dir = tempfile::tempdir().unwrap();
        let metadata = MetadataStore::new(metadata_dir.path());
        let resolver = Resolver::new(&repositories, &metadata, Client::new());

        let mut manifest = Manifest::new("server");
        manifest
            .add(
                "Essentials",
                PluginSpec::Managed(VersionSpecifier::Tag("nightly".to_string())),
            )
            .unwrap();
        let err = resolver.resolve(&manifest, "Essentials").await.unwrap_err();
        match err {
            PluginError::VersionResolutionFailed { reason, .. } => {
                assert_eq!(reason, "tag unsupported");
            }
            other => panic!("expected VersionResolutionFailed, got {other:?}"),
        }
    }
}
