//! Repository Source Layer: where catalogue entries (one per plugin name)
//! come from, and the aggregator that merges several of them.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;

use crate::catalogue::RepositoryFile;
use crate::manifest::PluginName;

const CACHE_TTL: Duration = Duration::from_secs(180);
const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_FILE: &str = "_list.json";

/// Whether a source reads from the local filesystem or over the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Rooted at a local directory.
    Local,
    /// Reached over HTTP.
    Remote,
}

/// One place to look up a plugin's [`RepositoryFile`].
///
/// Remote implementations read I/O failure as "unavailable/empty/nil", never
/// a propagated error — the aggregator's contract is best-effort.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Whether this source can currently be reached.
    async fn is_available(&self) -> bool;

    /// Every plugin name this source publishes a catalogue entry for.
    async fn list_available(&self) -> Vec<PluginName>;

    /// The catalogue entry for `name`, if present.
    async fn get_repository_file(&self, name: &str) -> Option<RepositoryFile>;

    /// [`SourceKind::Local`] or [`SourceKind::Remote`].
    fn kind(&self) -> SourceKind;

    /// A human-readable identifier (root path or base URL) for logging.
    fn identifier(&self) -> String;
}

/// A source rooted at a directory of `<name>.json` catalogue files under
/// `plugins/`.
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    /// Opens a local source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }
}

#[async_trait]
impl RepositorySource for LocalSource {
    async fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    async fn list_available(&self) -> Vec<PluginName> {
        let dir = self.plugins_dir();
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            return Vec::new();
        };
        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names
    }

    async fn get_repository_file(&self, name: &str) -> Option<RepositoryFile> {
        let path = self.plugins_dir().join(format!("{name}.json"));
        let text = tokio::fs::read_to_string(path).await.ok()?;
        serde_json::from_str(&text).ok()
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn identifier(&self) -> String {
        self.root.display().to_string()
    }
}

/// A source reached over HTTP: `<base>/_list.json` for the index,
/// `<base>/plugins/<name>.json` for individual entries.
pub struct RemoteSource {
    base_url: String,
    client: Client,
}

impl RemoteSource {
    /// Builds a remote source at `base_url`, using `headers` on every
    /// request (e.g. an auth token).
    pub fn new(base_url: impl Into<String>, headers: reqwest::header::HeaderMap) -> Self {
        let client = Client::builder()
            .timeout(REMOTE_TIMEOUT)
            .connect_timeout(REMOTE_TIMEOUT)
            .default_headers(headers)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl RepositorySource for RemoteSource {
    async fn is_available(&self) -> bool {
        self.client
            .head(format!("{}/{LIST_FILE}", self.base_url))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn list_available(&self) -> Vec<PluginName> {
        let Ok(response) = self
            .client
            .get(format!("{}/{LIST_FILE}", self.base_url))
            .send()
            .await
        else {
            return Vec::new();
        };
        response.json::<Vec<String>>().await.unwrap_or_default()
    }

    async fn get_repository_file(&self, name: &str) -> Option<RepositoryFile> {
        let response = self
            .client
            .get(format!("{}/plugins/{name}.json", self.base_url))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok()
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    fn identifier(&self) -> String {
        self.base_url.clone()
    }
}

struct ListCache {
    names: Vec<PluginName>,
    fetched_at: Instant,
}

/// Merges several [`RepositorySource`]s: first-hit lookup, union listing,
/// with a 180s listing cache.
pub struct RepositoryManager {
    sources: Vec<Box<dyn RepositorySource>>,
    cache: tokio::sync::RwLock<Option<ListCache>>,
}

impl RepositoryManager {
    /// Builds an aggregator over `sources`, consulted in the given order.
    pub fn new(sources: Vec<Box<dyn RepositorySource>>) -> Self {
        Self {
            sources,
            cache: tokio::sync::RwLock::new(None),
        }
    }

    /// Sources that currently report available.
    pub async fn get_available_sources(&self) -> Vec<&dyn RepositorySource> {
        let mut available = Vec::new();
        for source in &self.sources {
            if source.is_available().await {
                available.push(source.as_ref());
            }
        }
        available
    }

    /// The union of every available source's listing, sorted
    /// lexicographically, cached for 180 seconds.
    pub async fn list_available(&self) -> Vec<PluginName> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.fetched_at.elapsed() < CACHE_TTL {
                return cached.names.clone();
            }
        }

        let mut names = std::collections::BTreeSet::new();
        for source in self.get_available_sources().await {
            for name in source.list_available().await {
                names.insert(name);
            }
        }
        let names: Vec<PluginName> = names.into_iter().collect();

        let mut guard = self.cache.write().await;
        *guard = Some(ListCache {
            names: names.clone(),
            fetched_at: Instant::now(),
        });
        names
    }

    /// The first catalogue entry for `name`, scanning sources in order;
    /// `None` if no available source has one.
    pub async fn get_repository_file(&self, name: &str) -> Option<RepositoryFile> {
        for source in &self.sources {
            if !source.is_available().await {
                continue;
            }
            if let Some(file) = source.get_repository_file(name).await {
                return Some(file);
            }
        }
        None
    }

    /// Clears the listing cache; the next `list_available()` re-fetches from
    /// every available source.
    pub async fn reload(&self) {
        *self.cache.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{RepositoryConfig, RepositoryKind};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_catalogue_entry(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir.join("plugins")).unwrap();
        let file = RepositoryFile {
            id: name.to_string(),
            website: None,
            source: None,
            license: None,
            repositories: vec![RepositoryConfig {
                kind: RepositoryKind::GitHub,
                id: "owner/repo".to_string(),
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
    async fn local_source_lists_and_reads_catalogue_files() {
        let dir = tempfile::tempdir().unwrap();
        write_catalogue_entry(dir.path(), "Essentials");
        let source = LocalSource::new(dir.path());

        assert!(source.is_available().await);
        assert_eq!(source.list_available().await, vec!["Essentials".to_string()]);
        assert!(source.get_repository_file("Essentials").await.is_some());
        assert!(source.get_repository_file("Nope").await.is_none());
    }

    #[tokio::test]
    async fn manager_first_hit_over_sources_in_order() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        write_catalogue_entry(dir_b.path(), "Essentials");

        let manager = RepositoryManager::new(vec![
            Box::new(LocalSource::new(dir_a.path())),
            Box::new(LocalSource::new(dir_b.path())),
        ]);

        let file = manager.get_repository_file("Essentials").await.unwrap();
        assert_eq!(file.id, "Essentials");
    }

    #[tokio::test]
    async fn remote_source_unavailable_on_connection_failure() {
        let source = RemoteSource::new("http://127.0.0.1:1", reqwest::header::HeaderMap::new());
        assert!(!source.is_available().await);
        assert!(source.list_available().await.is_empty());
        assert!(source.get_repository_file("Essentials").await.is_none());
    }

    #[tokio::test]
    async fn remote_source_lists_from_index() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path(format!("/{LIST_FILE}")))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/{LIST_FILE}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!(["Essentials"])),
            )
            .mount(&server)
            .await;

        let source = RemoteSource::new(server.uri(), reqwest::header::HeaderMap::new());
        assert!(source.is_available().await);
        assert_eq!(source.list_available().await, vec!["Essentials".to_string()]);
    }

    #[tokio::test]
    async fn manager_caches_listing_for_ttl() {
        let dir = tempfile::tempdir().unwrap();
        write_catalogue_entry(dir.path(), "Essentials");
        let manager = RepositoryManager::new(vec![Box::new(LocalSource::new(dir.path()))]);

        let first = manager.list_available().await;
        // Remove the file; a cached result should still be returned.
        std::fs::remove_file(dir.path().join("plugins").join("Essentials.json")).unwrap();
        let second = manager.list_available().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn reload_clears_cache_so_next_listing_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        write_catalogue_entry(dir.path(), "Essentials");
        let manager = RepositoryManager::new(vec![Box::new(LocalSource::new(dir.path()))]);

        let first = manager.list_available().await;
        assert_eq!(first, vec!["Essentials".to_string()]);
        std::fs::remove_file(dir.path().join("plugins").join("Essentials.json")).unwrap();

        manager.reload().await;
        let second = manager.list_available().await;
        assert!(second.is_empty());
    }
}
