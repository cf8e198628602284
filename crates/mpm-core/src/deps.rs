//! Dependency Analyzer: reads the `depend`/`softDepend`/`loadBefore`
//! declarations embedded in an installed artifact, without installing or
//! version-resolving anything.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::DependencyError;

const DESCRIPTOR_ENTRY: &str = "plugin.yml";

/// The subset of a plugin's in-archive descriptor this analyzer reads.
#[derive(Debug, Clone, Default, Deserialize)]
struct Descriptor {
    #[serde(default)]
    depend: Vec<String>,
    #[serde(default, rename = "softDepend")]
    soft_depend: Vec<String>,
    #[serde(default, rename = "loadbefore")]
    load_before: Vec<String>,
}

/// Hard/soft/load-order dependency declarations for one plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyInfo {
    /// Plugins this one requires to function.
    pub depend: Vec<String>,
    /// Plugins this one can use if present, but does not require.
    pub soft_depend: Vec<String>,
    /// Plugins that must load after this one.
    pub load_before: Vec<String>,
}

impl From<Descriptor> for DependencyInfo {
    fn from(d: Descriptor) -> Self {
        Self {
            depend: d.depend,
            soft_depend: d.soft_depend,
            load_before: d.load_before,
        }
    }
}

/// One node in a [`DependencyAnalyzer::build_dependency_tree`] result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyTree {
    /// The plugin this node describes.
    pub name: String,
    /// Its declared dependencies (hard, and soft if `includeSoft`), each
    /// expanded recursively. A name with no installed artifact terminates
    /// the recursion as a leaf with empty `children`.
    pub children: Vec<DependencyTree>,
}

/// Reads descriptors out of installed JAR artifacts under a plugin directory.
pub struct DependencyAnalyzer {
    plugins_dir: PathBuf,
}

impl DependencyAnalyzer {
    /// Builds an analyzer rooted at `plugins_dir` (the host plugin
    /// directory where installed `.jar` artifacts live).
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
        }
    }

    /// Reads and parses the descriptor for `name`'s installed artifact.
    pub fn get_dependency_info(&self, name: &str) -> Result<DependencyInfo, DependencyError> {
        let path = self.artifact_path(name)?;
        let descriptor = read_descriptor(&path, name)?;
        Ok(descriptor.into())
    }

    /// Builds the full dependency tree for `name`. When `include_soft` is
    /// true, `softDepend` edges are expanded too; otherwise only `depend`.
    pub fn build_dependency_tree(
        &self,
        name: &str,
        include_soft: bool,
    ) -> Result<DependencyTree, DependencyError> {
        let mut visiting = HashSet::new();
        self.build_tree_rec(name, include_soft, &mut visiting)
    }

    fn build_tree_rec(
        &self,
        name: &str,
        include_soft: bool,
        visiting: &mut HashSet<String>,
    ) -> Result<DependencyTree, DependencyError> {
        if !visiting.insert(name.to_string()) {
            // Already on this path: stop expanding to avoid infinite
            // recursion on a dependency cycle between artifacts.
            return Ok(DependencyTree {
                name: name.to_string(),
                children: Vec::new(),
            });
        }

        let children = match self.get_dependency_info(name) {
            Ok(info) => {
                let mut names = info.depend;
                if include_soft {
                    names.extend(info.soft_depend);
                }
                names
                    .into_iter()
                    .map(|child| self.build_tree_rec(&child, include_soft, visiting))
                    .collect::<Result<Vec<_>, _>>()?
            }
            Err(DependencyError::ArtifactMissing(_)) => Vec::new(),
            Err(e) => return Err(e),
        };

        visiting.remove(name);
        Ok(DependencyTree {
            name: name.to_string(),
            children,
        })
    }

    /// For `name` (or every installed plugin if `None`), the set of
    /// declared `depend` entries whose artifact is not installed.
    pub fn check_missing_dependencies(
        &self,
        name: Option<&str>,
    ) -> Result<HashMap<String, Vec<String>>, DependencyError> {
        let names = match name {
            Some(n) => vec![n.to_string()],
            None => self.installed_names()?,
        };

        let mut missing = HashMap::new();
        for n in names {
            let info = match self.get_dependency_info(&n) {
                Ok(info) => info,
                Err(DependencyError::ArtifactMissing(_)) => continue,
                Err(e) => return Err(e),
            };
            let absent: Vec<String> = info
                .depend
                .into_iter()
                .filter(|dep| self.artifact_path(dep).is_err())
                .collect();
            if !absent.is_empty() {
                missing.insert(n, absent);
            }
        }
        Ok(missing)
    }

    /// Every installed plugin that declares `target` in `depend` or
    /// `softDepend`.
    pub fn get_reverse_dependencies(&self, target: &str) -> Result<Vec<String>, DependencyError> {
        let mut reverse = Vec::new();
        for name in self.installed_names()? {
            let info = match self.get_dependency_info(&name) {
                Ok(info) => info,
                Err(DependencyError::ArtifactMissing(_)) => continue,
                Err(e) => return Err(e),
            };
            if info.depend.iter().chain(&info.soft_depend).any(|d| d == target) {
                reverse.push(name);
            }
        }
        Ok(reverse)
    }

    /// Locates the installed artifact for `name`, trying the literal
    /// `<name>.jar` path before falling back to scanning every `.jar`'s
    /// embedded descriptor (artifact names are templated at install time and
    /// may not match the plugin name verbatim).
    pub(crate) fn artifact_path(&self, name: &str) -> Result<PathBuf, DependencyError> {
        let candidate = self.plugins_dir.join(format!("{name}.jar"));
        if candidate.is_file() {
            return Ok(candidate);
        }
        // Artifact names are templated at install time and may not match
        // the plugin name verbatim; fall back to scanning descriptors.
        if let Ok(entries) = std::fs::read_dir(&self.plugins_dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("jar") {
                    continue;
                }
                if let Ok(descriptor_name) = read_plugin_name(&path) {
                    if descriptor_name == name {
                        return Ok(path);
                    }
                }
            }
        }
        Err(DependencyError::ArtifactMissing(name.to_string()))
    }

    fn installed_names(&self) -> Result<Vec<String>, DependencyError> {
        Ok(self
            .installed_artifacts()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Every installed `.jar` artifact's declared name, paired with its path.
    pub(crate) fn installed_artifacts(&self) -> Result<Vec<(String, PathBuf)>, DependencyError> {
        let Ok(entries) = std::fs::read_dir(&self.plugins_dir) else {
            return Ok(Vec::new());
        };
        let mut artifacts = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jar") {
                continue;
            }
            if let Ok(name) = read_plugin_name(&path) {
                artifacts.push((name, path));
            }
        }
        Ok(artifacts)
    }
}

fn read_descriptor(path: &Path, name: &str) -> Result<Descriptor, DependencyError> {
    let text = read_descriptor_text(path).map_err(|e| DependencyError::MalformedDescriptor {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    serde_yaml::from_str(&text).map_err(|e| DependencyError::MalformedDescriptor {
        name: name.to_string(),
        message: e.to_string(),
    })
}

fn read_plugin_name(path: &Path) -> Result<String, DependencyError> {
    #[derive(Deserialize)]
    struct NameOnly {
        name: String,
    }
    let text = read_descriptor_text(path).map_err(|_| {
        DependencyError::MalformedDescriptor {
            name: path.display().to_string(),
            message: format!("no {DESCRIPTOR_ENTRY} entry"),
        }
    })?;
    let parsed: NameOnly =
        serde_yaml::from_str(&text).map_err(|e| DependencyError::MalformedDescriptor {
            name: path.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(parsed.name)
}

fn read_descriptor_text(path: &Path) -> anyhow::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entry = archive.by_name(DESCRIPTOR_ENTRY)?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_jar(dir: &Path, file_name: &str, plugin_yml: &str) {
        let path = dir.join(file_name);
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file(DESCRIPTOR_ENTRY, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(plugin_yml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn get_dependency_info_reads_embedded_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        write_jar(
            dir.path(),
            "Essentials.jar",
            "name: Essentials\ndepend: [Vault]\nsoftDepend: [PlaceholderAPI]\n",
        );
        let analyzer = DependencyAnalyzer::new(dir.path());
        let info = analyzer.get_dependency_info("Essentials").unwrap();
        assert_eq!(info.depend, vec!["Vault".to_string()]);
        assert_eq!(info.soft_depend, vec!["PlaceholderAPI".to_string()]);
    }

    #[test]
    fn get_dependency_info_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = DependencyAnalyzer::new(dir.path());
        assert!(matches!(
            analyzer.get_dependency_info("Ghost").unwrap_err(),
            DependencyError::ArtifactMissing(n) if n == "Ghost"
        ));
    }

    #[test]
    fn check_missing_dependencies_reports_absent_hard_deps() {
        let dir = tempfile::tempdir().unwrap();
        write_jar(dir.path(), "Essentials.jar", "name: Essentials\ndepend: [Vault]\n");
        let analyzer = DependencyAnalyzer::new(dir.path());
        let missing = analyzer.check_missing_dependencies(None).unwrap();
        assert_eq!(missing["Essentials"], vec!["Vault".to_string()]);
    }

    #[test]
    fn check_missing_dependencies_empty_when_dependency_installed() {
        let dir = tempfile::tempdir().unwrap();
        write_jar(dir.path(), "Essentials.jar", "name: Essentials\ndepend: [Vault]\n");
        write_jar(dir.path(), "Vault.jar", "name: Vault\n");
        let analyzer = DependencyAnalyzer::new(dir.path());
        let missing = analyzer.check_missing_dependencies(None).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn get_reverse_dependencies_finds_dependents() {
        let dir = tempfile::tempdir().unwrap();
        write_jar(dir.path(), "Essentials.jar", "name: Essentials\ndepend: [Vault]\n");
        write_jar(dir.path(), "Vault.jar", "name: Vault\n");
        let analyzer = DependencyAnalyzer::new(dir.path());
        let reverse = analyzer.get_reverse_dependencies("Vault").unwrap();
        assert_eq!(reverse, vec!["Essentials".to_string()]);
    }

    #[test]
    fn build_dependency_tree_expands_hard_deps_and_terminates_on_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_jar(dir.path(), "Essentials.jar", "name: Essentials\ndepend: [Vault]\n");
        let analyzer = DependencyAnalyzer::new(dir.path());
        let tree = analyzer.build_dependency_tree("Essentials", false).unwrap();
        assert_eq!(tree.name, "Essentials");
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "Vault");
        assert!(tree.children[0].children.is_empty());
    }
}
