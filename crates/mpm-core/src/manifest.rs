//! The Manifest Model: the desired-state document and its graph operations.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::catalogue::RepositoryConfig;
use crate::error::{PluginError, ProjectError, SyncDependencyError};
use crate::version::VersionSpecifier;

/// A non-empty plugin identifier. Equality is case-sensitive.
pub type PluginName = String;

const DEFAULT_SCHEMA_VERSION: &str = "1";

/// One manifest entry: either a plugin the tool does not manage, or a
/// managed plugin with a version requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum PluginSpec {
    /// Present on disk, outside the tool's control.
    Unmanaged,
    /// Managed, with a requirement to resolve against an upstream.
    Managed(VersionSpecifier),
}

const UNMANAGED: &str = "unmanaged";

impl PluginSpec {
    /// True if this entry is [`Unmanaged`](Self::Unmanaged).
    pub fn is_unmanaged(&self) -> bool {
        matches!(self, Self::Unmanaged)
    }

    /// The version requirement, if this entry is [`Managed`](Self::Managed).
    pub fn requirement(&self) -> Option<&VersionSpecifier> {
        match self {
            Self::Managed(req) => Some(req),
            Self::Unmanaged => None,
        }
    }

    fn to_wire_string(&self) -> String {
        match self {
            Self::Unmanaged => UNMANAGED.to_string(),
            Self::Managed(req) => req.to_wire_string(),
        }
    }

    fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case(UNMANAGED) {
            Self::Unmanaged
        } else {
            Self::Managed(VersionSpecifier::parse(s))
        }
    }
}

impl TryFrom<String> for PluginSpec {
    type Error = std::convert::Infallible;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self::parse(&value))
    }
}

impl From<PluginSpec> for String {
    fn from(value: PluginSpec) -> Self {
        value.to_wire_string()
    }
}

impl Serialize for PluginSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_wire_string())
    }
}

impl<'de> Deserialize<'de> for PluginSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// The desired-state document: a named set of plugin entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Operator-chosen name for this server/project.
    pub name: String,
    /// Schema version of this manifest document. Written to the `version`
    /// wire field.
    #[serde(rename = "version", default = "default_schema_version")]
    pub schema_version: String,
    /// Plugin entries, keyed by name.
    pub plugins: IndexMap<PluginName, PluginSpec>,
    /// Inline repository overrides, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repositories: Option<Vec<RepositoryConfig>>,
}

fn default_schema_version() -> String {
    DEFAULT_SCHEMA_VERSION.to_string()
}

impl Manifest {
    /// Creates a fresh, empty manifest with the given project name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema_version: default_schema_version(),
            plugins: IndexMap::new(),
            repositories: None,
        }
    }

    /// Loads a manifest from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|_| ProjectError::ConfigNotFound {
            path: path.to_owned(),
        })?;
        serde_json::from_str(&text).map_err(|source| ProjectError::ConfigParseError {
            path: path.to_owned(),
            source,
        })
    }

    /// Writes this manifest to `path`, atomically, with keys sorted first.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        let sorted = self.with_sorted_keys();
        let json = serde_json::to_vec_pretty(&sorted).map_err(|e| ProjectError::SaveFailed {
            path: path.to_owned(),
            message: e.to_string(),
        })?;
        mpm_common::atomic::write_atomic(path, json).map_err(|e| ProjectError::SaveFailed {
            path: path.to_owned(),
            message: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), "wrote manifest");
        Ok(())
    }

    /// Adds a new entry. Fails with [`PluginError::AlreadyExists`] if the key
    /// is already present and not [`PluginSpec::Unmanaged`].
    pub fn add(&mut self, name: impl Into<PluginName>, spec: PluginSpec) -> Result<(), PluginError> {
        let name = name.into();
        if let Some(existing) = self.plugins.get(&name) {
            if !existing.is_unmanaged() {
                return Err(PluginError::AlreadyExists(name));
            }
        }
        self.plugins.insert(name, spec);
        Ok(())
    }

    /// Removes an entry. Fails with [`PluginError::NotFound`] if absent.
    pub fn remove(&mut self, name: &str) -> Result<PluginSpec, PluginError> {
        self.plugins
            .shift_remove(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    /// Replaces an existing entry's spec. Fails with [`PluginError::NotFound`]
    /// if absent.
    pub fn update(&mut self, name: &str, spec: PluginSpec) -> Result<(), PluginError> {
        if !self.plugins.contains_key(name) {
            return Err(PluginError::NotFound(name.to_string()));
        }
        self.plugins.insert(name.to_string(), spec);
        Ok(())
    }

    /// Validates the `sync:` graph: every target must exist, be managed, and
    /// not itself be a `sync:` entry; the graph must be acyclic.
    pub fn validate_sync(&self) -> Result<(), SyncDependencyError> {
        for spec in self.plugins.values() {
            let Some(target) = spec.requirement().and_then(|r| r.sync_target()) else {
                continue;
            };
            match self.plugins.get(target) {
                None => return Err(SyncDependencyError::TargetNotFound(target.to_string())),
                Some(PluginSpec::Unmanaged) => {
                    return Err(SyncDependencyError::TargetIsUnmanaged(target.to_string()))
                }
                Some(PluginSpec::Managed(req)) if req.is_sync() => {
                    return Err(SyncDependencyError::TargetIsSync(target.to_string()))
                }
                Some(PluginSpec::Managed(_)) => {}
            }
        }

        let adjacency = self.sync_adjacency();
        let order: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        if let Some(cycle) = find_cycle(&adjacency, &order) {
            return Err(SyncDependencyError::CircularDependency(cycle));
        }
        Ok(())
    }

    /// Returns every plugin exactly once, in an order that respects `sync:`
    /// coupling (a target precedes its dependents) when the manifest passes
    /// [`Self::validate_sync`]. Callers MUST validate first and gate on
    /// success; if the manifest is cyclic this still returns every plugin,
    /// appending unresolved ones in manifest order.
    pub fn topological_order(&self) -> Vec<PluginName> {
        let names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        let mut in_degree: HashMap<&str, usize> = names.iter().map(|&n| (n, 0)).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for (name, spec) in &self.plugins {
            let Some(target) = spec.requirement().and_then(|r| r.sync_target()) else {
                continue;
            };
            if self.plugins.contains_key(target) {
                *in_degree.get_mut(name.as_str()).unwrap() += 1;
                dependents.entry(target).or_default().push(name.as_str());
            }
        }

        let mut queue: VecDeque<&str> = names
            .iter()
            .copied()
            .filter(|n| in_degree[n] == 0)
            .collect();
        let mut order = Vec::with_capacity(names.len());
        let mut emitted: HashSet<&str> = HashSet::new();

        while let Some(n) = queue.pop_front() {
            order.push(n.to_string());
            emitted.insert(n);
            if let Some(deps) = dependents.get(n) {
                for &d in deps {
                    let degree = in_degree.get_mut(d).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(d);
                    }
                }
            }
        }

        for &n in &names {
            if !emitted.contains(n) {
                order.push(n.to_string());
            }
        }
        order
    }

    /// All plugins whose requirement is `sync:<target>`.
    pub fn get_plugins_syncing_to(&self, target: &str) -> Vec<PluginName> {
        self.plugins
            .iter()
            .filter(|(_, spec)| spec.requirement().and_then(|r| r.sync_target()) == Some(target))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns a copy with keys sorted case-insensitive ascending. Idempotent.
    #[must_use]
    pub fn with_sorted_keys(&self) -> Self {
        let mut entries: Vec<(PluginName, PluginSpec)> = self
            .plugins
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.to_lowercase().cmp(&b.to_lowercase()));
        Self {
            name: self.name.clone(),
            schema_version: self.schema_version.clone(),
            plugins: entries.into_iter().collect(),
            repositories: self.repositories.clone(),
        }
    }

    fn sync_adjacency(&self) -> HashMap<&str, Vec<&str>> {
        self.plugins
            .iter()
            .map(|(name, spec)| {
                let targets = spec
                    .requirement()
                    .and_then(|r| r.sync_target())
                    .into_iter()
                    .collect();
                (name.as_str(), targets)
            })
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Iterative DFS with three-color marking over an explicit stack (no
/// recursion, so arbitrarily deep/wide graphs are safe). On rediscovering a
/// gray node, returns the path slice from its first occurrence through
/// itself again.
fn find_cycle(adjacency: &HashMap<&str, Vec<&str>>, order: &[&str]) -> Option<Vec<String>> {
    let mut color: HashMap<&str, Color> = order.iter().map(|&n| (n, Color::White)).collect();

    for &start in order {
        if color[start] != Color::White {
            continue;
        }
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        color.insert(start, Color::Gray);

        while let Some(&(node, idx)) = stack.last() {
            let children = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);
            if idx < children.len() {
                let child = children[idx];
                stack.last_mut().unwrap().1 += 1;
                match color.get(child).copied().unwrap_or(Color::Black) {
                    Color::White => {
                        color.insert(child, Color::Gray);
                        stack.push((child, 0));
                    }
                    Color::Gray => {
                        let pos = stack.iter().position(|&(n, _)| n == child).unwrap();
                        let mut cycle: Vec<String> =
                            stack[pos..].iter().map(|&(n, _)| n.to_string()).collect();
                        cycle.push(child.to_string());
                        return Some(cycle);
                    }
                    Color::Black => {}
                }
            } else {
                color.insert(node, Color::Black);
                stack.pop();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn managed(spec: &str) -> PluginSpec {
        PluginSpec::Managed(VersionSpecifier::parse(spec))
    }

    #[test]
    fn add_rejects_duplicate_managed_entry() {
        let mut m = Manifest::new("server");
        m.add("Foo", managed("1.0.0")).unwrap();
        let err = m.add("Foo", managed("2.0.0")).unwrap_err();
        assert!(matches!(err, PluginError::AlreadyExists(n) if n == "Foo"));
    }

    #[test]
    fn add_over_unmanaged_succeeds() {
        let mut m = Manifest::new("server");
        m.add("Foo", PluginSpec::Unmanaged).unwrap();
        m.add("Foo", managed("1.0.0")).unwrap();
        assert_eq!(m.plugins["Foo"], managed("1.0.0"));
    }

    #[test]
    fn remove_missing_is_not_found() {
        let mut m = Manifest::new("server");
        assert!(matches!(
            m.remove("Foo").unwrap_err(),
            PluginError::NotFound(n) if n == "Foo"
        ));
    }

    #[test]
    fn remove_then_remove_again_is_not_found() {
        let mut m = Manifest::new("server");
        m.add("Foo", managed("1.0.0")).unwrap();
        m.remove("Foo").unwrap();
        assert!(m.remove("Foo").is_err());
    }

    #[test]
    fn update_missing_is_not_found() {
        let mut m = Manifest::new("server");
        assert!(m.update("Foo", managed("1.0.0")).is_err());
    }

    #[test]
    fn validate_sync_rejects_missing_target() {
        let mut m = Manifest::new("server");
        m.add("Addon", managed("sync:Core")).unwrap();
        assert_eq!(
            m.validate_sync().unwrap_err(),
            SyncDependencyError::TargetNotFound("Core".to_string())
        );
    }

    #[test]
    fn validate_sync_rejects_unmanaged_target() {
        let mut m = Manifest::new("server");
        m.add("Core", PluginSpec::Unmanaged).unwrap();
        m.add("Addon", managed("sync:Core")).unwrap();
        assert_eq!(
            m.validate_sync().unwrap_err(),
            SyncDependencyError::TargetIsUnmanaged("Core".to_string())
        );
    }

    #[test]
    fn validate_sync_rejects_sync_target() {
        let mut m = Manifest::new("server");
        m.add("Core", managed("sync:Other")).unwrap();
        m.add("Other", managed("1.0.0")).unwrap();
        m.add("Addon", managed("sync:Core")).unwrap();
        assert_eq!(
            m.validate_sync().unwrap_err(),
            SyncDependencyError::TargetIsSync("Core".to_string())
        );
    }

    #[test]
    fn validate_sync_detects_two_node_cycle() {
        let mut m = Manifest::new("server");
        m.add("A", managed("sync:B")).unwrap();
        m.add("B", managed("sync:A")).unwrap();
        let err = m.validate_sync().unwrap_err();
        match err {
            SyncDependencyError::CircularDependency(cycle) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 3);
                for pair in cycle.windows(2) {
                    let src_target = m.plugins[&pair[0]].requirement().unwrap().sync_target();
                    assert_eq!(src_target, Some(pair[1].as_str()));
                }
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn topological_order_respects_sync_edges() {
        let mut m = Manifest::new("server");
        m.add("Addon", managed("sync:Core")).unwrap();
        m.add("Core", managed("1.2.3")).unwrap();
        m.add("Other", managed("latest")).unwrap();
        m.validate_sync().unwrap();

        let order = m.topological_order();
        assert_eq!(order.len(), 3);
        let core_pos = order.iter().position(|n| n == "Core").unwrap();
        let addon_pos = order.iter().position(|n| n == "Addon").unwrap();
        assert!(core_pos < addon_pos);
    }

    #[test]
    fn topological_order_returns_every_plugin_even_with_a_cycle() {
        let mut m = Manifest::new("server");
        m.add("A", managed("sync:B")).unwrap();
        m.add("B", managed("sync:A")).unwrap();
        m.add("C", PluginSpec::Unmanaged).unwrap();
        let order = m.topological_order();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["A".to_string(), "B".to_string(), "C".to_string()]);
    }

    #[test]
    fn get_plugins_syncing_to_is_reverse_adjacency() {
        let mut m = Manifest::new("server");
        m.add("Core", managed("1.2.3")).unwrap();
        m.add("AddonA", managed("sync:Core")).unwrap();
        m.add("AddonB", managed("sync:Core")).unwrap();
        m.add("Other", managed("latest")).unwrap();

        let mut dependents = m.get_plugins_syncing_to("Core");
        dependents.sort();
        assert_eq!(dependents, vec!["AddonA".to_string(), "AddonB".to_string()]);
    }

    #[test]
    fn with_sorted_keys_is_case_insensitive_ascending_and_idempotent() {
        let mut m = Manifest::new("server");
        m.add("bar", PluginSpec::Unmanaged).unwrap();
        m.add("Foo", PluginSpec::Unmanaged).unwrap();
        m.add("apple", PluginSpec::Unmanaged).unwrap();

        let sorted = m.with_sorted_keys();
        let keys: Vec<&String> = sorted.plugins.keys().collect();
        assert_eq!(keys, vec!["apple", "bar", "Foo"]);

        let sorted_again = sorted.with_sorted_keys();
        let keys_again: Vec<&String> = sorted_again.plugins.keys().collect();
        assert_eq!(keys, keys_again);
    }

    #[test]
    fn manifest_json_round_trips_with_unmanaged_and_managed_entries() {
        let mut m = Manifest::new("server");
        m.add("Foo", PluginSpec::Unmanaged).unwrap();
        m.add("Bar", managed("sync:Foo")).unwrap();
        let json = serde_json::to_string(&m.with_sorted_keys()).unwrap();
        let reloaded: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded.plugins["Foo"], PluginSpec::Unmanaged);
        assert_eq!(reloaded.plugins["Bar"], managed("sync:Foo"));
    }
}
