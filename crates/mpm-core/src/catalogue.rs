//! Catalogue types: the per-plugin repository description shared by the
//! Manifest Model, the Repository Source Layer, and the Downloader Dispatch.

use serde::{Deserialize, Serialize};

/// Subdirectory of the plugin directory treated as operator-owned: never
/// backed up into, restored over, or swept by `removeUnmanaged`.
pub const LOCAL_SUBTREE: &str = "local";

/// Conventional artifact name for the tool's own plugin, if it ships as one.
/// `removeUnmanaged` never deletes a `.jar` whose declared name matches this.
pub const SELF_ARTIFACT_NAME: &str = "mpm";

/// The kind of upstream a [`RepositoryConfig`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    /// GitHub releases.
    GitHub,
    /// Modrinth.
    Modrinth,
    /// SpigotMC.
    SpigotMC,
    /// Hangar.
    Hangar,
    /// Jenkins build artifacts.
    Jenkins,
    /// A locally-provided file, not fetched over the network.
    Local,
}

/// One route to an upstream repository for a plugin.
///
/// `id`'s expected form depends on `kind` — e.g. `"owner/repo"` for
/// [`RepositoryKind::GitHub`], a Modrinth project slug for
/// [`RepositoryKind::Modrinth`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    /// Which upstream this config addresses.
    #[serde(rename = "type")]
    pub kind: RepositoryKind,
    /// Kind-specific address (see type docs).
    pub id: String,
    /// Regex used to extract a normalized version from the upstream's raw
    /// version token. Historically named `versionModifier`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "versionModifier"
    )]
    pub version_pattern: Option<String>,
    /// Template for building a download URL when the upstream API does not
    /// already return one directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url_template: Option<String>,
    /// Regex selecting which file to download when a version exposes more
    /// than one artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name_pattern: Option<String>,
    /// Template for the installed file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name_template: Option<String>,
}

/// A catalogue entry for one plugin name, as published by a repository
/// source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryFile {
    /// The plugin name this entry describes.
    pub id: String,
    /// Optional homepage link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Optional source-code link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Optional license identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Ordered list of upstream routes for this plugin. Resolution always
    /// takes `repositories[0]` (see `DESIGN.md`).
    pub repositories: Vec<RepositoryConfig>,
}
