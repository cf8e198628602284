//! Error types for the plugin manager engine.
//!
//! Every public, fallible operation returns one of the enums below rather
//! than a bare `anyhow::Error`; internal helpers may still use
//! `anyhow::Result` and get mapped into the owning component's error type at
//! its public boundary, mirroring how the grounding codebase's own
//! `spin-plugins::error` module wraps upstream I/O failures.

use std::path::PathBuf;

/// Errors surfaced by the Manifest Model and the composition root.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// No manifest has been initialized (or opened) at the expected location.
    #[error("no manifest initialized at {}", .path.display())]
    NotInitialized {
        /// Path that was expected to hold a manifest.
        path: PathBuf,
    },

    /// The manifest file does not exist.
    #[error("manifest file not found at {}", .path.display())]
    ConfigNotFound {
        /// Path that was probed.
        path: PathBuf,
    },

    /// The manifest file exists but could not be parsed.
    #[error("could not parse manifest at {}: {source}", .path.display())]
    ConfigParseError {
        /// Path of the unparsable file.
        path: PathBuf,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The manifest could not be written back to disk.
    #[error("failed to save manifest to {}: {message}", .path.display())]
    SaveFailed {
        /// Destination path.
        path: PathBuf,
        /// Human-readable detail.
        message: String,
    },

    /// `validateSync` failed; see the wrapped [`SyncDependencyError`] for the reason.
    #[error("manifest failed sync validation: {0}")]
    SyncValidationFailed(#[from] SyncDependencyError),

    /// `init` could not set up a fresh project at the given root.
    #[error("failed to initialize project at {}: {message}", .path.display())]
    InitializationFailed {
        /// Root directory that was being initialized.
        path: PathBuf,
        /// Human-readable detail.
        message: String,
    },
}

/// Errors surfaced by the Lifecycle Orchestrator, Repository Source Layer,
/// Downloader Dispatch, and Resolution Engine.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// No manifest entry exists for the given name.
    #[error("plugin '{0}' is not in the manifest")]
    NotFound(String),

    /// `add` was called for a name that is already `Managed`.
    #[error("plugin '{0}' is already managed")]
    AlreadyExists(String),

    /// An operation that requires a managed plugin was called on an unmanaged one.
    #[error("plugin '{0}' is unmanaged")]
    NotManaged(String),

    /// No metadata record exists for an otherwise-managed plugin.
    #[error("no metadata found for plugin '{0}'")]
    MetadataNotFound(String),

    /// A metadata record could not be written back to disk.
    #[error("failed to save metadata for plugin '{name}': {message}")]
    MetadataSaveFailed {
        /// Plugin the metadata belongs to.
        name: String,
        /// Human-readable detail.
        message: String,
    },

    /// No repository source returned a catalogue entry for the plugin.
    #[error("no repository entry found for plugin '{0}'")]
    RepositoryNotFound(String),

    /// The catalogue entry names a repository kind this build does not support.
    #[error("unsupported repository kind '{0}'")]
    UnsupportedRepository(String),

    /// The version specifier could not be resolved to a concrete version.
    #[error("could not resolve version for plugin '{name}': {reason}")]
    VersionResolutionFailed {
        /// Plugin whose specifier failed to resolve.
        name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The upstream artifact could not be downloaded.
    #[error("failed to download artifact for plugin '{name}': {reason}")]
    DownloadFailed {
        /// Plugin being installed.
        name: String,
        /// Human-readable reason (often an HTTP status).
        reason: String,
    },

    /// `install` failed after the artifact was resolved.
    #[error("failed to install plugin '{name}': {reason}")]
    InstallFailed {
        /// Plugin being installed.
        name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// `uninstall` failed to remove the plugin's file or records.
    #[error("failed to uninstall plugin '{name}': {reason}")]
    UninstallFailed {
        /// Plugin being uninstalled.
        name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// `remove` failed to update the manifest.
    #[error("failed to remove plugin '{name}' from the manifest: {reason}")]
    RemoveFailed {
        /// Plugin being removed.
        name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// `update` failed for a specific plugin during a bulk pass.
    #[error("failed to update plugin '{name}': {reason}")]
    UpdateFailed {
        /// Plugin being updated.
        name: String,
        /// Human-readable reason.
        reason: String,
    },

    /// `lock` was called on an already-locked plugin.
    #[error("plugin '{0}' is already locked")]
    AlreadyLocked(String),

    /// `unlock` was called on a plugin that is not locked.
    #[error("plugin '{0}' is not locked")]
    NotLocked(String),

    /// An event-bus subscriber cancelled the operation.
    #[error("operation '{operation}' on plugin '{name}' was cancelled by a subscriber")]
    OperationCancelled {
        /// Plugin the operation targeted.
        name: String,
        /// Name of the lifecycle operation (e.g. `"install"`).
        operation: &'static str,
    },

    /// The manifest could not be persisted after a mutation.
    #[error("failed to save manifest: {0}")]
    ManifestSaveFailed(String),

    /// A Manifest Model or composition-root operation failed (e.g. a
    /// `sync:` graph validation error surfaced by `installAll`).
    #[error(transparent)]
    Project(#[from] ProjectError),
}

/// Errors from validating or resolving `sync:` coupling between plugins.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SyncDependencyError {
    /// `sync:<target>` names a plugin absent from the manifest.
    #[error("sync target '{0}' does not exist")]
    TargetNotFound(String),

    /// `sync:<target>` names a plugin that is `unmanaged`.
    #[error("sync target '{0}' is unmanaged")]
    TargetIsUnmanaged(String),

    /// `sync:<target>` names a plugin whose own requirement is itself `sync:`.
    #[error("sync target '{0}' is itself a sync specifier")]
    TargetIsSync(String),

    /// The target's concrete version could not be determined.
    #[error("no resolvable version available for sync target '{0}'")]
    VersionNotAvailable(String),

    /// The `sync:` graph contains a cycle.
    #[error("circular sync dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),
}

/// Errors from the Dependency Analyzer.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    /// The named plugin has no artifact on disk to inspect.
    #[error("plugin '{0}' has no installed artifact to inspect")]
    ArtifactMissing(String),

    /// The artifact's dependency descriptor could not be parsed.
    #[error("malformed dependency descriptor for plugin '{name}': {message}")]
    MalformedDescriptor {
        /// Plugin whose descriptor failed to parse.
        name: String,
        /// Human-readable detail.
        message: String,
    },

    /// The named plugin is not known to the manifest or installed set.
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),
}
