//! Atomic file writes: write to a sibling temp file, then rename over the destination.
//!
//! Every durable-state component (manifest, metadata store, backup index) goes
//! through this helper so a crash or concurrent reader never observes a
//! partially-written file.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Writes `contents` to `path` atomically.
///
/// The temp file is created in `path`'s parent directory so the final
/// `persist` is a same-filesystem rename, not a cross-filesystem copy.
pub fn write_atomic(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
    let path = path.as_ref();
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))?;
    temp.write_all(contents.as_ref())
        .with_context(|| format!("writing temp file for {}", path.display()))?;
    temp.flush()?;
    temp.persist(path)
        .with_context(|| format!("persisting temp file to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_parent_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("file.txt");

        write_atomic(&target, "first").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "first");

        write_atomic(&target, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
    }

    #[test]
    fn write_atomic_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("file.txt");
        write_atomic(&target, "data").unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path(), target);
    }
}
