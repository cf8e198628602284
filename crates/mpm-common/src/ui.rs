//! Functions supporting common display behaviour and standards

use std::path::Path;

/// Renders a Path with double quotes. This is the standard for displaying
/// paths in error messages and logs. It is preferred to the Debug format
/// because the latter doubles up backslashes on Windows.
pub fn quoted_path(path: impl AsRef<Path>) -> impl std::fmt::Display {
    format!("\"{}\"", path.as_ref().display())
}
