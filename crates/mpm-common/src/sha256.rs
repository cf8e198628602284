//! SHA-256 digest

use std::path::Path;

use sha2::{Digest, Sha256};

/// Return the hex SHA-256 digest of the given bytes.
pub fn hex_digest_from_bytes(bytes: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}

/// Return the hex SHA-256 digest of the given file.
pub fn hex_digest_from_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    let digest = hasher.finalize();
    Ok(format!("{digest:x}"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_hex_digest_from_bytes_is_deterministic_hex() {
        let hex = hex_digest_from_bytes("plugin-artifact");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hex, hex_digest_from_bytes("plugin-artifact"));
        assert_ne!(hex, hex_digest_from_bytes("other-artifact"));
    }

    #[test]
    fn test_hex_digest_from_file_matches_bytes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(&mut f, "plugin-artifact").unwrap();
        let hex = hex_digest_from_file(f.path()).unwrap();
        assert_eq!(hex, hex_digest_from_bytes("plugin-artifact"));
    }
}
