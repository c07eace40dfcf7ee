// Secret - Shared secret files for the authenticated control channel
// Principle: A fresh secret per node, readable by its owner only

use rand::rngs::OsRng;
use rand::RngCore;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Secret file name inside a node data directory
pub const SECRET_FILENAME: &str = "secret.hex";

/// Secret length in bytes (64 hex characters on disk)
pub const SECRET_LENGTH: usize = 32;

/// Generate a new random secret and write it hex-encoded to `dir/secret.hex`.
///
/// Overwrites any previous secret in `dir`; callers must not call this twice
/// for a live node.
pub fn generate_secret(dir: &Path) -> Result<PathBuf, SecretError> {
    fs::create_dir_all(dir)?;

    let mut secret = [0u8; SECRET_LENGTH];
    OsRng
        .try_fill_bytes(&mut secret)
        .map_err(|e| SecretError::Entropy(e.to_string()))?;

    let path = dir.join(SECRET_FILENAME);
    write_owner_only(&path, hex::encode(secret).as_bytes())?;

    debug!("Wrote control secret to {}", path.display());
    Ok(path)
}

/// Read a secret file back into raw bytes
pub fn read_secret(path: &Path) -> Result<[u8; SECRET_LENGTH], SecretError> {
    let content = fs::read_to_string(path)?;
    let trimmed = content.trim();
    let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    let bytes = hex::decode(hex_str).map_err(|e| SecretError::Malformed(e.to_string()))?;
    if bytes.len() != SECRET_LENGTH {
        return Err(SecretError::Malformed(format!(
            "Invalid secret length: {} bytes (expected {})",
            bytes.len(),
            SECRET_LENGTH
        )));
    }

    let mut secret = [0u8; SECRET_LENGTH];
    secret.copy_from_slice(&bytes);
    Ok(secret)
}

/// Write `content` readable by the owner only
fn write_owner_only(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = open_owner_only(path)?;
    file.write_all(content)
}

/// Open `path` truncated, with owner-only permissions already in place
#[cfg(unix)]
fn open_owner_only(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;

    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_owner_only(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

/// Secret provisioning errors
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Entropy source failure: {0}")]
    Entropy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed secret: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_secret_file_format() {
        let dir = tempdir().unwrap();
        let path = generate_secret(dir.path()).unwrap();

        assert_eq!(path, dir.path().join(SECRET_FILENAME));
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.len(), 64);
        assert!(content.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_secret_creates_missing_dir() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("node-0").join("auth");
        let path = generate_secret(&nested).unwrap();
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_secret_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = generate_secret(dir.path()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_loose_file_tightened_before_write() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join(SECRET_FILENAME);
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let file = open_owner_only(&path).unwrap();
        assert_eq!(file.metadata().unwrap().permissions().mode() & 0o777, 0o600);
        assert_eq!(file.metadata().unwrap().len(), 0);
        drop(file);

        let secret = read_secret(&generate_secret(dir.path()).unwrap()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), hex::encode(secret));
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_secrets_differ_across_dirs() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();

        let secret_a = read_secret(&generate_secret(a.path()).unwrap()).unwrap();
        let secret_b = read_secret(&generate_secret(b.path()).unwrap()).unwrap();
        assert_ne!(secret_a, secret_b);
    }

    #[test]
    fn test_regenerate_overwrites_with_new_value() {
        let dir = tempdir().unwrap();
        let first = read_secret(&generate_secret(dir.path()).unwrap()).unwrap();
        let second = read_secret(&generate_secret(dir.path()).unwrap()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_read_secret_accepts_prefix_and_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.hex");
        fs::write(&path, format!("0x{}\n", "ab".repeat(32))).unwrap();

        let secret = read_secret(&path).unwrap();
        assert_eq!(secret, [0xab; 32]);
    }

    #[test]
    fn test_read_secret_rejects_wrong_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.hex");
        fs::write(&path, "abcd").unwrap();

        assert!(matches!(read_secret(&path), Err(SecretError::Malformed(_))));
    }
}
