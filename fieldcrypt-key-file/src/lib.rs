//! File-based key provider for `FieldCrypt`.
//!
//! This provider stores the two keys in the filesystem and is suitable for
//! development, CI and single-host deployments.

#![warn(clippy::pedantic, clippy::nursery)]

use fieldcrypt::error::KeyProviderError;
use fieldcrypt::keys::{KeyProvider, BLIND_INDEX_KEY_NAME, ENCRYPTION_KEY_NAME, KEY_SIZE};
use rand::distributions::{Alphanumeric, DistString};
use secrecy::SecretVec;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// File holding the encryption key.
pub const ENCRYPTION_KEY_FILE: &str = "encryption.key";

/// File holding the blind index key.
pub const BLIND_INDEX_KEY_FILE: &str = "blind_index.key";

/// Generates a printable 32-byte key.
///
/// The key is 32 alphanumeric characters from the OS-seeded thread RNG, so it
/// can be stored as-is in an environment variable or a key file.
#[must_use]
pub fn generate_key() -> Zeroizing<String> {
    Zeroizing::new(Alphanumeric.sample_string(&mut rand::thread_rng(), KEY_SIZE))
}

/// Generates a pair of distinct keys: `(encryption_key, blind_index_key)`.
#[must_use]
pub fn generate_key_pair() -> (Zeroizing<String>, Zeroizing<String>) {
    let encryption_key = generate_key();
    let mut blind_index_key = generate_key();
    while *blind_index_key == *encryption_key {
        blind_index_key = generate_key();
    }
    (encryption_key, blind_index_key)
}

/// File-based key provider.
///
/// Keys are stored in the filesystem with the following structure:
/// ```text
/// keys/
/// ├── encryption.key   (32 bytes, 0600 permissions)
/// └── blind_index.key  (32 bytes, 0600 permissions)
/// ```
/// A single trailing newline in either file is ignored.
pub struct FileKeyProvider {
    key_dir: PathBuf,
}

impl FileKeyProvider {
    /// Creates a new `FileKeyProvider`.
    ///
    /// # Arguments
    ///
    /// * `key_dir` - Directory containing key files
    ///
    /// # Errors
    ///
    /// Returns error if the directory doesn't exist.
    pub fn new(key_dir: impl Into<PathBuf>) -> Result<Self, KeyProviderError> {
        let key_dir = key_dir.into();
        if !key_dir.is_dir() {
            return Err(KeyProviderError::KeyNotFound(format!(
                "key directory does not exist: {}",
                key_dir.display()
            )));
        }
        Ok(Self { key_dir })
    }

    /// Initializes a key directory with a fresh pair of keys.
    ///
    /// # Errors
    ///
    /// Returns error if either key file already exists or cannot be written.
    pub fn init(key_dir: impl AsRef<Path>) -> Result<(), KeyProviderError> {
        let key_dir = key_dir.as_ref();
        fs::create_dir_all(key_dir)?;

        for name in [ENCRYPTION_KEY_FILE, BLIND_INDEX_KEY_FILE] {
            if key_dir.join(name).exists() {
                return Err(KeyProviderError::CreationFailed(format!(
                    "refusing to overwrite {}",
                    key_dir.join(name).display()
                )));
            }
        }

        let (encryption_key, blind_index_key) = generate_key_pair();
        write_key(&key_dir.join(ENCRYPTION_KEY_FILE), encryption_key.as_bytes())?;
        write_key(&key_dir.join(BLIND_INDEX_KEY_FILE), blind_index_key.as_bytes())?;
        Ok(())
    }

    /// Returns the key directory.
    #[must_use]
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    fn read_key(&self, file: &str, name: &str) -> Result<SecretVec<u8>, KeyProviderError> {
        let path = self.key_dir.join(file);
        if !path.exists() {
            return Err(KeyProviderError::KeyNotFound(format!("{name} ({})", path.display())));
        }

        let mut bytes = Zeroizing::new(fs::read(&path)?);
        if bytes.ends_with(b"\n") {
            bytes.pop();
            if bytes.ends_with(b"\r") {
                bytes.pop();
            }
        }

        if bytes.len() != KEY_SIZE {
            return Err(KeyProviderError::InvalidLength {
                name: name.to_string(),
                actual: bytes.len(),
            });
        }
        Ok(SecretVec::new(bytes.to_vec()))
    }
}

impl KeyProvider for FileKeyProvider {
    fn encryption_key(&self) -> Result<SecretVec<u8>, KeyProviderError> {
        self.read_key(ENCRYPTION_KEY_FILE, ENCRYPTION_KEY_NAME)
    }

    fn blind_index_key(&self) -> Result<SecretVec<u8>, KeyProviderError> {
        self.read_key(BLIND_INDEX_KEY_FILE, BLIND_INDEX_KEY_NAME)
    }
}

#[cfg(unix)]
fn write_key(path: &Path, key: &[u8]) -> Result<(), KeyProviderError> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = OpenOptions::new().write(true).create_new(true).mode(0o600).open(path)?;
    file.write_all(key)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn write_key(path: &Path, key: &[u8]) -> Result<(), KeyProviderError> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(key)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldcrypt::keys::KeyMaterial;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    #[test]
    fn test_generate_key_shape() {
        let key = generate_key();
        assert_eq!(key.len(), KEY_SIZE);
        assert!(key.bytes().all(|b| b.is_ascii_alphanumeric()));
        assert_ne!(*generate_key(), *key);
    }

    #[test]
    fn test_init_and_load() {
        let temp_dir = TempDir::new().unwrap();
        FileKeyProvider::init(temp_dir.path()).unwrap();

        let provider = FileKeyProvider::new(temp_dir.path()).unwrap();
        let encryption_key = provider.encryption_key().unwrap();
        let blind_index_key = provider.blind_index_key().unwrap();

        assert_eq!(encryption_key.expose_secret().len(), KEY_SIZE);
        assert_ne!(encryption_key.expose_secret(), blind_index_key.expose_secret());
        assert!(KeyMaterial::from_provider(&provider).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_init_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        FileKeyProvider::init(temp_dir.path()).unwrap();

        let metadata = fs::metadata(temp_dir.path().join(ENCRYPTION_KEY_FILE)).unwrap();
        let mode = metadata.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        FileKeyProvider::init(temp_dir.path()).unwrap();
        let before = fs::read(temp_dir.path().join(ENCRYPTION_KEY_FILE)).unwrap();

        let result = FileKeyProvider::init(temp_dir.path());
        assert!(matches!(result, Err(KeyProviderError::CreationFailed(_))));
        assert_eq!(fs::read(temp_dir.path().join(ENCRYPTION_KEY_FILE)).unwrap(), before);
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = FileKeyProvider::new(temp_dir.path().join("nope"));
        assert!(matches!(result, Err(KeyProviderError::KeyNotFound(_))));
    }

    #[test]
    fn test_missing_key_file() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileKeyProvider::new(temp_dir.path()).unwrap();
        assert!(matches!(provider.encryption_key(), Err(KeyProviderError::KeyNotFound(_))));
    }

    #[test]
    fn test_trailing_newline_ignored() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(ENCRYPTION_KEY_FILE), "0123456789abcdef0123456789abcdef\n")
            .unwrap();

        let provider = FileKeyProvider::new(temp_dir.path()).unwrap();
        assert_eq!(
            provider.encryption_key().unwrap().expose_secret().as_slice(),
            b"0123456789abcdef0123456789abcdef"
        );
    }

    #[test]
    fn test_wrong_length_key_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(BLIND_INDEX_KEY_FILE), "too short").unwrap();

        let provider = FileKeyProvider::new(temp_dir.path()).unwrap();
        assert!(matches!(
            provider.blind_index_key(),
            Err(KeyProviderError::InvalidLength { actual: 9, .. })
        ));
    }
}
