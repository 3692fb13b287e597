//! Settings loaded from environment variables at startup.
//!
//! Keys are optional here so that `keygen` and `--key-dir` work without
//! them; a command that needs keys fails through [`KeyProvider`] before
//! the store is opened.

use anyhow::{Context, Result};
use fieldcrypt::error::KeyProviderError;
use fieldcrypt::keys::{KeyProvider, BLIND_INDEX_KEY_NAME, ENCRYPTION_KEY_NAME};
use secrecy::{ExposeSecret, SecretString, SecretVec};
use serde::Deserialize;
use std::path::PathBuf;

/// Validated CLI settings.
#[derive(Deserialize)]
pub struct Settings {
    /// `ENCRYPTION_KEY`: raw 32-byte AES-256 key.
    #[serde(default)]
    pub encryption_key: Option<SecretString>,

    /// `BLIND_INDEX_KEY`: raw 32-byte HMAC key.
    #[serde(default)]
    pub blind_index_key: Option<SecretString>,

    /// `STORE_PATH`: JSON snapshot the commands operate on.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// `LOG_LEVEL`: tracing filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./fieldcrypt.json")
}
fn default_log_level() -> String {
    "info".into()
}

impl Settings {
    /// Load and validate settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let settings: Self =
            cfg.try_deserialize().context("failed to deserialise configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.store_path.as_os_str().is_empty() {
            anyhow::bail!("STORE_PATH must not be empty");
        }
        if self.log_level.trim().is_empty() {
            anyhow::bail!("LOG_LEVEL must not be empty");
        }
        Ok(())
    }
}

impl KeyProvider for Settings {
    fn encryption_key(&self) -> Result<SecretVec<u8>, KeyProviderError> {
        env_key(self.encryption_key.as_ref(), ENCRYPTION_KEY_NAME)
    }

    fn blind_index_key(&self) -> Result<SecretVec<u8>, KeyProviderError> {
        env_key(self.blind_index_key.as_ref(), BLIND_INDEX_KEY_NAME)
    }
}

fn env_key(value: Option<&SecretString>, name: &str) -> Result<SecretVec<u8>, KeyProviderError> {
    let value = value
        .filter(|value| !value.expose_secret().is_empty())
        .ok_or_else(|| {
            KeyProviderError::KeyNotFound(format!("{name} environment variable is required"))
        })?;
    Ok(SecretVec::new(value.expose_secret().as_bytes().to_vec()))
}
