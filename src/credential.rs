//! Inference credential storage and the session context
//!
//! The inference API key lives in exactly one place on the device: by default
//! an entry in the OS native keyring (Keychain on macOS, Secret Service on
//! Linux, Windows Credential Manager on Windows). Chat views never read it
//! directly; they ask [`SessionContext::inference_key`], which reads the store
//! fresh on every call so a key is never cached beyond a single request.

use std::sync::{Arc, Mutex};

use crate::config::CredentialConfig;
use crate::error::{EmrysError, Result};

/// Storage for the single inference credential
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Returns the stored key, or `None` when nothing is stored
    fn load(&self) -> Result<Option<String>>;

    /// Stores or replaces the key
    fn save(&self, key: &str) -> Result<()>;

    /// Removes the key; a no-op when nothing is stored
    fn clear(&self) -> Result<()>;
}

/// Credential store backed by the OS keyring
///
/// # Examples
///
/// ```no_run
/// use emrys::config::CredentialConfig;
/// use emrys::credential::{CredentialStore, KeyringCredentialStore};
///
/// let store = KeyringCredentialStore::new(&CredentialConfig::default());
/// store.save("sk-or-example").unwrap();
/// assert!(store.load().unwrap().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
    account: String,
}

impl KeyringCredentialStore {
    /// Creates a store addressing `credential.service` / `credential.account`
    pub fn new(config: &CredentialConfig) -> Self {
        Self {
            service: config.service.clone(),
            account: config.account.clone(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, &self.account).map_err(EmrysError::Keyring)?)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(key) if key.trim().is_empty() => Ok(None),
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(EmrysError::Keyring(e).into()),
        }
    }

    fn save(&self, key: &str) -> Result<()> {
        self.entry()?
            .set_password(key.trim())
            .map_err(EmrysError::Keyring)?;
        tracing::info!(service = %self.service, "Stored inference credential");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(EmrysError::Keyring(e).into()),
        }
    }
}

/// Credential store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    key: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `key`
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Mutex::new(Some(key.into())),
        }
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>> {
        self.key
            .lock()
            .map_err(|_| EmrysError::Config("credential store lock poisoned".to_string()).into())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.slot()?.clone())
    }

    fn save(&self, key: &str) -> Result<()> {
        *self.slot()? = Some(key.trim().to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot()? = None;
        Ok(())
    }
}

/// Per-user context injected into chat views
///
/// Carries the signed-in user id and the credential store. The inference key
/// is reachable only through [`SessionContext::inference_key`].
#[derive(Clone)]
pub struct SessionContext {
    user_id: String,
    credentials: Arc<dyn CredentialStore>,
}

impl SessionContext {
    /// Creates a context for `user_id`
    pub fn new(user_id: impl Into<String>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            user_id: user_id.into(),
            credentials,
        }
    }

    /// The signed-in user's id
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Whether a credential is currently stored
    pub fn has_credential(&self) -> bool {
        matches!(self.credentials.load(), Ok(Some(_)))
    }

    /// Reads the inference key for one request
    ///
    /// # Errors
    ///
    /// Returns [`EmrysError::MissingCredential`] when no key is stored, or the
    /// store's own error when it cannot be read.
    pub fn inference_key(&self) -> Result<String> {
        match self.credentials.load()? {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(EmrysError::MissingCredential.into()),
        }
    }

    /// Stores a key entered at the credential prompt
    ///
    /// Blank input is rejected with [`EmrysError::Validation`].
    pub fn store_key(&self, key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(EmrysError::Validation("API key must not be empty".to_string()).into());
        }
        self.credentials.save(key)
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
