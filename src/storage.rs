//! Secret storage using the OS credential store.
//!
//! On Windows this uses DPAPI (via the `keyring` crate), on macOS Keychain,
//! and on Linux the Secret Service API. Headless hosts without a secret
//! service can supply the same values through `PRINTER_CRM_*` variables,
//! which [`crate::config`] loads as fallbacks.

use keyring::Entry;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;
use zeroize::Zeroizing;

use crate::error::{CrmError, CrmResult};

const SERVICE_NAME: &str = "printer-service-crm";

/// OAuth bearer token for the Google Sheets API.
pub const KEY_SHEETS_TOKEN: &str = "sheets_access_token";
/// bcrypt hash of the shared shop password.
pub const KEY_PASSWORD_HASH: &str = "password_hash";

pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Zeroizing<String>>;
    fn set(&self, key: &str, value: &str) -> CrmResult<()>;
    fn delete(&self, key: &str) -> CrmResult<()>;

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Keyring-backed store with optional per-key fallbacks.
#[derive(Default)]
pub struct KeyringStore {
    fallbacks: HashMap<String, Zeroizing<String>>,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value returned for `key` when the keyring has no entry.
    pub fn with_fallback(mut self, key: &str, value: Zeroizing<String>) -> Self {
        if !value.trim().is_empty() {
            self.fallbacks.insert(key.to_string(), value);
        }
        self
    }

    fn entry(key: &str) -> CrmResult<Entry> {
        Entry::new(SERVICE_NAME, key).map_err(|e| CrmError::Credential(e.to_string()))
    }

    fn keyring_value(key: &str) -> Option<Zeroizing<String>> {
        let entry = match Entry::new(SERVICE_NAME, key) {
            Ok(e) => e,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to create entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(pw) => Some(Zeroizing::new(pw)),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to read credential");
                None
            }
        }
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: &str) -> Option<Zeroizing<String>> {
        Self::keyring_value(key).or_else(|| self.fallbacks.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> CrmResult<()> {
        Self::entry(key)?
            .set_password(value)
            .map_err(|e| CrmError::Credential(e.to_string()))
    }

    fn delete(&self, key: &str) -> CrmResult<()> {
        match Self::entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CrmError::Credential(e.to_string())),
        }
    }
}

/// Process-local credentials for tests and the in-memory backend.
#[derive(Default)]
pub struct MemoryCredentials {
    values: Mutex<HashMap<String, Zeroizing<String>>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentials {
    fn get(&self, key: &str) -> Option<Zeroizing<String>> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> CrmResult<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| CrmError::Credential("credential lock poisoned".into()))?;
        values.insert(key.to_string(), Zeroizing::new(value.to_string()));
        Ok(())
    }

    fn delete(&self, key: &str) -> CrmResult<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| CrmError::Credential("credential lock poisoned".into()))?;
        values.remove(key);
        Ok(())
    }
}
