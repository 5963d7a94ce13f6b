// ── Token persistence ──
//
// Implements `vigil_core::TokenStore` on top of the OS keyring, with a
// plain-file fallback for headless machines where no secret service is
// running. Failures are logged rather than propagated: losing token
// persistence degrades to "log in again next start", never to a broken
// session.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vigil_api::TokenPair;
use vigil_core::TokenStore;

const KEYRING_SERVICE: &str = "vigil";
const KEYRING_USER: &str = "session-tokens";

/// Where the serialized token pair lives.
pub enum TokenStoreBackend {
    /// OS keyring, falling back to the given file when the keyring is
    /// unavailable.
    Keyring { fallback: PathBuf },
    /// Plain file only (tests, containers).
    File(PathBuf),
}

/// Durable token storage for the session manager.
pub struct KeyringTokenStore {
    backend: TokenStoreBackend,
}

#[derive(Serialize, Deserialize)]
struct StoredTokens {
    access: String,
    refresh: Option<String>,
}

impl From<&TokenPair> for StoredTokens {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access: pair.access.expose_secret().to_owned(),
            refresh: pair
                .refresh
                .as_ref()
                .map(|r| r.expose_secret().to_owned()),
        }
    }
}

impl From<StoredTokens> for TokenPair {
    fn from(stored: StoredTokens) -> Self {
        Self {
            access: SecretString::from(stored.access),
            refresh: stored.refresh.map(SecretString::from),
        }
    }
}

impl KeyringTokenStore {
    /// Keyring-backed store with the conventional file fallback.
    pub fn new() -> Self {
        Self {
            backend: TokenStoreBackend::Keyring {
                fallback: crate::state_dir().join("tokens.json"),
            },
        }
    }

    /// File-only store at an explicit path.
    pub fn file_backed(path: PathBuf) -> Self {
        Self {
            backend: TokenStoreBackend::File(path),
        }
    }

    fn keyring_entry() -> Option<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER).ok()
    }

    fn load_file(path: &std::path::Path) -> Option<TokenPair> {
        let bytes = std::fs::read(path).ok()?;
        match serde_json::from_slice::<StoredTokens>(&bytes) {
            Ok(stored) => Some(stored.into()),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "ignoring corrupt token file");
                None
            }
        }
    }

    fn save_file(path: &std::path::Path, stored: &StoredTokens) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_vec(stored)?)
        };
        if let Err(err) = write() {
            warn!(path = %path.display(), error = %err, "failed to persist tokens to file");
        }
    }

    fn clear_file(path: &std::path::Path) {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove token file"),
        }
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Option<TokenPair> {
        match &self.backend {
            TokenStoreBackend::Keyring { fallback } => {
                if let Some(entry) = Self::keyring_entry() {
                    if let Ok(secret) = entry.get_password() {
                        if let Ok(stored) = serde_json::from_str::<StoredTokens>(&secret) {
                            return Some(stored.into());
                        }
                    }
                }
                Self::load_file(fallback)
            }
            TokenStoreBackend::File(path) => Self::load_file(path),
        }
    }

    fn save(&self, tokens: &TokenPair) {
        let stored = StoredTokens::from(tokens);
        match &self.backend {
            TokenStoreBackend::Keyring { fallback } => {
                let serialized = match serde_json::to_string(&stored) {
                    Ok(serialized) => serialized,
                    Err(err) => {
                        warn!(error = %err, "failed to serialize tokens");
                        return;
                    }
                };
                let keyring_ok = Self::keyring_entry()
                    .is_some_and(|entry| entry.set_password(&serialized).is_ok());
                if !keyring_ok {
                    debug!("keyring unavailable, persisting tokens to file fallback");
                    Self::save_file(fallback, &stored);
                }
            }
            TokenStoreBackend::File(path) => Self::save_file(path, &stored),
        }
    }

    fn clear(&self) {
        match &self.backend {
            TokenStoreBackend::Keyring { fallback } => {
                if let Some(entry) = Self::keyring_entry() {
                    let _ = entry.delete_credential();
                }
                Self::clear_file(fallback);
            }
            TokenStoreBackend::File(path) => Self::clear_file(path),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pair(access: &str, refresh: Option<&str>) -> TokenPair {
        TokenPair {
            access: SecretString::from(access.to_owned()),
            refresh: refresh.map(|r| SecretString::from(r.to_owned())),
        }
    }

    #[test]
    fn file_backed_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyringTokenStore::file_backed(dir.path().join("tokens.json"));

        assert!(store.load().is_none());
        store.save(&pair("acc", Some("ref")));

        let loaded = store.load().unwrap();
        assert_eq!(loaded.access.expose_secret(), "acc");
        assert_eq!(loaded.refresh.unwrap().expose_secret(), "ref");
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyringTokenStore::file_backed(dir.path().join("tokens.json"));

        store.save(&pair("acc", None));
        store.clear();
        store.clear();
        assert!(store.load().is_none());
    }

    #[test]
    fn corrupt_token_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, b"][").unwrap();
        let store = KeyringTokenStore::file_backed(path);
        assert!(store.load().is_none());
    }
}
