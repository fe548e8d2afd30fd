use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::warn;

use crate::types::TokenPair;

// Storage keys are private so the encoding can change without touching callers.
const ACCESS_KEY: &str = "token";
const REFRESH_KEY: &str = "refreshToken";
const SCHEMA_KEY: &str = "api_schema_yaml";
const SCHEMA_TS_KEY: &str = "api_schema_yaml_ts";

/// Durable key/value storage. Implementations must never fail outward:
/// a write that cannot be persisted is dropped, a read that cannot be
/// served is a miss.
pub trait Storage: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str);
    fn clear(&self, name: &str);
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, name: &str) -> Option<String> {
        self.entries.get(name).map(|v| v.value().clone())
    }

    fn set(&self, name: &str, value: &str) {
        self.entries.insert(name.to_string(), value.to_string());
    }

    fn clear(&self, name: &str) {
        self.entries.remove(name);
    }
}

/// JSON document on disk. Loaded once on open; every write rewrites the
/// whole file. I/O failures are logged and swallowed.
pub struct FileStorage {
    path: PathBuf,
    doc: Mutex<Map<String, Value>>,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "session file unreadable, starting empty");
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        Self {
            path,
            doc: Mutex::new(doc),
        }
    }

    fn flush(&self, doc: &Map<String, Value>) {
        let text = match serde_json::to_string(doc) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to serialize session document");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, text) {
            warn!(path = %self.path.display(), error = %e, "failed to persist session document");
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, name: &str) -> Option<String> {
        let doc = match self.doc.lock() {
            Ok(d) => d,
            Err(_) => return None,
        };
        doc.get(name).and_then(|v| v.as_str()).map(String::from)
    }

    fn set(&self, name: &str, value: &str) {
        if let Ok(mut doc) = self.doc.lock() {
            doc.insert(name.to_string(), Value::String(value.to_string()));
            self.flush(&doc);
        }
    }

    fn clear(&self, name: &str) {
        if let Ok(mut doc) = self.doc.lock() {
            if doc.remove(name).is_some() {
                self.flush(&doc);
            }
        }
    }
}

/// The only component allowed to touch credential storage. Carries a session
/// epoch so that a token refresh racing an explicit logout can never
/// resurrect cleared credentials: logout bumps the epoch, and refresh-side
/// writes go through [`SessionStore::set_access_if_epoch`].
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    epoch: AtomicU64,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn access_token(&self) -> Option<String> {
        self.storage.get(ACCESS_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.storage.get(REFRESH_KEY).filter(|t| !t.is_empty())
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        Some(TokenPair {
            access: self.access_token()?,
            refresh: self.refresh_token()?,
        })
    }

    pub fn set_tokens(&self, tokens: &TokenPair) {
        self.storage.set(ACCESS_KEY, &tokens.access);
        self.storage.set(REFRESH_KEY, &tokens.refresh);
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Persist a refreshed access token, unless the session was cleared (or
    /// replaced) since `observed_epoch` was read. Returns whether the write
    /// was applied.
    pub fn set_access_if_epoch(&self, access: &str, observed_epoch: u64) -> bool {
        if self.epoch.load(Ordering::SeqCst) != observed_epoch {
            return false;
        }
        self.storage.set(ACCESS_KEY, access);
        true
    }

    pub fn clear_tokens(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.storage.clear(ACCESS_KEY);
        self.storage.clear(REFRESH_KEY);
    }

    pub fn schema(&self) -> Option<(String, u64)> {
        let yaml = self.storage.get(SCHEMA_KEY)?;
        let ts = self.storage.get(SCHEMA_TS_KEY)?.parse().ok()?;
        Some((yaml, ts))
    }

    pub fn set_schema(&self, yaml: &str, fetched_at_ms: u64) {
        self.storage.set(SCHEMA_KEY, yaml);
        self.storage.set(SCHEMA_TS_KEY, &fetched_at_ms.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{FileStorage, SessionStore, Storage};
    use crate::types::TokenPair;

    fn pair() -> TokenPair {
        TokenPair {
            access: "acc-1".into(),
            refresh: "ref-1".into(),
        }
    }

    #[test]
    fn tokens_roundtrip_in_memory() {
        let store = SessionStore::in_memory();
        assert!(store.tokens().is_none());

        store.set_tokens(&pair());
        assert_eq!(store.tokens(), Some(pair()));

        store.clear_tokens();
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        {
            let store = SessionStore::new(Arc::new(FileStorage::open(&path)));
            store.set_tokens(&pair());
        }

        let reopened = SessionStore::new(Arc::new(FileStorage::open(&path)));
        assert_eq!(reopened.tokens(), Some(pair()));
    }

    #[test]
    fn file_storage_swallows_unwritable_path() {
        let storage = FileStorage::open("/nonexistent-dir/automart/session.json");
        storage.set("token", "acc");
        // write was dropped, read behaves as a miss after reopen
        let reopened = FileStorage::open("/nonexistent-dir/automart/session.json");
        assert!(reopened.get("token").is_none());
    }

    #[test]
    fn logout_wins_over_late_refresh() {
        let store = SessionStore::in_memory();
        store.set_tokens(&pair());

        let observed = store.epoch();
        store.clear_tokens();

        assert!(!store.set_access_if_epoch("acc-late", observed));
        assert!(store.access_token().is_none());

        // a refresh within the same session still lands
        let current = store.epoch();
        assert!(store.set_access_if_epoch("acc-2", current));
        assert_eq!(store.access_token().as_deref(), Some("acc-2"));
    }

    #[test]
    fn empty_stored_token_reads_as_absent() {
        let store = SessionStore::in_memory();
        store.set_tokens(&TokenPair {
            access: "".into(),
            refresh: "r".into(),
        });
        assert!(store.access_token().is_none());
        assert!(store.tokens().is_none());
    }

    #[test]
    fn schema_roundtrip() {
        let store = SessionStore::in_memory();
        assert!(store.schema().is_none());
        store.set_schema("openapi: 3.0.0", 1_700_000_000_000);
        assert_eq!(
            store.schema(),
            Some(("openapi: 3.0.0".to_string(), 1_700_000_000_000))
        );
    }
}
