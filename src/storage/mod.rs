//! Durable key/value storage for conversations and memory entries
//!
//! The engine only needs `get`/`set` semantics from its store, captured by
//! the [`KeyValueStore`] trait. [`SledStore`] persists to an embedded `sled`
//! database; [`InMemoryStore`] keeps everything in process for tests and
//! throwaway sessions. [`ConversationStore`] layers typed conversation
//! records on top of either.

use crate::conversation::Conversation;
use crate::error::{ParleyError, Result};
use anyhow::Context;
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

pub mod types;
pub use types::StoredSession;

const CONVERSATION_PREFIX: &str = "conversation:";
const MEMORY_PREFIX: &str = "memory:";

/// Store key of a conversation record
pub fn conversation_key(id: &str) -> String {
    format!("{}{}", CONVERSATION_PREFIX, id)
}

/// Store key of a conversation's memory entries
pub fn memory_key(id: &str) -> String {
    format!("{}{}", MEMORY_PREFIX, id)
}

/// Minimal durable store contract
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is absent
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or replace a value
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete a value; deleting an absent key is not an error
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys starting with `prefix`, in key order
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Read and deserialize a JSON value
pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| ParleyError::Storage(format!("Deserialization failed: {}", e)))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Serialize and write a JSON value
pub fn set_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| ParleyError::Storage(format!("Serialization failed: {}", e)))?;
    store.set(key, &bytes)
}

/// Key/value store backed by an embedded `sled` database
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open or create a store at `path`
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::Storage` if the database cannot be opened
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::storage::{KeyValueStore, SledStore};
    ///
    /// # fn main() -> parley::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let store = SledStore::new(dir.path().join("parley.sled"))?;
    /// store.set("greeting", b"hello")?;
    /// assert_eq!(store.get("greeting")?, Some(b"hello".to_vec()));
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ParleyError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    /// Open the store at `path`, or in the user's data directory when `None`
    pub fn open(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            tracing::debug!("Opening conversation store at {}", path);
            return Self::new(path);
        }

        let proj_dirs = ProjectDirs::from("dev", "parley", "parley")
            .ok_or_else(|| ParleyError::Storage("Could not determine data directory".into()))?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| ParleyError::Storage(e.to_string()))?;

        let db_path = data_dir.join("parley.sled");
        tracing::debug!("Opening conversation store at {}", db_path.display());
        Self::new(db_path)
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| ParleyError::Storage(format!("Get failed: {}", e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| ParleyError::Storage(format!("Insert failed: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| ParleyError::Storage(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| ParleyError::Storage(format!("Remove failed: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| ParleyError::Storage(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for result in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, _) =
                result.map_err(|e| ParleyError::Storage(format!("Iteration failed: {}", e)))?;
            keys.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(keys)
    }
}

/// Process-local store, lost on exit
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ParleyError::Storage("Failed to acquire read lock".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ParleyError::Storage("Failed to acquire write lock".to_string()))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ParleyError::Storage("Failed to acquire write lock".to_string()))?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ParleyError::Storage("Failed to acquire read lock".to_string()))?;
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Typed conversation persistence over a [`KeyValueStore`]
#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConversationStore {
    /// Wraps a key/value store
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The underlying key/value store
    pub fn backend(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    /// Save or replace a conversation
    pub fn save(&self, conversation: &Conversation) -> Result<()> {
        set_json(self.store.as_ref(), &conversation_key(&conversation.id), conversation)
    }

    /// Load a conversation by full ID or unique ID prefix
    pub fn load(&self, id: &str) -> Result<Option<Conversation>> {
        match self.resolve_id(id)? {
            Some(full_id) => get_json(self.store.as_ref(), &conversation_key(&full_id)),
            None => Ok(None),
        }
    }

    /// List stored conversations, most recently updated first
    pub fn list(&self) -> Result<Vec<StoredSession>> {
        let mut sessions = Vec::new();
        for key in self.store.keys(CONVERSATION_PREFIX)? {
            match get_json::<Conversation>(self.store.as_ref(), &key) {
                Ok(Some(conversation)) => sessions.push(StoredSession::from(&conversation)),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping unreadable conversation {}: {}", key, e),
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Delete a conversation and its memory entries
    ///
    /// Returns `false` when no conversation matched `id`.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let Some(full_id) = self.resolve_id(id)? else {
            return Ok(false);
        };
        self.store.remove(&conversation_key(&full_id))?;
        self.store.remove(&memory_key(&full_id))?;
        tracing::info!("Deleted conversation {}", full_id);
        Ok(true)
    }

    /// Resolve a full ID or an unambiguous ID prefix (such as the 8-character
    /// short form shown in listings) to a stored conversation ID
    pub fn resolve_id(&self, id: &str) -> Result<Option<String>> {
        if id.is_empty() {
            return Ok(None);
        }
        let matches: Vec<String> = self
            .store
            .keys(&conversation_key(id))?
            .into_iter()
            .filter_map(|k| k.strip_prefix(CONVERSATION_PREFIX).map(str::to_string))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.into_iter().next()),
            _ => {
                if matches.iter().any(|m| m == id) {
                    Ok(Some(id.to_string()))
                } else {
                    Err(ParleyError::Storage(format!(
                        "Conversation ID prefix '{}' is ambiguous ({} matches)",
                        id,
                        matches.len()
                    ))
                    .into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;
    use crate::providers::ProviderKind;

    fn conversation(title: &str) -> Conversation {
        let mut c = Conversation::new(ProviderKind::OpenAi, "gpt-4o-mini", "sys", 256, 0.3);
        c.title = title.to_string();
        c
    }

    #[test]
    fn test_in_memory_store_roundtrip() {
        let store = InMemoryStore::new();
        assert!(store.get("k").unwrap().is_none());
        store.set("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn test_keys_filters_by_prefix() {
        let store = InMemoryStore::new();
        store.set("conversation:a", b"1").unwrap();
        store.set("memory:a", b"2").unwrap();
        store.set("conversation:b", b"3").unwrap();
        assert_eq!(
            store.keys("conversation:").unwrap(),
            vec!["conversation:a".to_string(), "conversation:b".to_string()]
        );
    }

    #[test]
    fn test_sled_store_keys_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::new(dir.path().join("db")).unwrap();
        store.set("memory:x", b"[]").unwrap();
        store.set("conversation:x", b"{}").unwrap();
        assert_eq!(store.keys("memory:").unwrap(), vec!["memory:x".to_string()]);
        store.remove("memory:x").unwrap();
        assert!(store.keys("memory:").unwrap().is_empty());
    }

    #[test]
    fn test_conversation_store_save_and_load() {
        let store = ConversationStore::new(Arc::new(InMemoryStore::new()));
        let mut c = conversation("first");
        c.push_exchange(Message::user("hi"), Message::assistant("hello"));
        store.save(&c).unwrap();

        let loaded = store.load(&c.id).unwrap().unwrap();
        assert_eq!(loaded.id, c.id);
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[1].content, "hello");
    }

    #[test]
    fn test_conversation_store_load_by_prefix() {
        let store = ConversationStore::new(Arc::new(InMemoryStore::new()));
        let c = conversation("prefixed");
        store.save(&c).unwrap();
        let loaded = store.load(&c.id[..8]).unwrap();
        assert_eq!(loaded.unwrap().id, c.id);
        assert!(store.load("ZZZZZZZZ").unwrap().is_none());
        assert!(store.load("").unwrap().is_none());
    }

    #[test]
    fn test_conversation_store_list_newest_first() {
        let store = ConversationStore::new(Arc::new(InMemoryStore::new()));
        let mut older = conversation("older");
        older.updated_at = chrono::Utc::now() - chrono::Duration::hours(1);
        let newer = conversation("newer");
        store.save(&older).unwrap();
        store.save(&newer).unwrap();

        let sessions = store.list().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].title, "newer");
        assert_eq!(sessions[1].title, "older");
    }

    #[test]
    fn test_conversation_store_delete_removes_memory() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let store = ConversationStore::new(Arc::clone(&backend));
        let c = conversation("doomed");
        store.save(&c).unwrap();
        backend.set(&memory_key(&c.id), b"[]").unwrap();

        assert!(store.delete(&c.id).unwrap());
        assert!(store.load(&c.id).unwrap().is_none());
        assert!(backend.get(&memory_key(&c.id)).unwrap().is_none());
        assert!(!store.delete(&c.id).unwrap());
    }
}
