//! Lightweight semantic memory per conversation
//!
//! Each completed turn is embedded into a small bag-of-hashed-words vector
//! and kept in a capacity-bounded list. Retrieval scores entries by cosine
//! similarity. Embeddings are computed locally and are deterministic.
//!
//! Store failures never reach callers. They are logged and the index
//! degrades to "nothing recalled".

use crate::storage::{get_json, memory_key, set_json, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use ulid::Ulid;

/// Number of hash buckets in an embedding
pub const DIMENSION: usize = 64;

/// Default number of entries kept per conversation
pub const DEFAULT_CAPACITY: usize = 200;

/// Embed text into a fixed-length, L2-normalized vector
///
/// Tokens are lowercased, whitespace-separated words, each hashed into one
/// of [`DIMENSION`] buckets.
///
/// # Examples
///
/// ```
/// use parley::memory::{embed, DIMENSION};
///
/// let v = embed("Hello hello world");
/// assert_eq!(v.len(), DIMENSION);
/// assert_eq!(v, embed("HELLO hello   World"));
/// ```
pub fn embed(text: &str) -> [f32; DIMENSION] {
    let mut vector = [0.0f32; DIMENSION];
    for token in text.to_lowercase().split_whitespace() {
        vector[bucket(token)] += 1.0;
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm = if norm == 0.0 { 1.0 } else { norm };
    for x in vector.iter_mut() {
        *x /= norm;
    }
    vector
}

fn bucket(token: &str) -> usize {
    let hash = token
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32));
    (hash % DIMENSION as u32) as usize
}

/// Cosine similarity of two vectors, clamped to `[-1, 1]`
///
/// Returns 0.0 when either vector has zero norm or the lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// One remembered statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique entry identifier (ULID)
    pub id: String,
    /// Source text
    pub text: String,
    /// Normalized embedding of `text`
    pub embedding: Vec<f32>,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    fn new(text: &str) -> Self {
        Self {
            id: Ulid::new().to_string(),
            text: text.to_string(),
            embedding: embed(text).to_vec(),
            timestamp: Utc::now(),
        }
    }
}

/// A recalled entry and its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    /// Source text of the entry
    pub text: String,
    /// Cosine similarity in `(0, 1]`
    pub score: f32,
}

/// Per-conversation memory, written through to a [`KeyValueStore`]
pub struct MemoryIndex {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    cache: HashMap<String, Vec<MemoryEntry>>,
}

impl MemoryIndex {
    /// Creates an index over `store` keeping at most `capacity` entries per
    /// conversation
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            cache: HashMap::new(),
        }
    }

    /// Remember `text` for a conversation, evicting the oldest entries when
    /// over capacity. Blank text is ignored.
    pub fn record(&mut self, conversation_id: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        let capacity = self.capacity;
        let entries = self.entries_mut(conversation_id);
        entries.push(MemoryEntry::new(text));
        if entries.len() > capacity {
            let overflow = entries.len() - capacity;
            entries.drain(..overflow);
        }

        let snapshot = entries.clone();
        if let Err(e) = set_json(self.store.as_ref(), &memory_key(conversation_id), &snapshot) {
            tracing::warn!("Failed to persist memory for {}: {}", conversation_id, e);
        }
    }

    /// The `top_k` entries most similar to `query` with a positive score
    ///
    /// Ties keep insertion order.
    pub fn search(&mut self, conversation_id: &str, query: &str, top_k: usize) -> Vec<ScoredMemory> {
        if query.trim().is_empty() || top_k == 0 {
            return Vec::new();
        }

        let entries = self.entries_mut(conversation_id);
        if entries.is_empty() {
            return Vec::new();
        }

        let query_vector = embed(query);
        let mut scored: Vec<ScoredMemory> = entries
            .iter()
            .map(|entry| ScoredMemory {
                text: entry.text.clone(),
                score: cosine(&query_vector, &entry.embedding),
            })
            .filter(|m| m.score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        scored
    }

    /// Number of entries held for a conversation
    pub fn len(&mut self, conversation_id: &str) -> usize {
        self.entries_mut(conversation_id).len()
    }

    /// Drop every entry of a conversation
    pub fn forget(&mut self, conversation_id: &str) {
        self.cache.remove(conversation_id);
        if let Err(e) = self.store.remove(&memory_key(conversation_id)) {
            tracing::warn!("Failed to delete memory for {}: {}", conversation_id, e);
        }
    }

    fn entries_mut(&mut self, conversation_id: &str) -> &mut Vec<MemoryEntry> {
        let store = Arc::clone(&self.store);
        self.cache
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                match get_json::<Vec<MemoryEntry>>(store.as_ref(), &memory_key(conversation_id)) {
                    Ok(entries) => entries.unwrap_or_default(),
                    Err(e) => {
                        tracing::warn!("Failed to load memory for {}: {}", conversation_id, e);
                        Vec::new()
                    }
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn index(capacity: usize) -> MemoryIndex {
        MemoryIndex::new(Arc::new(InMemoryStore::new()), capacity)
    }

    #[test]
    fn test_embed_is_deterministic_and_normalized() {
        let a = embed("The quick brown fox");
        let b = embed("the QUICK brown fox");
        assert_eq!(a, b);
        let norm = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_embed_empty_is_zero_vector() {
        assert!(embed("   ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_cosine_bounds() {
        let v = embed("metric units please");
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-5);
        let w = embed("something else entirely");
        let s = cosine(&v, &w);
        assert!((-1.0..=1.0).contains(&s));
        assert_eq!(cosine(&v, &[0.0; DIMENSION]), 0.0);
        assert_eq!(cosine(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine(&[2.0, 0.0], &[-3.0, 0.0]), -1.0);
    }

    #[test]
    fn test_recall_prefers_relevant_entry() {
        let mut memory = index(DEFAULT_CAPACITY);
        memory.record("c1", "My name is Alex");
        memory.record("c1", "I prefer metric units");

        let results = memory.search("c1", "what system of units do I like?", 3);
        assert!(!results.is_empty());
        assert_eq!(results[0].text, "I prefer metric units");
        assert!(results.iter().all(|r| r.score > 0.0));

        let top = memory.search("c1", "what system of units do I like?", 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].text, "I prefer metric units");
    }

    #[test]
    fn test_search_empty_inputs() {
        let mut memory = index(10);
        assert!(memory.search("c1", "anything", 3).is_empty());
        memory.record("c1", "hello there");
        assert!(memory.search("c1", "  ", 3).is_empty());
        assert!(memory.search("c1", "hello", 0).is_empty());
        assert!(memory.search("other", "hello", 3).is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut memory = index(10);
        memory.record("c1", "alpha first");
        memory.record("c1", "alpha second");
        let results = memory.search("c1", "alpha", 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].score, results[1].score);
        assert_eq!(results[0].text, "alpha first");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut memory = index(3);
        for i in 0..5 {
            memory.record("c1", &format!("entry number {}", i));
        }
        assert_eq!(memory.len("c1"), 3);
        let texts: Vec<String> = memory
            .search("c1", "entry", 10)
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert!(!texts.contains(&"entry number 0".to_string()));
        assert!(!texts.contains(&"entry number 1".to_string()));
        assert!(texts.contains(&"entry number 4".to_string()));
    }

    #[test]
    fn test_blank_text_not_recorded() {
        let mut memory = index(10);
        memory.record("c1", "   ");
        assert_eq!(memory.len("c1"), 0);
    }

    #[test]
    fn test_entries_persist_and_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        {
            let mut memory = MemoryIndex::new(Arc::clone(&store), 10);
            memory.record("c1", "I live in Lisbon");
        }
        let mut reloaded = MemoryIndex::new(Arc::clone(&store), 10);
        let results = reloaded.search("c1", "where do I live", 1);
        assert_eq!(results[0].text, "I live in Lisbon");

        reloaded.forget("c1");
        assert!(store.get(&memory_key("c1")).unwrap().is_none());
        assert_eq!(reloaded.len("c1"), 0);
    }

    #[test]
    fn test_corrupt_store_degrades_to_empty() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        store.set(&memory_key("c1"), b"not json").unwrap();
        let mut memory = MemoryIndex::new(store, 10);
        assert!(memory.search("c1", "anything", 3).is_empty());
        memory.record("c1", "fresh start");
        assert_eq!(memory.len("c1"), 1);
    }
}
