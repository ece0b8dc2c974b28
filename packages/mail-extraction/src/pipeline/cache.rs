//! Bounded search and message cache.
//!
//! Two pieces of memory sit in front of the message store:
//! - `entries`: fetched bodies keyed by message id, at most `capacity` of
//!   them, evicted strictly first-in-first-out (a hit does not refresh an
//!   entry's position)
//! - `search_history`: recent `query -> previews` results, at most
//!   `history_limit` of them
//!
//! The cache is an optimization only. Dropping it (or any entry) costs a
//! refetch, never correctness.

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::MessageStore;
use crate::types::{
    config::AgentConfig,
    message::{MessageContent, MessagePreview},
};

/// Default number of cached bodies.
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

/// Default number of remembered searches.
pub const DEFAULT_SEARCH_HISTORY_LIMIT: usize = 50;

/// One cached message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub message: MessageContent,
    pub cached_at: DateTime<Utc>,
}

/// One remembered search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub searched_at: DateTime<Utc>,
    pub previews: Vec<MessagePreview>,
}

impl SearchRecord {
    pub fn message_ids(&self) -> Vec<String> {
        self.previews.iter().map(|p| p.id.clone()).collect()
    }
}

/// Result of fetching a batch of ids.
#[derive(Debug, Default)]
pub struct FetchBatch {
    /// Fetched messages, in request order
    pub messages: Vec<MessageContent>,

    /// Ids that could not be fetched, with the reason
    pub failed: Vec<(String, StoreError)>,
}

impl FetchBatch {
    pub fn failed_ids(&self) -> Vec<String> {
        self.failed.iter().map(|(id, _)| id.clone()).collect()
    }
}

/// FIFO message cache plus recent search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCache {
    capacity: usize,
    history_limit: usize,

    #[serde(default)]
    freshness_secs: Option<u64>,

    entries: IndexMap<String, CacheEntry>,
    search_history: VecDeque<SearchRecord>,
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl SearchCache {
    /// Create an empty cache holding at most `capacity` bodies.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history_limit: DEFAULT_SEARCH_HISTORY_LIMIT,
            freshness_secs: None,
            entries: IndexMap::new(),
            search_history: VecDeque::new(),
        }
    }

    /// Create a cache sized by the agent configuration.
    pub fn from_config(config: &AgentConfig) -> Self {
        let mut cache = Self::new(config.cache_capacity);
        cache.configure(config);
        cache
    }

    /// Apply limits from the configuration, evicting as needed.
    ///
    /// Used when a persisted cache is resumed under a different config.
    pub fn configure(&mut self, config: &AgentConfig) {
        self.history_limit = config.search_history_limit;
        self.freshness_secs = config.search_freshness_secs;
        self.set_capacity(config.cache_capacity);
        self.trim_history();
    }

    /// Change the body capacity, evicting the oldest entries if it shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.evict_oldest();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&MessageContent> {
        self.entries.get(id).map(|e| &e.message)
    }

    /// Cached ids, oldest first.
    pub fn cached_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Remembered searches, oldest first.
    pub fn search_history(&self) -> impl Iterator<Item = &SearchRecord> {
        self.search_history.iter()
    }

    /// Drop every cached body and search.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.search_history.clear();
    }

    /// Search through the cache.
    ///
    /// A query seen within the freshness window is answered from memory;
    /// otherwise the store is asked and the result remembered.
    pub async fn search<S>(&mut self, store: &S, query: &str) -> StoreResult<Vec<MessagePreview>>
    where
        S: MessageStore + ?Sized,
    {
        if let Some(record) = self.fresh_search(query) {
            tracing::debug!(query, hits = record.previews.len(), "search served from cache");
            return Ok(record.previews.clone());
        }

        let previews = store.search(query).await?;

        self.search_history.retain(|r| r.query != query);
        self.search_history.push_back(SearchRecord {
            query: query.to_string(),
            searched_at: Utc::now(),
            previews: previews.clone(),
        });
        self.trim_history();

        Ok(previews)
    }

    /// Fetch one message through the cache.
    pub async fn fetch<S>(&mut self, store: &S, id: &str) -> StoreResult<MessageContent>
    where
        S: MessageStore + ?Sized,
    {
        if let Some(message) = self.get(id) {
            return Ok(message.clone());
        }

        let message = store.fetch_one(id).await?;
        self.insert(message.clone());
        Ok(message)
    }

    /// Fetch several messages, asking the store once for all misses.
    ///
    /// Non-auth failures are confined to the ids they affect: a failed
    /// batch request is retried id by id, and ids the store silently
    /// omitted are reported as not found. Auth failures abort the batch.
    pub async fn fetch_batch<S>(&mut self, store: &S, ids: &[String]) -> StoreResult<FetchBatch>
    where
        S: MessageStore + ?Sized,
    {
        let misses: Vec<String> = ids.iter().filter(|id| !self.contains(id)).cloned().collect();

        let mut fetched: HashMap<String, MessageContent> = HashMap::new();
        let mut failed: Vec<(String, StoreError)> = Vec::new();

        if !misses.is_empty() {
            match store.fetch(&misses).await {
                Ok(messages) => {
                    for message in messages {
                        if misses.contains(&message.id) {
                            fetched.insert(message.id.clone(), message);
                        }
                    }
                    for id in &misses {
                        if !fetched.contains_key(id) {
                            failed.push((id.clone(), StoreError::MessageNotFound { id: id.clone() }));
                        }
                    }
                }
                Err(err) if err.is_auth() => return Err(err),
                Err(err) if misses.len() == 1 => {
                    failed.push((misses[0].clone(), err));
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        count = misses.len(),
                        "batch fetch failed, retrying per message"
                    );
                    for id in &misses {
                        match store.fetch_one(id).await {
                            Ok(message) => {
                                fetched.insert(id.clone(), message);
                            }
                            Err(err) if err.is_auth() => return Err(err),
                            Err(err) => failed.push((id.clone(), err)),
                        }
                    }
                }
            }
        }

        let mut batch = FetchBatch {
            messages: Vec::with_capacity(ids.len()),
            failed,
        };
        for id in ids {
            if let Some(message) = fetched.remove(id) {
                self.insert(message.clone());
                batch.messages.push(message);
            } else if let Some(message) = self.get(id) {
                batch.messages.push(message.clone());
            }
        }

        Ok(batch)
    }

    /// Insert a fetched message, evicting the oldest entry when full.
    pub fn insert(&mut self, message: MessageContent) {
        if !self.entries.contains_key(&message.id) {
            while self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            message.id.clone(),
            CacheEntry {
                message,
                cached_at: Utc::now(),
            },
        );
    }

    fn evict_oldest(&mut self) {
        if let Some((id, _)) = self.entries.shift_remove_index(0) {
            tracing::trace!(message_id = %id, "evicted cached message");
        }
    }

    fn fresh_search(&self, query: &str) -> Option<&SearchRecord> {
        let record = self.search_history.iter().rev().find(|r| r.query == query)?;
        match self.freshness_secs {
            None => Some(record),
            Some(secs) => match i64::try_from(secs).ok().and_then(Duration::try_seconds) {
                Some(max_age) => (Utc::now() - record.searched_at <= max_age).then_some(record),
                // Window too large to represent: fresh for the whole run.
                None => Some(record),
            },
        }
    }

    fn trim_history(&mut self) {
        while self.search_history.len() > self.history_limit {
            self.search_history.pop_front();
        }
    }
}
