//! Testing utilities including mock implementations.
//!
//! These let applications exercise the agent loop without a live mailbox or
//! real LLM calls.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use crate::error::{ModelError, ModelResult, StoreError, StoreResult};
use crate::stores::memory::MemoryMailbox;
use crate::traits::{
    ai::{ExtractionRequest, LanguageModel, QueryProposal, QueryRequest, Refinement},
    store::MessageStore,
};
use crate::types::{
    message::{MessageContent, MessagePreview},
    record::{normalize_category, NaturalKey, RecordCandidate},
};

/// Record of a call made to the mock mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockStoreCall {
    Search { query: String },
    Fetch { ids: Vec<String> },
}

/// A call-tracking mailbox with failure injection.
///
/// Wraps a `MemoryMailbox`; every search and fetch is logged so tests can
/// assert the cache kept traffic off the store.
pub struct MockMailbox {
    inner: MemoryMailbox,
    calls: RwLock<Vec<MockStoreCall>>,
    failing_ids: RwLock<HashSet<String>>,
    failing_queries: RwLock<HashSet<String>>,
    auth_failure: RwLock<bool>,
    fetch_auth_failure: RwLock<bool>,
}

impl MockMailbox {
    pub fn new(inner: MemoryMailbox) -> Self {
        Self {
            inner,
            calls: RwLock::new(Vec::new()),
            failing_ids: RwLock::new(HashSet::new()),
            failing_queries: RwLock::new(HashSet::new()),
            auth_failure: RwLock::new(false),
            fetch_auth_failure: RwLock::new(false),
        }
    }

    /// Convenience constructor from messages.
    pub fn with_messages(messages: impl IntoIterator<Item = MessageContent>) -> Self {
        Self::new(MemoryMailbox::with_messages(messages))
    }

    /// Make any fetch that includes `id` fail.
    pub fn fail_fetch(&self, id: impl Into<String>) {
        self.failing_ids.write().unwrap().insert(id.into());
    }

    /// Make searches for `query` fail.
    pub fn fail_search(&self, query: impl Into<String>) {
        self.failing_queries.write().unwrap().insert(query.into());
    }

    /// Reject every call as unauthenticated.
    pub fn fail_auth(&self) {
        *self.auth_failure.write().unwrap() = true;
    }

    /// Reject fetches as unauthenticated while searches still succeed.
    pub fn fail_fetch_auth(&self) {
        *self.fetch_auth_failure.write().unwrap() = true;
    }

    /// Accept calls again after `fail_auth` or `fail_fetch_auth`.
    pub fn restore_auth(&self) {
        *self.auth_failure.write().unwrap() = false;
        *self.fetch_auth_failure.write().unwrap() = false;
    }

    pub fn calls(&self) -> Vec<MockStoreCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    /// Every query sent to the store, in order.
    pub fn search_queries(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockStoreCall::Search { query } => Some(query),
                MockStoreCall::Fetch { .. } => None,
            })
            .collect()
    }

    /// Every id requested from the store, in order (duplicates kept).
    pub fn fetched_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .flat_map(|c| match c {
                MockStoreCall::Fetch { ids } => ids,
                MockStoreCall::Search { .. } => Vec::new(),
            })
            .collect()
    }

    fn check_auth(&self) -> StoreResult<()> {
        if *self.auth_failure.read().unwrap() {
            return Err(StoreError::Auth("mock credentials rejected".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MockMailbox {
    async fn search(&self, query: &str) -> StoreResult<Vec<MessagePreview>> {
        self.calls.write().unwrap().push(MockStoreCall::Search {
            query: query.to_string(),
        });
        self.check_auth()?;

        if self.failing_queries.read().unwrap().contains(query) {
            return Err(StoreError::search(query, "mock search failure"));
        }
        self.inner.search(query).await
    }

    async fn fetch(&self, ids: &[String]) -> StoreResult<Vec<MessageContent>> {
        self.calls
            .write()
            .unwrap()
            .push(MockStoreCall::Fetch { ids: ids.to_vec() });
        self.check_auth()?;
        if *self.fetch_auth_failure.read().unwrap() {
            return Err(StoreError::Auth("mock credentials expired".into()));
        }

        let failing = self.failing_ids.read().unwrap().clone();
        if ids.iter().any(|id| failing.contains(id)) {
            return Err(StoreError::fetch(ids.iter().cloned(), "mock fetch failure"));
        }
        self.inner.fetch(ids).await
    }
}

/// Record of a call made to the mock model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockModelCall {
    ProposeQuery {
        category: String,
        attempts: usize,
        refinement: Refinement,
    },
    ExtractRecords {
        category: String,
        message_ids: Vec<String>,
        known_keys: Vec<NaturalKey>,
    },
}

/// A scripted language model for testing.
///
/// Query proposals are played back per category in order; once a script
/// runs out the model answers `done`. Extraction returns the candidates
/// registered for the messages it is shown. It deliberately ignores
/// `known_keys`, so tests exercise the agent's own deduplication.
#[derive(Default)]
pub struct MockModel {
    proposals: RwLock<HashMap<String, VecDeque<ModelResult<QueryProposal>>>>,
    records: RwLock<HashMap<String, Vec<RecordCandidate>>>,
    failing_extractions: RwLock<HashSet<String>>,
    calls: RwLock<Vec<MockModelCall>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue query proposals for a category.
    pub fn with_queries(self, category: &str, queries: &[&str]) -> Self {
        for query in queries {
            self.push_proposal(category, Ok(QueryProposal::query(*query)));
        }
        self
    }

    /// Queue an explicit `done` for a category.
    pub fn with_done(self, category: &str) -> Self {
        self.push_proposal(category, Ok(QueryProposal::done()));
        self
    }

    /// Queue a failed planning call for a category.
    pub fn with_planner_failure(self, category: &str) -> Self {
        self.push_proposal(category, Err(ModelError::unparsable("mock planner failure")));
        self
    }

    /// Register a record the model "finds" in a message.
    ///
    /// The candidate's source is set to `message_id` unless already given.
    pub fn with_record(self, message_id: &str, mut candidate: RecordCandidate) -> Self {
        if candidate.source_message_id.is_none() {
            candidate.source_message_id = Some(message_id.to_string());
        }
        self.records
            .write()
            .unwrap()
            .entry(message_id.to_string())
            .or_default()
            .push(candidate);
        self
    }

    /// Make every extraction call for a category fail.
    pub fn with_extraction_failure(self, category: &str) -> Self {
        self.failing_extractions
            .write()
            .unwrap()
            .insert(normalize_category(category));
        self
    }

    pub fn calls(&self) -> Vec<MockModelCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    /// Planning calls made for a category.
    pub fn planning_calls(&self, category: &str) -> usize {
        let category = normalize_category(category);
        self.calls()
            .iter()
            .filter(|call| {
                matches!(call, MockModelCall::ProposeQuery { category: name, .. }
                    if normalize_category(name) == category)
            })
            .count()
    }

    fn push_proposal(&self, category: &str, proposal: ModelResult<QueryProposal>) {
        self.proposals
            .write()
            .unwrap()
            .entry(normalize_category(category))
            .or_default()
            .push_back(proposal);
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn propose_query(&self, request: &QueryRequest) -> ModelResult<QueryProposal> {
        self.calls.write().unwrap().push(MockModelCall::ProposeQuery {
            category: request.category.clone(),
            attempts: request.attempts.len(),
            refinement: request.refinement,
        });

        self.proposals
            .write()
            .unwrap()
            .get_mut(&normalize_category(&request.category))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(QueryProposal::done()))
    }

    async fn extract_records(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> ModelResult<Vec<RecordCandidate>> {
        self.calls.write().unwrap().push(MockModelCall::ExtractRecords {
            category: request.category.to_string(),
            message_ids: request.messages.iter().map(|m| m.id.clone()).collect(),
            known_keys: request.known_keys.to_vec(),
        });

        if self
            .failing_extractions
            .read()
            .unwrap()
            .contains(&normalize_category(request.category))
        {
            return Err(ModelError::unparsable("mock extraction failure"));
        }

        let records = self.records.read().unwrap();
        Ok(request
            .messages
            .iter()
            .filter_map(|m| records.get(&m.id))
            .flatten()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(category: &str) -> QueryRequest {
        QueryRequest {
            category: category.to_string(),
            attempts: Vec::new(),
            refinement: Refinement::Broad,
            remaining_attempts: 5,
        }
    }

    #[tokio::test]
    async fn test_mock_model_plays_script_then_done() {
        let model = MockModel::new().with_queries("Acme", &["from:acme.com"]);

        let first = model.propose_query(&request("acme")).await.unwrap();
        let second = model.propose_query(&request("Acme")).await.unwrap();

        assert_eq!(first, QueryProposal::query("from:acme.com"));
        assert_eq!(second, QueryProposal::done());
        assert_eq!(model.planning_calls("ACME"), 2);
    }

    #[tokio::test]
    async fn test_mock_model_returns_records_for_shown_messages() {
        let model = MockModel::new().with_record("m1", RecordCandidate::new("Acme", "123"));
        let messages = vec![
            MessageContent::new("m0", "s", "a@acme.com", Utc::now(), "b"),
            MessageContent::new("m1", "s", "a@acme.com", Utc::now(), "b"),
        ];
        let request = ExtractionRequest {
            category: "Acme",
            messages: &messages,
            known_keys: &[],
        };

        let records = model.extract_records(&request).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_message_id.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn test_mock_mailbox_logs_and_fails() {
        let mailbox = MockMailbox::with_messages([MessageContent::new(
            "m1",
            "Welcome",
            "a@acme.com",
            Utc::now(),
            "body",
        )]);
        mailbox.fail_search("broken");

        assert!(mailbox.search("broken").await.is_err());
        assert_eq!(mailbox.search("welcome").await.unwrap().len(), 1);
        assert_eq!(mailbox.search_queries(), vec!["broken", "welcome"]);

        mailbox.fail_auth();
        assert!(mailbox.fetch_one("m1").await.unwrap_err().is_auth());
        mailbox.restore_auth();
        assert!(mailbox.fetch_one("m1").await.is_ok());
    }
}
