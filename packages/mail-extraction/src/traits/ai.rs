//! Language model trait.
//!
//! The model is used in two narrow roles:
//! - Query proposal: given a category's attempt history, suggest the next
//!   search query or say there is nothing left worth trying
//! - Extraction: given fetched messages, report candidate records
//!
//! Both are plain request/response. Retries and backoff belong to the
//! implementation; the agent only distinguishes "usable answer" from "treat
//! as empty / done".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelResult;
use crate::types::{
    message::MessageContent,
    record::{NaturalKey, RecordCandidate},
};

/// LLM operations needed by the planner and the extractor.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Propose the next search query for a category.
    async fn propose_query(&self, request: &QueryRequest) -> ModelResult<QueryProposal>;

    /// Extract candidate records for a category from fetched messages.
    ///
    /// `request.known_keys` lists what is already known; implementations
    /// should ask the model not to repeat them, but callers never rely on it.
    async fn extract_records(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> ModelResult<Vec<RecordCandidate>>;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for std::sync::Arc<T> {
    async fn propose_query(&self, request: &QueryRequest) -> ModelResult<QueryProposal> {
        (**self).propose_query(request).await
    }

    async fn extract_records(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> ModelResult<Vec<RecordCandidate>> {
        (**self).extract_records(request).await
    }
}

/// How the next query should relate to the previous ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Refinement {
    /// First attempt: a broad query scoped to the category (sender domain).
    Broad,
    /// Last query returned many messages but no records: add filters.
    Narrow,
    /// Last query returned nothing: try different terms or senders.
    Alternate,
    /// Last query returned a few messages without records: try nearby terms.
    Adjacent,
}

impl Refinement {
    /// Instruction text handed to the model.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Broad => {
                "This is the first search. Propose a broad query scoped to the category, \
                 such as a sender-domain filter."
            }
            Self::Narrow => {
                "The last query matched many messages but none held a record. Propose a \
                 NARROWER query: keep the scope and add subject or keyword filters. Do not \
                 repeat or broaden a previous query."
            }
            Self::Alternate => {
                "The last query matched nothing. Propose a different query: other sender \
                 domains, the program's brand name, or common subject wording."
            }
            Self::Adjacent => {
                "The last query matched a few messages without records. Propose a query \
                 that targets different messages from the same sender or program."
            }
        }
    }
}

/// Summary of one past attempt, as shown to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub query: String,
    pub messages_found: usize,
    pub messages_read: usize,
    pub records_found: usize,
}

/// Input for query proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub category: String,

    /// All prior attempts, oldest first
    pub attempts: Vec<AttemptSummary>,

    pub refinement: Refinement,

    /// Attempts left before the category is exhausted
    pub remaining_attempts: usize,
}

/// Model answer to a query proposal: `{"query": "..."}` or `{"done": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryProposal {
    Query { query: String },
    Done { done: bool },
}

impl QueryProposal {
    pub fn query(query: impl Into<String>) -> Self {
        Self::Query {
            query: query.into(),
        }
    }

    pub fn done() -> Self {
        Self::Done { done: true }
    }
}

/// Input for record extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub category: &'a str,
    pub messages: &'a [MessageContent],

    /// Natural keys already in the record set
    pub known_keys: &'a [NaturalKey],
}
