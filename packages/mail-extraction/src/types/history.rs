//! Per-category search history and its status state machine.
//!
//! ```text
//! (unsearched) ──first plan──▶ Searching ──records_found > 0──▶ Found
//!                                  │
//!                                  └──limit / planner done / repeat──▶ Exhausted
//! ```
//!
//! `Found` and `Exhausted` are terminal. `Found` is terminal even when the
//! category might hold more records: progress is favored over recall.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{AgentError, Result};

/// One search performed for one category. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAttempt {
    /// Exact query string sent to the store
    pub query: String,

    pub attempted_at: DateTime<Utc>,

    /// Previews returned by the search
    pub messages_found: usize,

    /// Bodies actually fetched and inspected
    pub messages_read: usize,

    /// New records (post-dedup) this attempt contributed
    pub records_found: usize,

    /// Ids returned by the search, in store order
    pub message_ids: Vec<String>,

    /// Ids whose bodies were inspected
    #[serde(default)]
    pub read_message_ids: Vec<String>,

    /// Ids that were selected but could not be fetched
    #[serde(default)]
    pub failed_message_ids: Vec<String>,
}

impl QueryAttempt {
    /// Start an attempt for `query` with the ids the search returned.
    pub fn new(query: impl Into<String>, message_ids: Vec<String>) -> Self {
        Self {
            query: query.into(),
            attempted_at: Utc::now(),
            messages_found: message_ids.len(),
            messages_read: 0,
            records_found: 0,
            message_ids,
            read_message_ids: Vec::new(),
            failed_message_ids: Vec::new(),
        }
    }

    pub fn with_read(mut self, ids: Vec<String>) -> Self {
        self.messages_read = ids.len();
        self.read_message_ids = ids;
        self
    }

    pub fn with_failed(mut self, ids: Vec<String>) -> Self {
        self.failed_message_ids = ids;
        self
    }

    pub fn with_records_found(mut self, count: usize) -> Self {
        self.records_found = count;
        self
    }

    /// The returned ids as an order-independent set.
    pub fn message_id_set(&self) -> BTreeSet<&str> {
        self.message_ids.iter().map(String::as_str).collect()
    }
}

/// Lifecycle status of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryStatus {
    Searching,
    Found,
    Exhausted,
}

impl CategoryStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Searching)
    }
}

impl fmt::Display for CategoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Searching => "searching",
            Self::Found => "found",
            Self::Exhausted => "exhausted",
        })
    }
}

/// Why a category stopped without being found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// The planner judged further refinement pointless
    PlannerDone,
    /// The planning call failed or was unparsable
    PlannerUnavailable,
    /// `max_attempts_per_category` attempts found nothing
    AttemptLimit,
    /// The planner proposed a query already tried
    RepeatedQuery,
    /// The query returned exactly the set a prior attempt returned
    RepeatedResults,
}

impl fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PlannerDone => "planner done",
            Self::PlannerUnavailable => "planner unavailable",
            Self::AttemptLimit => "attempt limit",
            Self::RepeatedQuery => "repeated query",
            Self::RepeatedResults => "repeated results",
        })
    }
}

/// Search history for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryHistory {
    pub category: String,

    /// Chronological; never edited or truncated
    attempts: Vec<QueryAttempt>,

    status: CategoryStatus,

    #[serde(default)]
    exhaustion: Option<ExhaustionReason>,
}

impl CategoryHistory {
    /// A fresh history in `Searching`.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            attempts: Vec::new(),
            status: CategoryStatus::Searching,
            exhaustion: None,
        }
    }

    pub fn status(&self) -> CategoryStatus {
        self.status
    }

    pub fn exhaustion(&self) -> Option<ExhaustionReason> {
        self.exhaustion
    }

    pub fn attempts(&self) -> &[QueryAttempt] {
        &self.attempts
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn latest_attempt(&self) -> Option<&QueryAttempt> {
        self.attempts.last()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Total records contributed across all attempts.
    pub fn records_found(&self) -> usize {
        self.attempts.iter().map(|a| a.records_found).sum()
    }

    /// Whether `id` was inspected by any earlier attempt.
    pub fn has_read(&self, id: &str) -> bool {
        self.attempts
            .iter()
            .any(|a| a.read_message_ids.iter().any(|read| read == id))
    }

    /// Append an attempt and apply the transition rule.
    ///
    /// Returns the resulting status. Fails if the category is already
    /// terminal; histories never move backwards.
    pub fn record_attempt(
        &mut self,
        attempt: QueryAttempt,
        max_attempts: usize,
    ) -> Result<CategoryStatus> {
        self.ensure_searching()?;

        let found = attempt.records_found > 0;
        self.attempts.push(attempt);

        if found {
            self.status = CategoryStatus::Found;
        } else if self.attempts.len() >= max_attempts {
            self.status = CategoryStatus::Exhausted;
            self.exhaustion = Some(ExhaustionReason::AttemptLimit);
        }

        Ok(self.status)
    }

    /// Stop searching this category without a new attempt.
    pub fn mark_exhausted(&mut self, reason: ExhaustionReason) -> Result<()> {
        self.ensure_searching()?;
        self.status = CategoryStatus::Exhausted;
        self.exhaustion = Some(reason);
        Ok(())
    }

    fn ensure_searching(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AgentError::TerminalCategory {
                category: self.category.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }
}
