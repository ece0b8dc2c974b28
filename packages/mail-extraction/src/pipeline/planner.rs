//! Query planning.
//!
//! The model writes the query text; the planner owns everything around it:
//! the attempt-count check, the refinement hint, the repetition guard, and
//! turning model failures into "done" rather than errors.

use std::collections::BTreeSet;

use crate::error::{ModelError, ModelResult};
use crate::traits::ai::{AttemptSummary, LanguageModel, QueryProposal, QueryRequest, Refinement};
use crate::types::{
    config::AgentConfig,
    history::{CategoryHistory, ExhaustionReason},
};

/// What to do next for a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision {
    /// Run this query
    Query(String),
    /// Stop searching the category
    Done(ExhaustionReason),
}

/// Plans the next query for one category at a time.
pub struct QueryPlanner<'a, M: ?Sized> {
    model: &'a M,
    config: &'a AgentConfig,
}

impl<'a, M: LanguageModel + ?Sized> QueryPlanner<'a, M> {
    pub fn new(model: &'a M, config: &'a AgentConfig) -> Self {
        Self { model, config }
    }

    /// Decide the next query for `history`'s category.
    ///
    /// Never fails: an unusable model answer is a `Done`.
    pub async fn plan(&self, history: &CategoryHistory) -> PlanDecision {
        let max = self.config.max_attempts_per_category;
        if history.attempt_count() >= max {
            return PlanDecision::Done(ExhaustionReason::AttemptLimit);
        }

        let request = QueryRequest {
            category: history.category.clone(),
            attempts: history
                .attempts()
                .iter()
                .map(|a| AttemptSummary {
                    query: a.query.clone(),
                    messages_found: a.messages_found,
                    messages_read: a.messages_read,
                    records_found: a.records_found,
                })
                .collect(),
            refinement: refinement_for(history, self.config.narrow_threshold),
            remaining_attempts: max - history.attempt_count(),
        };

        let query = match self.model.propose_query(&request).await {
            Ok(QueryProposal::Query { query }) if !query.trim().is_empty() => query.trim().to_string(),
            Ok(QueryProposal::Done { done: true }) => {
                tracing::info!(category = %history.category, "planner reported nothing left to try");
                return PlanDecision::Done(ExhaustionReason::PlannerDone);
            }
            Ok(other) => {
                tracing::warn!(category = %history.category, proposal = ?other, "planner returned no usable query");
                return PlanDecision::Done(ExhaustionReason::PlannerUnavailable);
            }
            Err(e) => {
                tracing::warn!(category = %history.category, error = %e, "planner unavailable");
                return PlanDecision::Done(ExhaustionReason::PlannerUnavailable);
            }
        };

        if is_repeated_query(history, &query) {
            tracing::warn!(category = %history.category, query = %query, "planner repeated a previous query");
            return PlanDecision::Done(ExhaustionReason::RepeatedQuery);
        }

        tracing::debug!(
            category = %history.category,
            query = %query,
            refinement = ?request.refinement,
            "planned query"
        );
        PlanDecision::Query(query)
    }
}

/// How the next query should relate to the last one.
pub fn refinement_for(history: &CategoryHistory, narrow_threshold: usize) -> Refinement {
    match history.latest_attempt() {
        None => Refinement::Broad,
        Some(last) if last.messages_found == 0 => Refinement::Alternate,
        Some(last) if last.records_found == 0 && last.messages_found >= narrow_threshold => {
            Refinement::Narrow
        }
        Some(_) => Refinement::Adjacent,
    }
}

/// Case-folded query with runs of whitespace collapsed.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `query` matches a previous attempt's query once normalized.
pub fn is_repeated_query(history: &CategoryHistory, query: &str) -> bool {
    let query = normalize_query(query);
    history
        .attempts()
        .iter()
        .any(|a| normalize_query(&a.query) == query)
}

/// Whether `ids` is exactly the result set of a previous attempt.
///
/// Empty result sets never count as repeats.
pub fn repeats_result_set(history: &CategoryHistory, ids: &[String]) -> bool {
    if ids.is_empty() {
        return false;
    }
    let set: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
    history.attempts().iter().any(|a| a.message_id_set() == set)
}

/// Parse a model's planning answer, tolerating markdown code fences.
pub fn parse_query_proposal(text: &str) -> ModelResult<QueryProposal> {
    serde_json::from_str(text)
        .or_else(|_| serde_json::from_str(strip_code_fence(text)))
        .map_err(|e| ModelError::unparsable(format!("query proposal: {e}")))
}

/// Strip a surrounding markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
