//! The step function.
//!
//! `run_step` takes a state and returns the next one. One step plans, runs,
//! and records at most one query for one category:
//!
//! ```text
//! pick category ─▶ plan ─▶ search ─▶ select ─▶ fetch ─▶ extract ─▶ merge ─▶ record attempt
//!      ▲             │                  │
//!      └── exhausted ┴── repeated set ──┘
//! ```
//!
//! The input state is never touched. All work happens on a clone that is
//! returned whole, so an error (a rejected credential) leaves the caller
//! holding the previous state and nothing half-applied.

use serde::Serialize;

use crate::error::Result;
use crate::pipeline::{
    cache::FetchBatch,
    extract::Extractor,
    planner::{repeats_result_set, PlanDecision, QueryPlanner},
    select::select_previews,
};
use crate::traits::{ai::LanguageModel, store::MessageStore};
use crate::types::{
    config::AgentConfig,
    history::{CategoryStatus, ExhaustionReason, QueryAttempt},
    state::RunState,
};

/// Why the run has nothing left to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    /// Every category is found or exhausted
    AllResolved,
    /// `max_total_attempts` was reached
    BudgetExhausted,
}

/// What one recorded attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub category: String,
    pub query: String,
    pub status: CategoryStatus,
    pub messages_found: usize,
    pub messages_read: usize,
    pub records_added: usize,
}

/// A category closed during a step without an attempt being recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedCategory {
    pub category: String,
    pub reason: ExhaustionReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepReport {
    /// One query ran and its attempt was recorded
    Attempted(AttemptReport),
    /// Nothing left to do; further steps are no-ops
    Done(DoneReason),
}

/// Result of one step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// The state to persist and pass to the next step
    pub state: RunState,

    pub report: StepReport,

    /// Categories exhausted on the way to `report`
    pub closed: Vec<ClosedCategory>,
}

impl StepOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self.report, StepReport::Done(_))
    }
}

/// Result of driving several steps.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: RunState,

    /// Steps that recorded an attempt
    pub steps: usize,

    /// Set when the run finished rather than hitting the step limit
    pub done: Option<DoneReason>,
}

/// Drives the search loop over a message store and a language model.
pub struct Orchestrator<S, M> {
    store: S,
    model: M,
    config: AgentConfig,
}

impl<S: MessageStore, M: LanguageModel> Orchestrator<S, M> {
    /// Create an orchestrator. Fails on an invalid configuration.
    pub fn new(store: S, model: M, config: AgentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            model,
            config,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// A fresh state for this orchestrator's categories.
    pub fn new_state(&self) -> RunState {
        RunState::new(&self.config)
    }

    /// Advance the run by one attempt.
    ///
    /// Only a store authentication failure is an error; every other failure
    /// is absorbed into the returned state.
    pub async fn run_step(&self, state: &RunState) -> Result<StepOutcome> {
        let mut next = state.clone();
        next.track_categories(&self.config.categories);
        next.cache.configure(&self.config);

        let mut closed = Vec::new();

        loop {
            let Some(category) = self.next_category(&next) else {
                tracing::info!(run_id = %next.run_id, records = next.record_count(), "all categories resolved");
                return Ok(StepOutcome {
                    state: next,
                    report: StepReport::Done(DoneReason::AllResolved),
                    closed,
                });
            };

            if let Some(budget) = self.config.max_total_attempts {
                if next.total_attempts() >= budget {
                    tracing::info!(run_id = %next.run_id, budget, "attempt budget exhausted");
                    return Ok(StepOutcome {
                        state: next,
                        report: StepReport::Done(DoneReason::BudgetExhausted),
                        closed,
                    });
                }
            }

            let decision = QueryPlanner::new(&self.model, &self.config)
                .plan(next.history_mut(&category))
                .await;

            let query = match decision {
                PlanDecision::Query(query) => query,
                PlanDecision::Done(reason) => {
                    next.history_mut(&category).mark_exhausted(reason)?;
                    tracing::info!(run_id = %next.run_id, category = %category, reason = %reason, "category exhausted");
                    closed.push(ClosedCategory { category, reason });
                    continue;
                }
            };

            let previews = match next.cache.search(&self.store, &query).await {
                Ok(previews) => previews,
                Err(e) if e.is_auth() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(category = %category, query = %query, error = %e, "search failed, recording empty attempt");
                    Vec::new()
                }
            };
            let found_ids: Vec<String> = previews.iter().map(|p| p.id.clone()).collect();

            if repeats_result_set(next.history_mut(&category), &found_ids) {
                let reason = ExhaustionReason::RepeatedResults;
                next.history_mut(&category).mark_exhausted(reason)?;
                tracing::warn!(
                    run_id = %next.run_id,
                    category = %category,
                    query = %query,
                    "query returned a previously seen result set"
                );
                closed.push(ClosedCategory { category, reason });
                continue;
            }

            let selected: Vec<String> =
                select_previews(&previews, next.history_mut(&category), &self.config)
                    .into_iter()
                    .map(|p| p.id.clone())
                    .collect();

            // Only a rejected credential comes back as an error here.
            let batch = if selected.is_empty() {
                FetchBatch::default()
            } else {
                next.cache.fetch_batch(&self.store, &selected).await?
            };
            for (id, error) in &batch.failed {
                tracing::warn!(category = %category, message_id = %id, error = %error, "message not read");
            }

            let known = next.known_keys();
            let records = Extractor::new(&self.model)
                .extract(&category, &batch.messages, &known)
                .await;
            let records_added = next.add_records(records);

            let read_ids: Vec<String> = batch.messages.iter().map(|m| m.id.clone()).collect();
            let attempt = QueryAttempt::new(query.clone(), found_ids)
                .with_read(read_ids)
                .with_failed(batch.failed_ids())
                .with_records_found(records_added);
            let messages_found = attempt.messages_found;
            let messages_read = attempt.messages_read;

            let status = next
                .history_mut(&category)
                .record_attempt(attempt, self.config.max_attempts_per_category)?;

            tracing::info!(
                run_id = %next.run_id,
                category = %category,
                query = %query,
                messages_found,
                messages_read,
                records_added,
                status = %status,
                "attempt recorded"
            );

            return Ok(StepOutcome {
                state: next,
                report: StepReport::Attempted(AttemptReport {
                    category,
                    query,
                    status,
                    messages_found,
                    messages_read,
                    records_added,
                }),
                closed,
            });
        }
    }

    /// Step until done or until `max_steps` attempts have been recorded.
    pub async fn run_until_done(&self, state: RunState, max_steps: usize) -> Result<RunOutcome> {
        let mut state = state;
        let mut steps = 0;

        while steps < max_steps {
            let outcome = self.run_step(&state).await?;
            state = outcome.state;
            match outcome.report {
                StepReport::Done(reason) => {
                    return Ok(RunOutcome {
                        state,
                        steps,
                        done: Some(reason),
                    })
                }
                StepReport::Attempted(_) => steps += 1,
            }
        }

        Ok(RunOutcome {
            state,
            steps,
            done: None,
        })
    }

    /// First configured category that still needs searching.
    fn next_category(&self, state: &RunState) -> Option<String> {
        self.config
            .categories
            .iter()
            .find(|c| !state.status(c).is_some_and(CategoryStatus::is_terminal))
            .map(|c| c.trim().to_string())
    }
}
