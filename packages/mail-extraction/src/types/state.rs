//! The whole persisted state of an extraction run.
//!
//! `RunState` is plain data. The orchestrator is the only writer: it clones
//! the state, applies one step to the clone, and hands the clone back, so a
//! caller always holds either the old state or the complete new one.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::pipeline::cache::SearchCache;
use crate::types::{
    config::AgentConfig,
    history::{CategoryHistory, CategoryStatus, ExhaustionReason, QueryAttempt},
    record::{normalize_category, NaturalKey, Record},
};

/// Records, per-category histories, and the search cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Correlates log lines and state files of one run
    pub run_id: Uuid,

    pub started_at: DateTime<Utc>,

    /// Categories in priority order, as configured
    categories: Vec<String>,

    /// Append-only, unique by natural key
    records: Vec<Record>,

    /// Keyed by normalized category; created on first attempt
    histories: IndexMap<String, CategoryHistory>,

    /// May be dropped between runs
    #[serde(default)]
    pub cache: SearchCache,
}

impl RunState {
    /// A fresh state for the configured categories.
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            categories: config.categories.clone(),
            records: Vec::new(),
            histories: IndexMap::new(),
            cache: SearchCache::from_config(config),
        }
    }

    /// Categories tracked by this run, in priority order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Start tracking configured categories this state has not seen.
    ///
    /// Lets a persisted run resume under a config with added categories.
    pub fn track_categories(&mut self, categories: &[String]) {
        for category in categories {
            let key = normalize_category(category);
            if !self.categories.iter().any(|c| normalize_category(c) == key) {
                self.categories.push(category.clone());
            }
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Records extracted for one category.
    pub fn records_for<'a>(&'a self, category: &str) -> impl Iterator<Item = &'a Record> + 'a {
        let key = normalize_category(category);
        self.records
            .iter()
            .filter(move |r| normalize_category(&r.category) == key)
    }

    /// Natural keys of every record so far.
    pub fn known_keys(&self) -> HashSet<NaturalKey> {
        self.records.iter().map(Record::natural_key).collect()
    }

    /// History for a category, if it has been searched.
    pub fn history(&self, category: &str) -> Option<&CategoryHistory> {
        self.histories.get(&normalize_category(category))
    }

    pub fn histories(&self) -> impl Iterator<Item = &CategoryHistory> {
        self.histories.values()
    }

    /// Status of a category; `None` before its first plan.
    pub fn status(&self, category: &str) -> Option<CategoryStatus> {
        self.history(category).map(CategoryHistory::status)
    }

    /// Most recent attempt for a category.
    pub fn latest_attempt(&self, category: &str) -> Option<&QueryAttempt> {
        self.history(category).and_then(CategoryHistory::latest_attempt)
    }

    /// Attempts across all categories.
    pub fn total_attempts(&self) -> usize {
        self.histories.values().map(CategoryHistory::attempt_count).sum()
    }

    /// History for a category, created in `Searching` if missing.
    pub(crate) fn history_mut(&mut self, category: &str) -> &mut CategoryHistory {
        self.histories
            .entry(normalize_category(category))
            .or_insert_with(|| CategoryHistory::new(category))
    }

    /// Append records, skipping any whose natural key is already present.
    ///
    /// Returns how many were added.
    pub(crate) fn add_records(&mut self, records: Vec<Record>) -> usize {
        let mut known = self.known_keys();
        let before = self.records.len();
        for record in records {
            if known.insert(record.natural_key()) {
                self.records.push(record);
            }
        }
        self.records.len() - before
    }

    /// Snapshot for display and monitoring.
    pub fn progress(&self) -> Progress {
        Progress {
            run_id: self.run_id,
            total_records: self.records.len(),
            total_attempts: self.total_attempts(),
            categories: self
                .categories
                .iter()
                .map(|category| {
                    let history = self.history(category);
                    CategoryProgress {
                        category: category.clone(),
                        status: history.map(CategoryHistory::status),
                        exhaustion: history.and_then(CategoryHistory::exhaustion),
                        attempts: history.map_or(0, CategoryHistory::attempt_count),
                        records: self.records_for(category).count(),
                        latest_attempt: history.and_then(|h| h.latest_attempt().cloned()),
                    }
                })
                .collect(),
        }
    }
}

/// Progress of one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryProgress {
    pub category: String,

    /// `None` until the category is first planned
    pub status: Option<CategoryStatus>,

    pub exhaustion: Option<ExhaustionReason>,
    pub attempts: usize,
    pub records: usize,
    pub latest_attempt: Option<QueryAttempt>,
}

/// Progress of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub run_id: Uuid,
    pub total_records: usize,
    pub total_attempts: usize,
    pub categories: Vec<CategoryProgress>,
}

impl Progress {
    /// Whether every category reached a terminal status.
    pub fn is_complete(&self) -> bool {
        self.categories
            .iter()
            .all(|c| c.status.is_some_and(CategoryStatus::is_terminal))
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {}: {} record(s), {} attempt(s)",
            self.run_id, self.total_records, self.total_attempts
        )?;
        writeln!(
            f,
            "{:<24} {:<11} {:>8} {:>7}  {}",
            "CATEGORY", "STATUS", "ATTEMPTS", "RECORDS", "LAST QUERY"
        )?;
        for c in &self.categories {
            let status = match (c.status, c.exhaustion) {
                (None, _) => "pending".to_string(),
                (Some(CategoryStatus::Exhausted), Some(reason)) => format!("exhausted ({reason})"),
                (Some(status), _) => status.to_string(),
            };
            let last = c
                .latest_attempt
                .as_ref()
                .map(|a| format!("{} ({} found)", a.query, a.messages_found))
                .unwrap_or_default();
            writeln!(
                f,
                "{:<24} {:<11} {:>8} {:>7}  {}",
                c.category, status, c.attempts, c.records, last
            )?;
        }
        Ok(())
    }
}
