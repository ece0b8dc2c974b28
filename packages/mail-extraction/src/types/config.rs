//! Configuration for the extraction agent.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Keywords that make a subject line worth fetching.
pub const DEFAULT_RELEVANCE_KEYWORDS: &[&str] = &[
    "member",
    "membership",
    "account",
    "number",
    "welcome",
    "statement",
    "rewards",
    "points",
    "status",
];

/// Configuration passed to the orchestrator at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Target categories in priority order.
    pub categories: Vec<String>,

    /// Empty attempts before a category is exhausted.
    ///
    /// Default: 5.
    pub max_attempts_per_category: usize,

    /// Maximum cached message bodies (FIFO eviction).
    ///
    /// Default: 200.
    pub cache_capacity: usize,

    /// Previews fetched per attempt.
    ///
    /// Default: 5.
    pub fetch_batch_size: usize,

    /// Maximum remembered searches.
    ///
    /// Default: 50.
    pub search_history_limit: usize,

    /// How long a remembered search stays fresh, in seconds.
    ///
    /// `None` keeps searches fresh for the whole run.
    pub search_freshness_secs: Option<u64>,

    /// Global attempt budget across all categories.
    ///
    /// `None` means only per-category limits apply.
    pub max_total_attempts: Option<usize>,

    /// A zero-record attempt with at least this many hits asks the planner
    /// to narrow.
    ///
    /// Default: 10.
    pub narrow_threshold: usize,

    /// Subject keywords that boost a preview's fetch priority.
    pub relevance_keywords: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            max_attempts_per_category: 5,
            cache_capacity: 200,
            fetch_batch_size: 5,
            search_history_limit: 50,
            search_freshness_secs: None,
            max_total_attempts: None,
            narrow_threshold: 10,
            relevance_keywords: DEFAULT_RELEVANCE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl AgentConfig {
    /// Create a config for the given categories with default limits.
    pub fn new(categories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max: usize) -> Self {
        self.max_attempts_per_category = max;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_fetch_batch_size(mut self, size: usize) -> Self {
        self.fetch_batch_size = size;
        self
    }

    pub fn with_search_history_limit(mut self, limit: usize) -> Self {
        self.search_history_limit = limit;
        self
    }

    pub fn with_search_freshness_secs(mut self, secs: u64) -> Self {
        self.search_freshness_secs = Some(secs);
        self
    }

    pub fn with_max_total_attempts(mut self, budget: usize) -> Self {
        self.max_total_attempts = Some(budget);
        self
    }

    pub fn with_narrow_threshold(mut self, threshold: usize) -> Self {
        self.narrow_threshold = threshold;
        self
    }

    pub fn with_relevance_keywords(
        mut self,
        keywords: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.relevance_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Reject configurations the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(AgentError::Config("no categories configured".into()));
        }
        if self.categories.iter().any(|c| c.trim().is_empty()) {
            return Err(AgentError::Config("category names must not be blank".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for category in &self.categories {
            if !seen.insert(crate::types::record::normalize_category(category)) {
                return Err(AgentError::Config(format!(
                    "duplicate category: {category}"
                )));
            }
        }
        if self.max_attempts_per_category == 0 {
            return Err(AgentError::Config(
                "max_attempts_per_category must be at least 1".into(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(AgentError::Config("cache_capacity must be at least 1".into()));
        }
        if self.fetch_batch_size == 0 {
            return Err(AgentError::Config(
                "fetch_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
