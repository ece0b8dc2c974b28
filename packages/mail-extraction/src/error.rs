//! Typed errors for the extraction agent.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell a
//! blocking condition (the store rejected our credentials) apart from the
//! failures the loop absorbs on its own.

use thiserror::Error;

/// Boxed error source used where the underlying client error type varies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a message store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected our credentials. Not retryable by the agent.
    #[error("message store rejected credentials: {0}")]
    Auth(String),

    /// A search request failed.
    #[error("search failed for {query:?}: {source}")]
    Search {
        query: String,
        #[source]
        source: BoxError,
    },

    /// A fetch request failed for the given ids.
    #[error("fetch failed for {} message(s): {source}", .ids.len())]
    Fetch {
        ids: Vec<String>,
        #[source]
        source: BoxError,
    },

    /// The store has no message with this id.
    #[error("message not found: {id}")]
    MessageNotFound { id: String },
}

impl StoreError {
    /// Build a fetch error from any error source.
    pub fn fetch(ids: impl IntoIterator<Item = impl Into<String>>, source: impl Into<BoxError>) -> Self {
        Self::Fetch {
            ids: ids.into_iter().map(Into::into).collect(),
            source: source.into(),
        }
    }

    /// Build a search error from any error source.
    pub fn search(query: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Search {
            query: query.into(),
            source: source.into(),
        }
    }

    /// Whether this error needs intervention outside the agent.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Errors raised by a language model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Transport or API failure.
    #[error("model request failed: {0}")]
    Request(#[source] BoxError),

    /// The model answered, but not in a shape we can use.
    #[error("unparsable model response: {reason}")]
    Unparsable { reason: String },
}

impl ModelError {
    pub fn unparsable(reason: impl Into<String>) -> Self {
        Self::Unparsable {
            reason: reason.into(),
        }
    }
}

/// Top-level agent errors.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The message store rejected our credentials; the loop does not advance.
    #[error("message store rejected credentials: {0}")]
    StoreAuth(String),

    /// A store failure that could not be absorbed.
    #[error("message store error: {0}")]
    Store(#[source] StoreError),

    /// Reading or writing a file (state, mailbox export) failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Tried to move a category out of a terminal status.
    #[error("category {category:?} is already {status}")]
    TerminalCategory { category: String, status: String },
}

impl From<StoreError> for AgentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Auth(message) => Self::StoreAuth(message),
            other => Self::Store(other),
        }
    }
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Result type alias for message store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for language model operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;
