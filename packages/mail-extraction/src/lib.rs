//! Iterative Mailbox Search-and-Extract Agent
//!
//! Finds structured records (membership numbers, account ids) for a list of
//! target categories by repeatedly searching a mailbox, reading a few
//! promising messages, and asking a language model what they contain.
//!
//! # Design Philosophy
//!
//! - Explicit state plus a step function: `run_step(state) -> state'`
//! - The model proposes queries and candidates; the agent decides
//! - Every category terminates: found, or exhausted within a fixed budget
//! - Only a rejected mailbox credential stops the loop
//!
//! # Usage
//!
//! ```rust,ignore
//! use mail_extraction::{AgentConfig, MemoryMailbox, Orchestrator, StateFile};
//! use mail_extraction::ai::OpenAiModel;
//!
//! let mailbox = MemoryMailbox::from_json_file("mailbox.json").await?;
//! let model = OpenAiModel::new("sk-...");
//! let orchestrator = Orchestrator::new(mailbox, model, AgentConfig::new(["Acme", "Beta"]))?;
//!
//! let file = StateFile::new("state.json");
//! let mut state = file.load().await?.unwrap_or_else(|| orchestrator.new_state());
//! loop {
//!     let outcome = orchestrator.run_step(&state).await?;
//!     file.save(&outcome.state).await?;
//!     state = outcome.state;
//!     if outcome.is_done() {
//!         break;
//!     }
//! }
//! println!("{}", state.progress());
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams to the message store and the language model
//! - [`types`] - Messages, records, histories, run state, configuration
//! - [`pipeline`] - Cache, planner, selection, extraction, orchestrator
//! - [`stores`] - In-memory mailbox and state-file persistence
//! - [`ai`] - OpenAI language model
//! - [`testing`] - Mock implementations for testing

pub mod ai;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{AgentError, ModelError, StoreError};
pub use traits::{
    ai::{AttemptSummary, ExtractionRequest, LanguageModel, QueryProposal, QueryRequest, Refinement},
    store::MessageStore,
};
pub use types::{
    config::AgentConfig,
    history::{CategoryHistory, CategoryStatus, ExhaustionReason, QueryAttempt},
    message::{MessageContent, MessagePreview},
    record::{NaturalKey, Record, RecordCandidate, RecordId},
    state::{CategoryProgress, Progress, RunState},
};

// Re-export pipeline components
pub use pipeline::{
    AttemptReport, ClosedCategory, DoneReason, Orchestrator, RunOutcome, SearchCache, StepOutcome,
    StepReport,
};

// Re-export stores
pub use stores::{MemoryMailbox, StateFile};

// Re-export testing utilities
pub use testing::{MockMailbox, MockModel};
