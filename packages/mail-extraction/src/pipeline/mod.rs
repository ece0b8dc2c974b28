//! The search-and-extract pipeline.
//!
//! The orchestrator drives one step at a time through:
//! - Query planning (model-proposed, guarded against repeats)
//! - Cached search and batched fetch
//! - Relevance selection of which hits to read
//! - Extraction with natural-key deduplication

pub mod cache;
pub mod extract;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod select;

pub use cache::{FetchBatch, SearchCache, DEFAULT_CACHE_CAPACITY, DEFAULT_SEARCH_HISTORY_LIMIT};
pub use extract::{merge_candidates, parse_extraction_response, ExtractionResponse, Extractor};
pub use orchestrator::{
    AttemptReport, ClosedCategory, DoneReason, Orchestrator, RunOutcome, StepOutcome, StepReport,
};
pub use planner::{
    is_repeated_query, normalize_query, parse_query_proposal, refinement_for, repeats_result_set,
    PlanDecision, QueryPlanner,
};
pub use prompts::{
    format_extract_records_prompt, format_plan_query_prompt, EXTRACT_RECORDS_PROMPT,
    PLAN_QUERY_PROMPT, SYSTEM_PROMPT,
};
pub use select::{relevance_score, select_previews};
