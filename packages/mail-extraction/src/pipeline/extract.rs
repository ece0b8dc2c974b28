//! Record extraction and merging.
//!
//! The model proposes candidates; nothing it says is trusted for identity.
//! Every candidate is re-validated here and deduplicated on its natural key
//! against what is already known, so a model that ignores the known-key
//! list still cannot produce a duplicate record.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{ModelError, ModelResult};
use crate::pipeline::planner::strip_code_fence;
use crate::traits::ai::{ExtractionRequest, LanguageModel};
use crate::types::{
    message::MessageContent,
    record::{normalize_category, NaturalKey, Record, RecordCandidate},
};

/// Wire shape of an extraction answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResponse {
    #[serde(default)]
    pub records: Vec<RecordCandidate>,
}

/// Parse a model's extraction answer.
///
/// Accepts `{"records": [...]}` or a bare array, with or without a markdown
/// code fence.
pub fn parse_extraction_response(text: &str) -> ModelResult<Vec<RecordCandidate>> {
    let body = strip_code_fence(text);
    if body.starts_with('[') {
        return serde_json::from_str(body)
            .map_err(|e| ModelError::unparsable(format!("extraction array: {e}")));
    }
    serde_json::from_str::<ExtractionResponse>(body)
        .map(|r| r.records)
        .map_err(|e| ModelError::unparsable(format!("extraction response: {e}")))
}

/// Turns fetched messages into new records.
pub struct Extractor<'a, M: ?Sized> {
    model: &'a M,
}

impl<'a, M: LanguageModel + ?Sized> Extractor<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }

    /// Extract records for `category` that are not already `known`.
    ///
    /// A failed or unusable model call yields no records.
    pub async fn extract(
        &self,
        category: &str,
        messages: &[MessageContent],
        known: &HashSet<NaturalKey>,
    ) -> Vec<Record> {
        if messages.is_empty() {
            return Vec::new();
        }

        let mut known_keys: Vec<NaturalKey> = known
            .iter()
            .filter(|k| k.category == normalize_category(category))
            .cloned()
            .collect();
        known_keys.sort();

        let request = ExtractionRequest {
            category,
            messages,
            known_keys: &known_keys,
        };

        let candidates = match self.model.extract_records(&request).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(category, error = %e, "extraction unavailable, treating as empty");
                return Vec::new();
            }
        };

        tracing::debug!(category, candidates = candidates.len(), "model proposed candidates");
        merge_candidates(category, candidates, messages, known)
    }
}

/// Validate candidates and keep only new ones, first occurrence wins.
pub fn merge_candidates(
    category: &str,
    candidates: Vec<RecordCandidate>,
    messages: &[MessageContent],
    known: &HashSet<NaturalKey>,
) -> Vec<Record> {
    let wanted = normalize_category(category);
    let mut seen: HashSet<NaturalKey> = HashSet::new();
    let mut records = Vec::new();

    for candidate in candidates {
        // A blank category means the model left it out.
        let candidate_category = normalize_category(&candidate.category);
        if !candidate_category.is_empty() && candidate_category != wanted {
            tracing::debug!(
                category,
                candidate_category = %candidate.category,
                "dropping candidate for another category"
            );
            continue;
        }

        let key = NaturalKey::new(category, &candidate.key_value);
        if key.is_blank() {
            tracing::debug!(category, "dropping candidate with blank key");
            continue;
        }
        if known.contains(&key) || !seen.insert(key.clone()) {
            tracing::debug!(category, key = %key, "dropping duplicate candidate");
            continue;
        }

        let Some(source) = provenance(&candidate, messages) else {
            continue;
        };

        let mut fields = candidate.fields;
        if let Some(name) = candidate.program_name {
            fields.insert("program_name".into(), name);
        }
        if let Some(tier) = candidate.tier {
            fields.insert("tier".into(), tier);
        }

        records.push(Record {
            id: key.record_id(),
            category: category.to_string(),
            key_value: candidate.key_value.trim().to_string(),
            fields,
            source_message_id: source.id.clone(),
            source_date: source.date,
            source_subject: source.subject.clone(),
            confidence: candidate.confidence.min(100),
            extracted_at: Utc::now(),
        });
    }

    records
}

/// The message a candidate came from: the one it cites if present in the
/// batch, else the first whose body contains the value, else the first.
fn provenance<'m>(
    candidate: &RecordCandidate,
    messages: &'m [MessageContent],
) -> Option<&'m MessageContent> {
    let value = candidate.key_value.trim();
    let matched = candidate
        .source_message_id
        .as_deref()
        .and_then(|id| messages.iter().find(|m| m.id == id))
        .or_else(|| messages.iter().find(|m| m.body.contains(value)));
    if matched.is_some() {
        return matched;
    }

    let first = messages.first()?;
    tracing::warn!(
        key_value = value,
        message_id = %first.id,
        "key value not found in any fetched message, attributing to first"
    );
    Some(first)
}
