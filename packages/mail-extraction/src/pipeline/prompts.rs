//! LLM prompts for query planning and record extraction.

use crate::traits::ai::{ExtractionRequest, QueryRequest};

/// Maximum body characters shown to the model per message.
pub const MAX_BODY_CHARS: usize = 4000;

/// System prompt shared by both calls.
pub const SYSTEM_PROMPT: &str = "You help find membership and account records in a personal \
mailbox. Always answer with a single JSON object and nothing else.";

/// Prompt for proposing the next mailbox search.
pub const PLAN_QUERY_PROMPT: &str = r#"We are searching a mailbox for records belonging to: {category}

Search syntax:
- from:domain.com        sender contains the text
- subject:word           subject contains the word
- subject:"two words"    subject contains the phrase
- "exact phrase"         subject or body contains the phrase
- word                   sender, subject, or body contains the word
- -word                  excludes messages matching the term
All terms must match.

Previous searches (oldest first):
{history}

{refinement}

You have {remaining} search(es) left for this category.

Output JSON, one of:
{"query": "the next search query"}
{"done": true}

Answer {"done": true} only if no further search could plausibly find a record."#;

/// Prompt for extracting records from fetched messages.
pub const EXTRACT_RECORDS_PROMPT: &str = r#"Extract membership or account records for: {category}

A record is an identifying value the mailbox owner holds with this program:
a membership number, loyalty number, account id, or similar. Marketing codes,
order numbers, and phone numbers are NOT records.

Already known (do not report these again):
{known_keys}

Messages:
{messages}

Output JSON:
{
    "records": [
        {
            "category": "{category}",
            "key_value": "the identifying value exactly as written",
            "program_name": "program or product name, or null",
            "tier": "tier or status, or null",
            "fields": {"other_field": "value"},
            "confidence": 0-100,
            "source_message_id": "id of the message the value came from"
        }
    ]
}

Return {"records": []} if none of the messages hold a record."#;

/// Format the query planning prompt.
pub fn format_plan_query_prompt(request: &QueryRequest) -> String {
    let history = if request.attempts.is_empty() {
        "(none)".to_string()
    } else {
        request
            .attempts
            .iter()
            .enumerate()
            .map(|(i, a)| {
                format!(
                    "{}. {} -> {} found, {} read, {} records",
                    i + 1,
                    a.query,
                    a.messages_found,
                    a.messages_read,
                    a.records_found
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    PLAN_QUERY_PROMPT
        .replace("{category}", &request.category)
        .replace("{history}", &history)
        .replace("{refinement}", request.refinement.instruction())
        .replace("{remaining}", &request.remaining_attempts.to_string())
}

/// Format the extraction prompt with message bodies and known keys.
pub fn format_extract_records_prompt(request: &ExtractionRequest<'_>) -> String {
    let known_keys = if request.known_keys.is_empty() {
        "(none)".to_string()
    } else {
        request
            .known_keys
            .iter()
            .map(|k| format!("- {}", k.value))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let messages = request
        .messages
        .iter()
        .map(|m| {
            format!(
                "=== MESSAGE: {} ===\nFrom: {}\nDate: {}\nSubject: {}\n\n{}\n",
                m.id,
                m.sender,
                m.date.to_rfc3339(),
                m.subject,
                m.body_excerpt(MAX_BODY_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n");

    EXTRACT_RECORDS_PROMPT
        .replace("{category}", request.category)
        .replace("{known_keys}", &known_keys)
        .replace("{messages}", &messages)
}
