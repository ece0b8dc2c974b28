//! Choosing which search hits are worth fetching.
//!
//! Fetching every preview is never allowed: a broad query can return dozens
//! of marketing messages. Previews are ranked by cheap header signals and
//! only the top `fetch_batch_size` are read.

use std::collections::HashSet;

use crate::types::{config::AgentConfig, history::CategoryHistory, message::MessagePreview};

const SENDER_MATCH: u32 = 3;
const SUBJECT_MATCH: u32 = 2;
const KEYWORD_MATCH: u32 = 1;

/// Lower-cased alphanumeric words of a category name.
pub fn category_tokens(category: &str) -> Vec<String> {
    category
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Header-only relevance of a preview to a category.
pub fn relevance_score(preview: &MessagePreview, tokens: &[String], keywords: &[String]) -> u32 {
    let sender = preview.sender.to_lowercase();
    let subject = preview.subject.to_lowercase();

    let mut score = 0;
    if tokens.iter().any(|t| sender.contains(t.as_str())) {
        score += SENDER_MATCH;
    }
    if tokens.iter().any(|t| subject.contains(t.as_str())) {
        score += SUBJECT_MATCH;
    }
    score += keywords
        .iter()
        .filter(|k| subject.contains(k.to_lowercase().as_str()))
        .count() as u32
        * KEYWORD_MATCH;
    score
}

/// Pick the previews to fetch for this attempt.
///
/// Skips ids already read for the category and duplicate ids, ranks the
/// rest (ties keep store order) and keeps at most `fetch_batch_size`.
pub fn select_previews<'a>(
    previews: &'a [MessagePreview],
    history: &CategoryHistory,
    config: &AgentConfig,
) -> Vec<&'a MessagePreview> {
    let tokens = category_tokens(&history.category);
    let mut seen = HashSet::new();

    let mut ranked: Vec<(u32, &MessagePreview)> = previews
        .iter()
        .filter(|p| !history.has_read(&p.id))
        .filter(|p| seen.insert(p.id.as_str()))
        .map(|p| (relevance_score(p, &tokens, &config.relevance_keywords), p))
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    ranked
        .into_iter()
        .take(config.fetch_batch_size)
        .map(|(_, p)| p)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::history::QueryAttempt;
    use chrono::Utc;

    fn preview(id: &str, sender: &str, subject: &str) -> MessagePreview {
        MessagePreview::new(id, subject, sender, Utc::now())
    }

    #[test]
    fn test_relevance_scoring() {
        let tokens = category_tokens("Acme");
        let keywords = vec!["welcome".to_string(), "member".to_string()];

        let p = preview("1", "rewards@acme.com", "Welcome to Acme, member!");
        assert_eq!(relevance_score(&p, &tokens, &keywords), 3 + 2 + 1 + 1);

        let p = preview("2", "deals@shop.com", "Big sale");
        assert_eq!(relevance_score(&p, &tokens, &keywords), 0);
    }

    #[test]
    fn test_select_ranks_and_bounds() {
        let previews = vec![
            preview("a", "deals@shop.com", "Sale"),
            preview("b", "news@acme.com", "Weekly news"),
            preview("c", "rewards@acme.com", "Your Acme membership number"),
            preview("d", "news@acme.com", "More news"),
        ];
        let history = CategoryHistory::new("Acme");
        let config = AgentConfig::new(["Acme"]).with_fetch_batch_size(3);

        let ids: Vec<_> = select_previews(&previews, &history, &config)
            .into_iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "b", "d"]);
    }

    #[test]
    fn test_select_skips_already_read() {
        let previews = vec![
            preview("a", "rewards@acme.com", "Welcome"),
            preview("b", "rewards@acme.com", "Statement"),
            preview("b", "rewards@acme.com", "Statement"),
        ];
        let mut history = CategoryHistory::new("Acme");
        history
            .record_attempt(
                QueryAttempt::new("from:acme.com", vec!["a".into()]).with_read(vec!["a".into()]),
                5,
            )
            .unwrap();
        let config = AgentConfig::new(["Acme"]);

        let ids: Vec<_> = select_previews(&previews, &history, &config)
            .into_iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b"]);
    }
}
