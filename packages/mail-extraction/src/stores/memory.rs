//! In-memory message store for testing, development, and exported mailboxes.
//!
//! Supports a small Gmail-flavored query language. All terms must match,
//! case-insensitively:
//!
//! | Term | Matches |
//! |------|---------|
//! | `from:acme.com` | sender contains `acme.com` |
//! | `subject:welcome` / `subject:"your account"` | subject contains the text |
//! | `"member number"` | subject or body contains the phrase |
//! | `points` | sender, subject, or body contains the word |
//! | `-newsletter` | negates any of the above |

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::error::{AgentError, Result, StoreError, StoreResult};
use crate::traits::store::MessageStore;
use crate::types::message::{MessageContent, MessagePreview};

/// Default cap on search results.
pub const DEFAULT_MAX_RESULTS: usize = 20;

/// What a query term is matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermField {
    From,
    Subject,
    /// Subject or body
    Phrase,
    /// Sender, subject, or body
    Any,
}

/// One parsed query term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    pub field: TermField,
    /// Lower-cased text to look for
    pub text: String,
    pub negated: bool,
}

impl QueryTerm {
    fn matches(&self, message: &MessageContent) -> bool {
        let contains = |haystack: &str| haystack.to_lowercase().contains(&self.text);
        let hit = match self.field {
            TermField::From => contains(&message.sender),
            TermField::Subject => contains(&message.subject),
            TermField::Phrase => contains(&message.subject) || contains(&message.body),
            TermField::Any => {
                contains(&message.sender) || contains(&message.subject) || contains(&message.body)
            }
        };
        hit != self.negated
    }
}

/// Split a query into terms, honoring double quotes.
pub fn parse_query(query: &str) -> Vec<QueryTerm> {
    let mut terms = Vec::new();
    let mut chars = query.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let negated = chars.peek() == Some(&'-');
        if negated {
            chars.next();
        }

        let mut token = String::new();
        let mut quoted = false;
        let mut in_quotes = false;
        while let Some(&c) = chars.peek() {
            if c == '"' {
                in_quotes = !in_quotes;
                quoted = true;
                chars.next();
                continue;
            }
            if c.is_whitespace() && !in_quotes {
                break;
            }
            token.push(c);
            chars.next();
        }

        let lower = token.to_lowercase();
        let (field, text) = if let Some(rest) = lower.strip_prefix("from:") {
            (TermField::From, rest.to_string())
        } else if let Some(rest) = lower.strip_prefix("subject:") {
            (TermField::Subject, rest.to_string())
        } else if quoted {
            (TermField::Phrase, lower)
        } else {
            (TermField::Any, lower)
        };

        if !text.is_empty() {
            terms.push(QueryTerm {
                field,
                text,
                negated,
            });
        }
    }

    terms
}

/// In-memory mailbox.
///
/// Not suitable for large mailboxes: every search scans every message.
pub struct MemoryMailbox {
    messages: RwLock<HashMap<String, MessageContent>>,
    max_results: usize,
}

impl Default for MemoryMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Create a mailbox holding `messages`.
    pub fn with_messages(messages: impl IntoIterator<Item = MessageContent>) -> Self {
        let mailbox = Self::new();
        for message in messages {
            mailbox.add(message);
        }
        mailbox
    }

    /// Load a JSON export: an array of messages with `id`, `subject`,
    /// `sender`, `date` (RFC 3339), and `body`.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AgentError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let messages: Vec<MessageContent> = serde_json::from_str(&raw)?;
        tracing::info!(path = %path.display(), count = messages.len(), "loaded mailbox export");
        Ok(Self::with_messages(messages))
    }

    /// Cap the number of previews a search returns.
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Add or replace a message.
    pub fn add(&self, message: MessageContent) {
        self.messages
            .write()
            .unwrap()
            .insert(message.id.clone(), message);
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageStore for MemoryMailbox {
    async fn search(&self, query: &str) -> StoreResult<Vec<MessagePreview>> {
        let terms = parse_query(query);
        let messages = self.messages.read().unwrap();

        let mut hits: Vec<&MessageContent> = messages
            .values()
            .filter(|m| terms.iter().all(|t| t.matches(m)))
            .collect();

        // Newest first; id breaks ties so results are stable.
        hits.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));

        Ok(hits
            .into_iter()
            .take(self.max_results)
            .map(MessageContent::preview)
            .collect())
    }

    async fn fetch(&self, ids: &[String]) -> StoreResult<Vec<MessageContent>> {
        let messages = self.messages.read().unwrap();
        ids.iter()
            .map(|id| {
                messages
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::MessageNotFound { id: id.clone() })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn msg(id: &str, sender: &str, subject: &str, body: &str, age_days: i64) -> MessageContent {
        MessageContent::new(id, subject, sender, Utc::now() - Duration::days(age_days), body)
    }

    fn mailbox() -> MemoryMailbox {
        MemoryMailbox::with_messages([
            msg("1", "rewards@acme.com", "Welcome to Acme Rewards", "Member number 123456", 3),
            msg("2", "news@acme.com", "Weekend deals", "Book now", 1),
            msg("3", "hello@beta.com", "Your account", "Acme partner offer", 2),
        ])
    }

    #[test]
    fn test_parse_query_terms() {
        let terms = parse_query(r#"from:Acme.com subject:"your account" "member number" -deals points"#);
        assert_eq!(terms.len(), 5);
        assert_eq!(terms[0].field, TermField::From);
        assert_eq!(terms[0].text, "acme.com");
        assert_eq!(terms[1].field, TermField::Subject);
        assert_eq!(terms[1].text, "your account");
        assert_eq!(terms[2].field, TermField::Phrase);
        assert!(terms[3].negated);
        assert_eq!(terms[4].field, TermField::Any);
    }

    #[tokio::test]
    async fn test_search_from_domain_newest_first() {
        let ids: Vec<_> = mailbox()
            .search("from:acme.com")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[tokio::test]
    async fn test_search_narrowing_filters() {
        let hits = mailbox().search("from:acme.com subject:welcome").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");

        let hits = mailbox().search("acme -deals").await.unwrap();
        let ids: Vec<_> = hits.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1"]);
    }

    #[tokio::test]
    async fn test_search_respects_max_results() {
        let hits = mailbox().with_max_results(1).search("").await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_fails_cleanly_on_unknown_id() {
        let err = mailbox()
            .fetch(&["1".to_string(), "missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MessageNotFound { ref id } if id == "missing"));
    }

    #[tokio::test]
    async fn test_load_json_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailbox.json");
        let messages = vec![msg("1", "a@acme.com", "Hi", "Body", 0)];
        std::fs::write(&path, serde_json::to_string(&messages).unwrap()).unwrap();

        let mailbox = MemoryMailbox::from_json_file(&path).await.unwrap();
        assert_eq!(mailbox.len(), 1);
    }
}
