//! Extracted records and their natural keys.
//!
//! A record's identity is its natural key: the category plus the
//! identifying value (e.g. a membership number). Provenance fields are
//! carried for display and never take part in deduplication.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Normalized `(category, value)` pair used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub category: String,
    pub value: String,
}

impl NaturalKey {
    /// Build a normalized key.
    ///
    /// Categories compare case-insensitively. Values are upper-cased with
    /// whitespace and dashes removed, so "1234 5678" and "1234-5678" match.
    pub fn new(category: &str, value: &str) -> Self {
        Self {
            category: normalize_category(category),
            value: value
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .flat_map(char::to_uppercase)
                .collect(),
        }
    }

    /// Whether the value is empty after normalization.
    pub fn is_blank(&self) -> bool {
        self.value.is_empty()
    }

    /// Deterministic record id for this key.
    pub fn record_id(&self) -> RecordId {
        let mut hasher = Sha256::new();
        hasher.update(self.category.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.value.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        RecordId(format!("rec_{}", &digest[..32]))
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.category, self.value)
    }
}

/// Case-folded, trimmed category name.
pub fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

/// Stable record identifier derived from the natural key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record as proposed by the language model, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecordCandidate {
    /// Category the model attributes the record to
    pub category: String,

    /// Identifying value (membership number, account id, ...)
    pub key_value: String,

    /// Program or product name, if stated
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub program_name: Option<String>,

    /// Tier or status, if stated
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub tier: Option<String>,

    /// Any other fields the model found
    #[serde(default, deserialize_with = "lenient::text_map")]
    pub fields: BTreeMap<String, String>,

    /// Model confidence, 0-100
    #[serde(default, deserialize_with = "lenient::confidence")]
    pub confidence: u8,

    /// Message the model read the value from
    #[serde(default)]
    pub source_message_id: Option<String>,
}

impl RecordCandidate {
    pub fn new(category: impl Into<String>, key_value: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            key_value: key_value.into(),
            program_name: None,
            tier: None,
            fields: BTreeMap::new(),
            confidence: 0,
            source_message_id: None,
        }
    }

    pub fn with_program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = Some(name.into());
        self
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_source(mut self, message_id: impl Into<String>) -> Self {
        self.source_message_id = Some(message_id.into());
        self
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.category, &self.key_value)
    }
}

/// Tolerant readers for the advisory parts of a candidate.
///
/// Only `category` and `key_value` decide whether a candidate is usable, so
/// an oddly typed tier, field or confidence must not reject the answer.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::collections::BTreeMap;

    /// Scalars become text, nested values their JSON text; null and blank are absent.
    fn text(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn optional_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(text(Value::deserialize(d)?))
    }

    pub fn text_map<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<BTreeMap<String, String>, D::Error> {
        let map = match Value::deserialize(d)? {
            Value::Object(entries) => entries
                .into_iter()
                .filter_map(|(name, value)| text(value).map(|value| (name, value)))
                .collect(),
            _ => BTreeMap::new(),
        };
        Ok(map)
    }

    /// Any number or numeric string, as a 0-100 percentage. Fractions up to
    /// 1.0 are scaled. Anything unreadable is 0.
    pub fn confidence<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let raw = match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64().map(|v| (v, n.is_f64())),
            Value::String(s) => {
                let s = s.trim().trim_end_matches('%').trim();
                s.parse::<f64>().ok().map(|v| (v, s.contains('.')))
            }
            _ => None,
        };
        Ok(raw.map(|(v, fractional)| percent(v, fractional)).unwrap_or(0))
    }

    fn percent(value: f64, fractional: bool) -> u8 {
        if !value.is_finite() {
            return 0;
        }
        let scaled = if fractional && value <= 1.0 {
            value * 100.0
        } else {
            value
        };
        scaled.round().clamp(0.0, 100.0) as u8
    }
}

/// One extracted structured fact. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Derived from the natural key, never random
    pub id: RecordId,

    /// Category as configured (not as the model spelled it)
    pub category: String,

    /// Identifying value as the model reported it
    pub key_value: String,

    /// Category-specific payload (program name, tier, ...)
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    pub source_message_id: String,
    pub source_date: DateTime<Utc>,
    pub source_subject: String,

    /// Advisory only; 0-100
    pub confidence: u8,

    pub extracted_at: DateTime<Utc>,
}

impl Record {
    /// The natural key this record deduplicates on.
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.category, &self.key_value)
    }

    /// Tier or status, if the extraction reported one.
    pub fn tier(&self) -> Option<&str> {
        self.fields.get("tier").map(String::as_str)
    }
}
