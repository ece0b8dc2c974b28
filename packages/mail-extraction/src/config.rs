use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;

use crate::ai::OpenAiModel;
use crate::types::config::AgentConfig;

/// Runtime configuration for the `mail-extract` binary, loaded from
/// environment variables
#[derive(Debug)]
pub struct Config {
    pub openai_api_key: SecretString,
    pub openai_model: Option<String>,
    pub openai_base_url: Option<String>,
    pub mailbox_path: PathBuf,
    pub state_path: PathBuf,
    pub agent: AgentConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let usize_var = |name: &str| -> Result<Option<usize>> {
            lookup(name)
                .map(|v| {
                    v.trim()
                        .parse::<usize>()
                        .with_context(|| format!("{name} must be a non-negative integer"))
                })
                .transpose()
        };

        let categories: Vec<String> = lookup("EXTRACT_CATEGORIES")
            .context("EXTRACT_CATEGORIES must be set (comma-separated)")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut agent = AgentConfig::new(categories);
        if let Some(max) = usize_var("MAX_ATTEMPTS_PER_CATEGORY")? {
            agent = agent.with_max_attempts(max);
        }
        if let Some(capacity) = usize_var("CACHE_CAPACITY")? {
            agent = agent.with_cache_capacity(capacity);
        }
        if let Some(size) = usize_var("FETCH_BATCH_SIZE")? {
            agent = agent.with_fetch_batch_size(size);
        }
        if let Some(budget) = usize_var("MAX_TOTAL_ATTEMPTS")? {
            agent = agent.with_max_total_attempts(budget);
        }
        agent.validate().context("invalid agent configuration")?;

        Ok(Self {
            openai_api_key: SecretString::from(
                lookup("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            ),
            openai_model: lookup("OPENAI_MODEL"),
            openai_base_url: lookup("OPENAI_BASE_URL"),
            mailbox_path: lookup("MAILBOX_PATH")
                .unwrap_or_else(|| "mailbox.json".to_string())
                .into(),
            state_path: lookup("STATE_PATH")
                .unwrap_or_else(|| "mail-extraction-state.json".to_string())
                .into(),
            agent,
        })
    }

    /// Build the configured OpenAI model.
    pub fn openai(&self) -> OpenAiModel {
        let mut model = OpenAiModel::new(self.openai_api_key.expose_secret());
        if let Some(name) = &self.openai_model {
            model = model.with_model(name.clone());
        }
        if let Some(url) = &self.openai_base_url {
            model = model.with_base_url(url.clone());
        }
        model
    }
}
