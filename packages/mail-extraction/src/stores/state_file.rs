//! JSON persistence for `RunState`.
//!
//! Saves are atomic: the state is written to a sibling temp file and renamed
//! over the target, so a crash mid-write leaves the previous state intact.

use std::path::{Path, PathBuf};

use crate::error::{AgentError, Result};
use crate::pipeline::cache::SearchCache;
use crate::types::state::RunState;

/// A state file on disk.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
    keep_cache: bool,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep_cache: true,
        }
    }

    /// Drop the search cache when saving. Smaller files, refetch on resume.
    pub fn without_cache(mut self) -> Self {
        self.keep_cache = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, or `None` if the file does not exist.
    pub async fn load(&self) -> Result<Option<RunState>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };

        let state: RunState = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %self.path.display(),
            run_id = %state.run_id,
            records = state.record_count(),
            attempts = state.total_attempts(),
            "loaded run state"
        );
        Ok(Some(state))
    }

    /// Write the state atomically.
    pub async fn save(&self, state: &RunState) -> Result<()> {
        let json = if self.keep_cache {
            serde_json::to_vec_pretty(state)?
        } else {
            let mut stripped = state.clone();
            stripped.cache = SearchCache::new(state.cache.capacity());
            serde_json::to_vec_pretty(&stripped)?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io_error(source))?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|source| self.io_error(source))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| self.io_error(source))?;

        tracing::debug!(path = %self.path.display(), bytes = json.len(), "saved run state");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> AgentError {
        AgentError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}
