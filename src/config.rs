//! Assistant configuration
//!
//! Read from `TABULAR_RAG_*` environment variables. Unset variables take the
//! defaults below; set but unparsable ones are an error rather than silently
//! ignored.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_DATA_DIR: &str = "data/uploads";
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_EMBED_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantConfig {
    /// Directory scanned for `.xlsx`, `.xls` and `.csv` files
    pub data_dir: PathBuf,
    /// Planner prompt template file; the built-in template when unset
    pub planner_prompt_path: Option<PathBuf>,
    pub top_k: usize,
    pub llm_timeout: Duration,
    pub embed_timeout: Duration,
    pub workers: usize,
    /// Most recent chat messages passed to follow-up answers
    pub history_window: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            planner_prompt_path: None,
            top_k: DEFAULT_TOP_K,
            llm_timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
            embed_timeout: Duration::from_secs(DEFAULT_EMBED_TIMEOUT_SECS),
            workers: DEFAULT_WORKERS,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            data_dir: get("TABULAR_RAG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            planner_prompt_path: get("TABULAR_RAG_PLANNER_PROMPT").map(PathBuf::from),
            top_k: positive(&get, "TABULAR_RAG_TOP_K")?.unwrap_or(defaults.top_k),
            llm_timeout: positive(&get, "TABULAR_RAG_LLM_TIMEOUT_SECS")?
                .map(|s| Duration::from_secs(s as u64))
                .unwrap_or(defaults.llm_timeout),
            embed_timeout: positive(&get, "TABULAR_RAG_EMBED_TIMEOUT_SECS")?
                .map(|s| Duration::from_secs(s as u64))
                .unwrap_or(defaults.embed_timeout),
            workers: positive(&get, "TABULAR_RAG_WORKERS")?.unwrap_or(defaults.workers),
            history_window: positive(&get, "TABULAR_RAG_HISTORY_WINDOW")?
                .unwrap_or(defaults.history_window),
        })
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }
}

fn positive<G>(get: &G, name: &'static str) -> Result<Option<usize>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw,
            expected: "a positive integer",
        }),
    }
}
