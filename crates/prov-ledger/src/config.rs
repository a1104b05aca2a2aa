use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Engine configuration, loadable from TOML. Missing keys take defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Node id stamped into every event timestamp.
    pub node_id: u16,
    /// How many times a unit of work is retried after a commit conflict
    /// before `ConcurrentModification` is surfaced.
    pub max_commit_retries: u32,
    /// Upper bound on divisions in a single split.
    pub max_divisions_per_split: usize,
    /// Upper bound on package label length in bytes.
    pub max_label_len: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            max_commit_retries: 3,
            max_divisions_per_split: 64,
            max_label_len: 64,
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        toml::from_str(s).map_err(|e| LedgerError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
