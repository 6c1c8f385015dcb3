use serde::{Deserialize, Serialize};

use crate::errors;
use crate::RewriteError;

pub const DEFAULT_ROW_CAP: u64 = 10_000;
pub const DEFAULT_PK_EXPANSION_LIMIT: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriterConfig {
    /// Maximum rows a SELECT may return; rendered as `LIMIT row_cap + 1`.
    pub row_cap: u64,
    /// Upper bound on primary key tuples produced by expanding IN-lists.
    pub pk_expansion_limit: usize,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            row_cap: DEFAULT_ROW_CAP,
            pk_expansion_limit: DEFAULT_PK_EXPANSION_LIMIT,
        }
    }
}

impl RewriterConfig {
    pub fn from_json(json: &str) -> Result<Self, RewriteError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|error| errors::invalid_config(format!("invalid rewriter config: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RewriteError> {
        if self.row_cap == 0 || self.row_cap == u64::MAX {
            return Err(errors::invalid_config(format!(
                "row_cap must be between 1 and {}, got {}",
                u64::MAX - 1,
                self.row_cap
            )));
        }
        if self.pk_expansion_limit == 0 {
            return Err(errors::invalid_config(
                "pk_expansion_limit must be at least 1",
            ));
        }
        Ok(())
    }

    /// The literal limit injected into capped selects and probes.
    pub fn injected_limit(&self) -> u64 {
        self.row_cap + 1
    }
}
