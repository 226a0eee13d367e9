//! Per-connection history limits.

use serde::{Deserialize, Serialize};

use crate::{
    constants::{DEFAULT_SANE_RTT_MAX_US, DEFAULT_TX_HISTORY_MAX_LEN},
    error::{HistoryError, Result},
};

/// Limits applied to one connection's histories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// RTT samples above this many microseconds are clamped to it.
    pub sane_rtt_max_us: u32,

    /// Maximum number of sent packets remembered for RTT lookups.
    pub tx_history_max_len: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            sane_rtt_max_us: DEFAULT_SANE_RTT_MAX_US,
            tx_history_max_len: DEFAULT_TX_HISTORY_MAX_LEN,
        }
    }
}

impl HistoryConfig {
    /// Check every limit, reporting all failures at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.sane_rtt_max_us == 0 {
            errors.push("sane_rtt_max_us must be greater than 0");
        }
        if self.tx_history_max_len == 0 {
            errors.push("tx_history_max_len must be greater than 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(HistoryError::InvalidConfig(errors.join("; ")))
        }
    }
}
