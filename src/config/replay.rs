use super::traits::{invalid, ConfigSection};
use crate::error::EvoError;
use crate::types::RenderMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub render_mode: RenderMode,
    /// How often `follow` re-reads the log.
    pub poll_interval_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::Screen,
            poll_interval_ms: 2000,
        }
    }
}

impl ReplayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ConfigSection for ReplayConfig {
    fn section_name() -> &'static str {
        "replay"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.poll_interval_ms == 0 {
            return Err(invalid(Self::section_name(), "poll_interval_ms must be positive"));
        }
        Ok(())
    }
}
