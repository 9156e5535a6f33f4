use crate::errors::VisionError;
use crate::resolve::{DEFAULT_POLL_INTERVAL, DEFAULT_WITHIN};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Session settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// How long resolution keeps retrying when a command has no `within`.
    pub default_within_ms: u64,
    /// Commands slower than this are reported as slow.
    pub acceptable_wait_ms: u64,
    pub poll_interval_ms: u64,
    /// `false` starts the session in Finish mode: no pauses, no prompts.
    pub interactive: bool,
    pub test_dir: String,
    pub upload_dir: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            default_within_ms: DEFAULT_WITHIN.as_millis() as u64,
            acceptable_wait_ms: 3_000,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            interactive: true,
            test_dir: ".".to_string(),
            upload_dir: "upload".to_string(),
        }
    }
}

impl InterpreterConfig {
    pub fn batch() -> Self {
        Self {
            interactive: false,
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self, VisionError> {
        serde_json::from_str(text).map_err(|e| VisionError::Script(format!("Invalid config: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self, VisionError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn default_within(&self) -> Duration {
        Duration::from_millis(self.default_within_ms)
    }

    pub fn acceptable_wait(&self) -> Duration {
        Duration::from_millis(self.acceptable_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
