use serde::{Deserialize, Serialize};

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    /// Ceiling for one screenshot request, including the permission prompt
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}
