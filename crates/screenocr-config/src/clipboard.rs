use serde::{Deserialize, Serialize};

fn default_primary() -> String {
    "wl-copy".to_string()
}

fn default_fallback() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    2_000
}

fn default_linger_ms() -> u64 {
    500
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ClipboardConfig {
    /// Program fed the text on stdin
    #[serde(default = "default_primary")]
    pub primary: String,
    /// Fall back to the in-process clipboard when the primary tool fails
    #[serde(default = "default_fallback")]
    pub fallback: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How long a one-shot `trigger` stays alive after delivery
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            fallback: default_fallback(),
            timeout_ms: default_timeout_ms(),
            linger_ms: default_linger_ms(),
        }
    }
}
