use serde::{Deserialize, Serialize};

fn default_command() -> Vec<String> {
    vec!["slurp".to_string(), "-f".to_string(), "%x,%y %wx%h".to_string()]
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_cancel_exit_code() -> i32 {
    1
}

fn default_min_size() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SelectorConfig {
    /// Program and arguments; `{image}` is replaced by the captured image path
    #[serde(default = "default_command")]
    pub command: Vec<String>,
    /// Watchdog: the selector is killed and the cycle failed after this long
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Exit status the selector uses when the user presses escape
    #[serde(default = "default_cancel_exit_code")]
    pub cancel_exit_code: i32,
    /// Rectangles narrower or shorter than this count as a cancelled drag
    #[serde(default = "default_min_size")]
    pub min_size: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            timeout_ms: default_timeout_ms(),
            cancel_exit_code: default_cancel_exit_code(),
            min_size: default_min_size(),
        }
    }
}
