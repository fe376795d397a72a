use serde::{Deserialize, Serialize};

fn default_stop_grace_ms() -> u64 {
    5_000
}

fn default_start_wait_ms() -> u64 {
    5_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DaemonConfig {
    /// How long shutdown waits for an in-flight cycle before cancelling it
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// How long a detaching `daemon start` waits for the child to take the lock
    #[serde(default = "default_start_wait_ms")]
    pub start_wait_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: default_stop_grace_ms(),
            start_wait_ms: default_start_wait_ms(),
        }
    }
}
