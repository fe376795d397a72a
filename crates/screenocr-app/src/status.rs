use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use screenocr_config::write_atomic;
use screenocr_types::{CycleOutcome, OutcomeSummary};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Counters the daemon keeps across cycles
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleStats {
    pub cycles: u64,
    pub successes: u64,
    /// Presses that arrived while a cycle was in flight
    pub dropped_presses: u64,
    pub last_outcome: Option<OutcomeSummary>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl CycleStats {
    pub fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        if outcome.is_success() {
            self.successes += 1;
        }
        self.last_outcome = Some(OutcomeSummary::from(outcome));
        self.last_cycle_at = Some(Utc::now());
    }
}

/// Application status
#[derive(Clone, Default)]
pub struct AppStatus {
    pub stats: Arc<RwLock<CycleStats>>,
}

impl AppStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, outcome: &CycleOutcome) -> CycleStats {
        let mut stats = self.stats.write().await;
        stats.record(outcome);
        stats.clone()
    }

    pub async fn dropped_press(&self) -> u64 {
        let mut stats = self.stats.write().await;
        stats.dropped_presses += 1;
        stats.dropped_presses
    }

    pub async fn snapshot(&self) -> CycleStats {
        self.stats.read().await.clone()
    }
}

/// Persist `stats` for `daemon status` in other processes
pub fn write_status(path: &Path, stats: &CycleStats) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(stats)?;
    write_atomic(path, &bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Missing or unreadable snapshot reads as empty counters
pub fn read_status(path: &Path) -> CycleStats {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::debug!("Ignoring unreadable status {}: {e}", path.display());
            CycleStats::default()
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => CycleStats::default(),
        Err(e) => {
            tracing::debug!("Cannot read {}: {e}", path.display());
            CycleStats::default()
        }
    }
}
