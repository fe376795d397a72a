use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outcome::OutcomeSummary;

/// Pixel dimensions of a captured screen image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A selected region in image-pixel coordinates.
///
/// Never zero-sized: a drag that would produce an empty rectangle is a
/// cancellation, so the only way to build one is through [`SelectionRect::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl SelectionRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Build a rectangle from two corners, clamped to `bounds`
    pub fn from_corners(a: (i64, i64), b: (i64, i64), bounds: Geometry) -> Option<Self> {
        let clamp_x = |v: i64| v.clamp(0, bounds.width as i64) as u32;
        let clamp_y = |v: i64| v.clamp(0, bounds.height as i64) as u32;

        let (x1, x2) = (clamp_x(a.0.min(b.0)), clamp_x(a.0.max(b.0)));
        let (y1, y2) = (clamp_y(a.1.min(b.1)), clamp_y(a.1.max(b.1)));

        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_within(&self, bounds: Geometry) -> bool {
        self.x as u64 + self.width as u64 <= bounds.width as u64
            && self.y as u64 + self.height as u64 <= bounds.height as u64
    }
}

impl fmt::Display for SelectionRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// Where a cycle currently is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleStage {
    Idle,
    Capturing,
    Selecting,
    Recognizing,
    Delivering,
    Failed(String),
    Cancelled,
}

impl CycleStage {
    pub fn is_idle(&self) -> bool {
        matches!(self, CycleStage::Idle)
    }
}

/// Snapshot printed by `daemon status`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub binding: Option<String>,
    pub cycles: u64,
    pub successes: u64,
    pub last_outcome: Option<OutcomeSummary>,
}

impl DaemonStatus {
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.started_at
            .and_then(|started| (now - started).to_std().ok())
    }
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.running {
            return write!(f, "running: no");
        }

        writeln!(f, "running: yes")?;
        if let Some(pid) = self.pid {
            writeln!(f, "pid: {pid}")?;
        }
        if let Some(uptime) = self.uptime(Utc::now()) {
            writeln!(f, "uptime: {}", format_uptime(uptime))?;
        }
        if let Some(binding) = &self.binding {
            writeln!(f, "hotkey: {binding}")?;
        }
        write!(f, "cycles: {} ({} succeeded)", self.cycles, self.successes)?;
        if let Some(outcome) = &self.last_outcome {
            write!(f, "\nlast: {}", outcome.message)?;
        }
        Ok(())
    }
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}
