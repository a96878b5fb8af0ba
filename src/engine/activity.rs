//! Rolling log of recent processor activity and the periodic summary line.

use crate::domain::{Mint, TimeMs};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Entries kept in the rolling log.
pub const ACTIVITY_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Reject,
    Watch,
    WatchSuccess,
    WatchExpired,
    Buy,
    BuyFail,
}

impl ActivityKind {
    fn marker(&self) -> &'static str {
        match self {
            ActivityKind::Reject => "x",
            ActivityKind::Watch => "?",
            ActivityKind::WatchSuccess => "*",
            ActivityKind::WatchExpired => "~",
            ActivityKind::Buy => "+",
            ActivityKind::BuyFail => "!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub at: TimeMs,
    pub kind: ActivityKind,
    pub mint: Mint,
    pub message: String,
}

/// Counters shown on the summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SummaryCounts {
    pub detected: u64,
    pub rejected: u64,
    pub watching: usize,
    pub bought: u64,
}

#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: Mutex<VecDeque<ActivityEntry>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, at: TimeMs, kind: ActivityKind, mint: &Mint, message: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push_back(ActivityEntry {
            at,
            kind,
            mint: mint.clone(),
            message: message.into(),
        });
        while entries.len() > ACTIVITY_CAPACITY {
            entries.pop_front();
        }
    }

    /// Oldest first.
    pub fn recent(&self) -> Vec<ActivityEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Multi-line block: recent entries followed by the counters.
    pub fn summary(&self, now: TimeMs, counts: SummaryCounts) -> String {
        let mut out = String::from("Recent activity:\n");
        let entries = self.recent();
        if entries.is_empty() {
            out.push_str("  (no events yet)\n");
        }
        for entry in &entries {
            let _ = writeln!(
                out,
                "  {} {} | {} | {} ago",
                entry.kind.marker(),
                entry.mint.short(),
                entry.message,
                format_elapsed(now.since(entry.at))
            );
        }
        let _ = write!(
            out,
            "{} detected | {} rejected | {} watching | {} bought",
            counts.detected, counts.rejected, counts.watching, counts.bought
        );
        out
    }
}

pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        0 => "just now".to_string(),
        1..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m{}s", secs / 60, secs % 60),
        _ => format!("{}h{}m", secs / 3600, (secs % 3600) / 60),
    }
}
