//! Event processor: dedup, rule evaluation, watch list, buys.
//!
//! The dedup map is owned by the processing loop. The watch list and
//! counters sit behind a shared lock so status readers can see them.

use super::activity::{ActivityKind, ActivityLog, SummaryCounts};
use super::executor::Executor;
use super::rules::{Reason, RuleEngine};
use crate::config::TimingConfig;
use crate::domain::{Event, Mint, TimeMs};
use crate::shutdown::cancelled;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const REASON_RULES_PASSED: &str = "rules_passed";
pub const REASON_RULES_PASSED_AFTER_WATCH: &str = "rules_passed_after_watch";

/// A provisionally rejected mint awaiting re-evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchedCandidate {
    pub mint: Mint,
    pub event: Event,
    pub first_seen_at: TimeMs,
    pub last_checked_at: TimeMs,
    pub reject_reason: Reason,
    pub check_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    pub detected: u64,
    pub rejected: u64,
    pub bought: u64,
    pub buy_failures: u64,
    pub watching: usize,
    pub evaluation_errors: u64,
    /// Final rejections by reason code.
    pub rejection_reasons: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct SharedState {
    watch_list: HashMap<Mint, WatchedCandidate>,
    stats: ProcessorStats,
}

/// Read-only view of processor state.
#[derive(Debug, Clone, Default)]
pub struct ProcessorHandle {
    shared: Arc<RwLock<SharedState>>,
}

impl ProcessorHandle {
    pub async fn stats(&self) -> ProcessorStats {
        let state = self.shared.read().await;
        ProcessorStats {
            watching: state.watch_list.len(),
            ..state.stats.clone()
        }
    }

    /// Watched candidates, oldest first.
    pub async fn watch_list(&self) -> Vec<WatchedCandidate> {
        let mut list: Vec<WatchedCandidate> = self.shared.read().await.watch_list.values().cloned().collect();
        list.sort_by(|a, b| a.first_seen_at.cmp(&b.first_seen_at).then_with(|| a.mint.cmp(&b.mint)));
        list
    }

    pub async fn is_watching(&self, mint: &Mint) -> bool {
        self.shared.read().await.watch_list.contains_key(mint)
    }
}

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Duplicate,
    Bought,
    BuyFailed(String),
    Watched,
    AlreadyWatched,
    /// Provisionally rejected while a position is open; not watched.
    AlreadyHeld,
    Rejected,
    EvaluationFailed,
}

pub struct Processor {
    rules: RuleEngine,
    executor: Arc<Executor>,
    timing: TimingConfig,
    handle: ProcessorHandle,
    activity: Arc<ActivityLog>,
    seen: HashMap<Mint, TimeMs>,
}

impl Processor {
    pub fn new(rules: RuleEngine, executor: Arc<Executor>, timing: TimingConfig, activity: Arc<ActivityLog>) -> Self {
        Self {
            rules,
            executor,
            timing,
            handle: ProcessorHandle::default(),
            activity,
            seen: HashMap::new(),
        }
    }

    pub fn handle(&self) -> ProcessorHandle {
        self.handle.clone()
    }

    pub async fn handle_event(&mut self, event: Event, now: TimeMs) -> EventOutcome {
        if let Some(last) = self.seen.get(&event.mint) {
            if now.since(*last) < self.timing.dedup_window {
                return EventOutcome::Duplicate;
            }
        }
        self.seen.insert(event.mint.clone(), now);
        self.handle.shared.write().await.stats.detected += 1;

        let decision = match self.rules.evaluate(&event, now).await {
            Ok(d) => d,
            Err(e) => {
                error!(mint = %event.mint.short(), error = %e, "Failed to evaluate rules");
                self.handle.shared.write().await.stats.evaluation_errors += 1;
                return EventOutcome::EvaluationFailed;
            }
        };

        let Some(reason) = decision.primary_reason().cloned() else {
            self.handle.shared.write().await.watch_list.remove(&event.mint);
            info!(mint = %event.mint.short(), "Token passes rules, executing buy");
            return self.buy(&event.mint, REASON_RULES_PASSED, now).await;
        };

        if reason.is_provisional() {
            match self.executor.has_position(&event.mint).await {
                Ok(false) => {}
                Ok(true) => {
                    debug!(mint = %event.mint.short(), reason = %reason, "Position open, not watching");
                    return EventOutcome::AlreadyHeld;
                }
                Err(e) => {
                    error!(mint = %event.mint.short(), error = %e, "Failed to check open position");
                    self.handle.shared.write().await.stats.evaluation_errors += 1;
                    return EventOutcome::EvaluationFailed;
                }
            }
            let mut state = self.handle.shared.write().await;
            if state.watch_list.contains_key(&event.mint) {
                return EventOutcome::AlreadyWatched;
            }
            debug!(mint = %event.mint.short(), reason = %reason, "Watching");
            self.activity.record(now, ActivityKind::Watch, &event.mint, reason.message.clone());
            state.watch_list.insert(
                event.mint.clone(),
                WatchedCandidate {
                    mint: event.mint.clone(),
                    event,
                    first_seen_at: now,
                    last_checked_at: now,
                    reject_reason: reason,
                    check_count: 1,
                },
            );
            return EventOutcome::Watched;
        }

        self.activity.record(now, ActivityKind::Reject, &event.mint, reason.message.clone());
        let mut state = self.handle.shared.write().await;
        state.stats.rejected += 1;
        *state
            .stats
            .rejection_reasons
            .entry(reason.code.as_str().to_string())
            .or_default() += 1;
        EventOutcome::Rejected
    }

    async fn buy(&self, mint: &Mint, reason: &str, now: TimeMs) -> EventOutcome {
        match self.executor.buy(mint, reason).await {
            Ok(fill) => {
                self.handle.shared.write().await.stats.bought += 1;
                self.activity.record(now, ActivityKind::Buy, mint, format!("{} @ ${}", reason, fill.entry_price_usd.round_dp(6)));
                EventOutcome::Bought
            }
            Err(e) => {
                error!(mint = %mint.short(), error = %e, "Failed to execute buy");
                self.handle.shared.write().await.stats.buy_failures += 1;
                self.activity.record(now, ActivityKind::BuyFail, mint, format!("error: {}", e));
                EventOutcome::BuyFailed(e.to_string())
            }
        }
    }

    /// Re-evaluate every watched mint. Entries past the ceiling are expired
    /// first and never evaluated. Returns the mints promoted to a buy attempt.
    pub async fn recheck(&mut self, now: TimeMs) -> Vec<Mint> {
        self.expire_stale(now).await;
        let candidates = self.handle.watch_list().await;
        let mut promoted = Vec::new();

        for candidate in candidates {
            let result = self.rules.evaluate(&candidate.event, now).await;

            let allowed = {
                let mut state = self.handle.shared.write().await;
                let Some(entry) = state.watch_list.get_mut(&candidate.mint) else {
                    continue;
                };
                entry.last_checked_at = now;
                entry.check_count += 1;
                match &result {
                    Ok(decision) if decision.allow => {
                        state.watch_list.remove(&candidate.mint);
                        true
                    }
                    Ok(decision) => {
                        if let Some(reason) = decision.primary_reason() {
                            entry.reject_reason = reason.clone();
                        }
                        false
                    }
                    Err(e) => {
                        warn!(mint = %candidate.mint.short(), error = %e, "Recheck evaluation failed");
                        state.stats.evaluation_errors += 1;
                        false
                    }
                }
            };
            if !allowed {
                continue;
            }

            let watched = now.since(candidate.first_seen_at);
            info!(
                mint = %candidate.mint.short(),
                checks = candidate.check_count + 1,
                watch_secs = watched.as_secs(),
                "Watch list success, token now passes rules"
            );
            self.activity.record(
                now,
                ActivityKind::WatchSuccess,
                &candidate.mint,
                format!("passed after {}", super::activity::format_elapsed(watched)),
            );
            self.buy(&candidate.mint, REASON_RULES_PASSED_AFTER_WATCH, now).await;
            promoted.push(candidate.mint);
        }
        promoted
    }

    /// Expire watch entries older than the ceiling and prune stale dedup
    /// entries. Returns the expired mints.
    pub async fn cleanup(&mut self, now: TimeMs) -> Vec<Mint> {
        let expired = self.expire_stale(now).await;
        let retention = self.timing.dedup_window * 2;
        self.seen.retain(|_, last| now.since(*last) <= retention);
        expired
    }

    /// Remove entries watched for longer than `watch_ceiling`, counting each
    /// as a rejection under its last reason.
    async fn expire_stale(&self, now: TimeMs) -> Vec<Mint> {
        let ceiling = self.timing.watch_ceiling;
        let expired: Vec<WatchedCandidate> = {
            let mut state = self.handle.shared.write().await;
            let mints: Vec<Mint> = state
                .watch_list
                .values()
                .filter(|c| now.since(c.first_seen_at) > ceiling)
                .map(|c| c.mint.clone())
                .collect();
            let expired: Vec<WatchedCandidate> = mints
                .iter()
                .filter_map(|m| state.watch_list.remove(m))
                .collect();
            for candidate in &expired {
                state.stats.rejected += 1;
                *state
                    .stats
                    .rejection_reasons
                    .entry(candidate.reject_reason.code.as_str().to_string())
                    .or_default() += 1;
            }
            expired
        };
        if !expired.is_empty() {
            debug!(count = expired.len(), "Expired tokens from watch list");
        }
        for candidate in &expired {
            self.activity.record(
                now,
                ActivityKind::WatchExpired,
                &candidate.mint,
                candidate.reject_reason.message.clone(),
            );
        }
        expired.into_iter().map(|c| c.mint).collect()
    }

    pub async fn summary(&self, now: TimeMs) -> String {
        let stats = self.handle.stats().await;
        self.activity.summary(
            now,
            SummaryCounts {
                detected: stats.detected,
                rejected: stats.rejected,
                watching: stats.watching,
                bought: stats.bought,
            },
        )
    }

    /// Consume `events` until cancelled. A closed queue stops intake only;
    /// rechecks and cleanup keep running.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>, mut shutdown: watch::Receiver<bool>) {
        info!("Starting event processor");
        let mut recheck = ticker(self.timing.recheck_interval);
        let mut cleanup = ticker(self.timing.cleanup_interval);
        let mut summary = ticker(self.timing.summary_interval);
        let mut intake_open = true;

        loop {
            tokio::select! {
                _ = cancelled(&mut shutdown) => {
                    info!("Event processor shutting down");
                    return;
                }
                event = events.recv(), if intake_open => match event {
                    Some(event) => {
                        let outcome = self.handle_event(event, TimeMs::now()).await;
                        debug!(?outcome, "Event handled");
                    }
                    None => {
                        debug!("Event queue closed");
                        intake_open = false;
                    }
                },
                _ = recheck.tick() => {
                    self.recheck(TimeMs::now()).await;
                }
                _ = cleanup.tick() => {
                    self.cleanup(TimeMs::now()).await;
                }
                _ = summary.tick() => {
                    info!("{}", self.summary(TimeMs::now()).await);
                }
            }
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
