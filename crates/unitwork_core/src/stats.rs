//! Unit statistics.

use crate::action::ActionKind;
use crate::flush::FlushTrigger;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every session of a unit.
///
/// All counters are monotonically increasing.
#[derive(Debug, Default)]
pub struct UnitStats {
    sessions_opened: AtomicU64,
    sessions_committed: AtomicU64,
    sessions_rolled_back: AtomicU64,
    entities_loaded: AtomicU64,
    identity_map_hits: AtomicU64,
    queries: AtomicU64,
    flushes: AtomicU64,
    auto_flushes: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl UnitStats {
    /// Creates zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_session_open(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.sessions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rollback(&self) {
        self.sessions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load(&self) {
        self.entities_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_identity_hit(&self) {
        self.identity_map_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, trigger: FlushTrigger) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        if trigger == FlushTrigger::BeforeQuery {
            self.auto_flushes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_action(&self, kind: ActionKind) {
        let counter = match kind {
            ActionKind::Insert => &self.inserts,
            ActionKind::Update => &self.updates,
            ActionKind::Delete => &self.deletes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_committed: self.sessions_committed.load(Ordering::Relaxed),
            sessions_rolled_back: self.sessions_rolled_back.load(Ordering::Relaxed),
            entities_loaded: self.entities_loaded.load(Ordering::Relaxed),
            identity_map_hits: self.identity_map_hits.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            auto_flushes: self.auto_flushes.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of unit statistics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Sessions begun.
    pub sessions_opened: u64,
    /// Sessions committed.
    pub sessions_committed: u64,
    /// Sessions rolled back, explicitly, on error or on drop.
    pub sessions_rolled_back: u64,
    /// Entities materialized from storage rows.
    pub entities_loaded: u64,
    /// Lookups answered by an already-tracked instance.
    pub identity_map_hits: u64,
    /// Direct queries run; identity-map misses in `find` are not counted.
    pub queries: u64,
    /// Flushes that executed at least one action.
    pub flushes: u64,
    /// Of those, flushes triggered by a direct query.
    pub auto_flushes: u64,
    /// Inserts executed.
    pub inserts: u64,
    /// Updates executed.
    pub updates: u64,
    /// Deletes executed.
    pub deletes: u64,
}

impl StatsSnapshot {
    /// Total write statements executed.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.inserts + self.updates + self.deletes
    }
}
