//! Quota tracker - in-memory counters for the hour a user is working on.
//!
//! One [`QuotaEntry`] exists per user with an active session. It mirrors the
//! volatile part of the session: how many posts and symbols were accepted in
//! the current hour, when that hour's deadline clock started, and whether the
//! hour's quota has been met and the user is waiting for the next hour.
//!
//! The tracker only mutates memory. Persisting the hour start is a separate
//! call into [`crate::core::session`].

use crate::core::store::{KeyValueStore, MemoryStore};
use chrono::{DateTime, Utc};

/// Per-user counters for the current hour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaEntry {
    /// Session the counters belong to
    pub session_id: i64,
    /// Channel the session is written in
    pub channel_id: String,
    /// Hour the counters refer to
    pub hour: i32,
    /// Hours the session was configured with
    pub total_hours: i32,
    /// Posts accepted this hour
    pub posts: i32,
    /// Symbols accepted this hour
    pub symbols: i64,
    /// When this hour's deadline clock started
    pub hour_started_at: DateTime<Utc>,
    /// Quota met, waiting for the next hour to begin
    pub in_cooldown: bool,
}

impl QuotaEntry {
    /// Fresh counters for `hour` starting at `hour_started_at`.
    #[must_use]
    pub const fn new(
        session_id: i64,
        channel_id: String,
        hour: i32,
        total_hours: i32,
        hour_started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            channel_id,
            hour,
            total_hours,
            posts: 0,
            symbols: 0,
            hour_started_at,
            in_cooldown: false,
        }
    }
}

/// Snapshot of a user's progress after a post was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourProgress {
    /// Hour the progress refers to
    pub hour: i32,
    /// Posts accepted this hour
    pub posts: i32,
    /// Symbols accepted this hour
    pub symbols: i64,
    /// Percentage of the hourly quota, clamped to 100
    pub percent: u8,
    /// Whether the quota has been reached
    pub quota_met: bool,
}

/// Percentage of `quota` covered by `symbols`, clamped to 0..=100.
#[must_use]
pub fn progress_percent(symbols: i64, quota: i64) -> u8 {
    if quota <= 0 {
        return 100;
    }
    let percent = (symbols.max(0) * 100 / quota).min(100);
    u8::try_from(percent).unwrap_or(100)
}

/// Holds the quota entries of every user with an active session.
pub struct QuotaTracker {
    entries: Box<dyn KeyValueStore<String, QuotaEntry>>,
    symbols_per_hour: i64,
}

impl std::fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaTracker")
            .field("users", &self.entries.keys().len())
            .field("symbols_per_hour", &self.symbols_per_hour)
            .finish()
    }
}

impl QuotaTracker {
    /// Creates a tracker backed by an in-memory store.
    #[must_use]
    pub fn new(symbols_per_hour: i64) -> Self {
        Self::with_store(Box::new(MemoryStore::new()), symbols_per_hour)
    }

    /// Creates a tracker backed by the given store.
    #[must_use]
    pub fn with_store(
        entries: Box<dyn KeyValueStore<String, QuotaEntry>>,
        symbols_per_hour: i64,
    ) -> Self {
        Self {
            entries,
            symbols_per_hour,
        }
    }

    /// Starts tracking a user, replacing any previous entry.
    pub fn insert(&self, user_id: &str, entry: QuotaEntry) {
        self.entries.set(user_id.to_string(), entry);
    }

    /// Returns a copy of the user's entry.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<QuotaEntry> {
        self.entries.get(&user_id.to_string())
    }

    /// Adds one post of `symbols` to the user's current hour and returns the
    /// updated progress. Returns `None` when the user is not tracked.
    pub fn record(&self, user_id: &str, symbols: i64) -> Option<HourProgress> {
        let mut entry = self.get(user_id)?;
        entry.posts += 1;
        entry.symbols += symbols;
        let progress = self.progress_of(&entry);
        self.insert(user_id, entry);
        Some(progress)
    }

    /// True when the user's symbols this hour reach the hourly quota.
    #[must_use]
    pub fn is_quota_met(&self, user_id: &str) -> bool {
        self.get(user_id)
            .is_some_and(|entry| entry.symbols >= self.symbols_per_hour)
    }

    /// Zeroes the counters and starts `hour` at `started_at`, leaving
    /// cooldown. Returns the new entry.
    pub fn reset(
        &self,
        user_id: &str,
        hour: i32,
        started_at: DateTime<Utc>,
    ) -> Option<QuotaEntry> {
        let mut entry = self.get(user_id)?;
        entry.hour = hour;
        entry.posts = 0;
        entry.symbols = 0;
        entry.hour_started_at = started_at;
        entry.in_cooldown = false;
        self.insert(user_id, entry.clone());
        Some(entry)
    }

    /// Marks the user's hour as done and waiting for the next boundary.
    pub fn enter_cooldown(&self, user_id: &str) -> Option<QuotaEntry> {
        let mut entry = self.get(user_id)?;
        entry.in_cooldown = true;
        self.insert(user_id, entry.clone());
        Some(entry)
    }

    /// Stops tracking a user.
    pub fn evict(&self, user_id: &str) -> Option<QuotaEntry> {
        self.entries.delete(&user_id.to_string())
    }

    /// Users currently tracked.
    #[must_use]
    pub fn users(&self) -> Vec<String> {
        self.entries.keys()
    }

    /// Progress for an entry against this tracker's quota.
    #[must_use]
    pub fn progress_of(&self, entry: &QuotaEntry) -> HourProgress {
        HourProgress {
            hour: entry.hour,
            posts: entry.posts,
            symbols: entry.symbols,
            percent: progress_percent(entry.symbols, self.symbols_per_hour),
            quota_met: entry.symbols >= self.symbols_per_hour,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::Duration;

    fn tracked(tracker: &QuotaTracker, user: &str) -> DateTime<Utc> {
        let start = Utc::now();
        tracker.insert(user, QuotaEntry::new(1, "chan".to_string(), 1, 2, start));
        start
    }

    #[test]
    fn test_record_accumulates_and_clamps() {
        let tracker = QuotaTracker::new(3200);
        tracked(&tracker, "u1");

        let progress = tracker.record("u1", 1600).unwrap();
        assert_eq!(progress.posts, 1);
        assert_eq!(progress.percent, 50);
        assert!(!progress.quota_met);

        let progress = tracker.record("u1", 2000).unwrap();
        assert_eq!(progress.posts, 2);
        assert_eq!(progress.symbols, 3600);
        assert_eq!(progress.percent, 100);
        assert!(progress.quota_met);
        assert!(tracker.is_quota_met("u1"));
    }

    #[test]
    fn test_quota_met_at_exact_threshold() {
        let tracker = QuotaTracker::new(3200);
        tracked(&tracker, "u1");
        tracker.record("u1", 3199).unwrap();
        assert!(!tracker.is_quota_met("u1"));

        let tracker = QuotaTracker::new(3200);
        tracked(&tracker, "u1");
        tracker.record("u1", 3200).unwrap();
        assert!(tracker.is_quota_met("u1"));
    }

    #[test]
    fn test_record_untracked_user() {
        let tracker = QuotaTracker::new(3200);
        assert!(tracker.record("nobody", 500).is_none());
        assert!(!tracker.is_quota_met("nobody"));
    }

    #[test]
    fn test_reset_starts_new_hour() {
        let tracker = QuotaTracker::new(3200);
        let start = tracked(&tracker, "u1");
        tracker.record("u1", 3300).unwrap();
        tracker.enter_cooldown("u1").unwrap();

        let next_start = start + Duration::minutes(60);
        let entry = tracker.reset("u1", 2, next_start).unwrap();
        assert_eq!(entry.hour, 2);
        assert_eq!(entry.posts, 0);
        assert_eq!(entry.symbols, 0);
        assert_eq!(entry.hour_started_at, next_start);
        assert!(!entry.in_cooldown);
        assert_eq!(tracker.get("u1"), Some(entry));
    }

    #[test]
    fn test_evict_removes_entry() {
        let tracker = QuotaTracker::new(3200);
        tracked(&tracker, "u1");
        assert!(tracker.evict("u1").is_some());
        assert!(tracker.get("u1").is_none());
        assert!(tracker.users().is_empty());
    }

    #[test]
    fn test_progress_percent_bounds() {
        assert_eq!(progress_percent(0, 3200), 0);
        assert_eq!(progress_percent(1100, 3200), 34);
        assert_eq!(progress_percent(10_000, 3200), 100);
        assert_eq!(progress_percent(-5, 3200), 0);
        assert_eq!(progress_percent(10, 0), 100);
    }
}
