//! Post ingestion rules - deciding whether a chat message counts.
//!
//! [`check_post`] is the pure part of the pipeline: given the user's current
//! quota entry, the size of the post and the time, it returns the first rule
//! the post breaks, in this order:
//!
//! 1. the hour's deadline has passed (and the hour is not in cooldown)
//! 2. the hour is in cooldown
//! 3. the post is shorter than the minimum
//! 4. the hour's post budget is used up
//!
//! Whether the author has an active session in the channel at all is decided
//! by the engine before these rules run. Repeated warnings of the same kind
//! are throttled by [`WarningLimiter`]; the too-short explanation never is.

use crate::config::TrainingRules;
use crate::core::notify::RejectReason;
use crate::core::tracker::QuotaEntry;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// A chat message delivered to the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct InboundPost {
    /// Author
    pub user_id: String,
    /// Channel the message was posted in
    pub channel_id: String,
    /// Discord message id
    pub message_id: String,
    /// Raw text
    pub content: String,
}

/// Number of non-whitespace characters in `content`.
#[must_use]
pub fn count_symbols(content: &str) -> i64 {
    let count = content.chars().filter(|c| !c.is_whitespace()).count();
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Verdict of the ingestion rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The post counts
    Accept,
    /// The post does not count
    Reject(RejectReason),
}

/// End of the entry's hour.
#[must_use]
pub fn hour_deadline(entry: &QuotaEntry, rules: &TrainingRules) -> DateTime<Utc> {
    entry.hour_started_at + rules.hour_length()
}

/// Applies the ingestion rules to a post of `symbols` arriving at `now`.
#[must_use]
pub fn check_post(
    entry: &QuotaEntry,
    symbols: i64,
    rules: &TrainingRules,
    now: DateTime<Utc>,
) -> Verdict {
    let deadline = hour_deadline(entry, rules);
    let remaining = (deadline - now).max(Duration::zero());

    if now >= deadline && !entry.in_cooldown {
        return Verdict::Reject(RejectReason::WindowExpired);
    }
    if entry.in_cooldown {
        return Verdict::Reject(RejectReason::InCooldown { remaining });
    }
    if symbols < rules.min_post_symbols {
        return Verdict::Reject(RejectReason::TooShort {
            symbols,
            required: rules.min_post_symbols,
        });
    }
    if entry.posts >= rules.max_posts_per_hour {
        return Verdict::Reject(RejectReason::HourCapReached { remaining });
    }
    Verdict::Accept
}

/// Kinds of warning that are rate limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// Posting after the hour's deadline
    WindowExpired,
    /// Posting during cooldown
    Cooldown,
    /// Posting past the hour's post budget
    HourCap,
}

impl RejectReason {
    /// The rate-limit bucket of this rejection, or `None` when it is always
    /// reported.
    #[must_use]
    pub const fn warning_kind(&self) -> Option<WarningKind> {
        match self {
            Self::WindowExpired => Some(WarningKind::WindowExpired),
            Self::InCooldown { .. } => Some(WarningKind::Cooldown),
            Self::HourCapReached { .. } => Some(WarningKind::HourCap),
            Self::TooShort { .. } => None,
        }
    }
}

/// Remembers when each user was last warned about each kind of problem.
#[derive(Debug)]
pub struct WarningLimiter {
    last_warned: DashMap<(String, WarningKind), DateTime<Utc>>,
    interval: Duration,
}

impl WarningLimiter {
    /// Creates a limiter allowing one warning of a kind per `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            last_warned: DashMap::new(),
            interval,
        }
    }

    /// Returns whether a warning of `kind` may be sent to `user_id` now, and
    /// if so records it as sent.
    pub fn should_warn(&self, user_id: &str, kind: WarningKind, now: DateTime<Utc>) -> bool {
        let key = (user_id.to_string(), kind);
        let allowed = self
            .last_warned
            .get(&key)
            .is_none_or(|last| now - *last >= self.interval);
        if allowed {
            self.last_warned.insert(key, now);
        }
        allowed
    }

    /// Forgets every warning sent to `user_id`.
    pub fn clear_user(&self, user_id: &str) {
        self.last_warned.retain(|(user, _), _| user != user_id);
    }
}
