//! Outbound notifications produced by the training engine.
//!
//! The engine never formats chat messages. It emits [`TrainingEvent`] values
//! through a [`TrainingNotifier`], and the bot layer decides how each event
//! looks in Discord.

use crate::core::review::ReviewSummary;
use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Why a post was not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The hour's deadline passed before its quota was met
    WindowExpired,
    /// Quota already met, the next hour has not begun
    InCooldown {
        /// Time until the next hour starts
        remaining: Duration,
    },
    /// Post shorter than the minimum
    TooShort {
        /// Symbols in the post
        symbols: i64,
        /// Minimum required
        required: i64,
    },
    /// The hour's post budget is used up
    HourCapReached {
        /// Time until the next hour starts
        remaining: Duration,
    },
}

/// Why a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// An hour ended without its quota being met
    Timeout,
}

impl FailureReason {
    /// Text stored with the session and shown to the user.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "quota not met in time",
        }
    }
}

/// Something the chat layer should tell users or reviewers about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingEvent {
    /// A new session began
    SessionStarted {
        /// Session id
        session_id: i64,
        /// Trainee
        user_id: String,
        /// Trained character's name
        character_name: String,
        /// Hours configured
        total_hours: i32,
        /// What is trained, as a label
        category: String,
        /// End of the first hour
        deadline: DateTime<Utc>,
    },
    /// A post was counted
    PostAccepted {
        /// Session id
        session_id: i64,
        /// Trainee
        user_id: String,
        /// Current hour
        hour: i32,
        /// Hours configured
        total_hours: i32,
        /// Posts this hour
        posts: i32,
        /// Post budget per hour
        max_posts: i32,
        /// Symbols this hour
        symbols: i64,
        /// Hourly quota
        quota: i64,
        /// Progress toward the quota, 0-100
        percent: u8,
    },
    /// A post was not counted
    PostRejected {
        /// Author of the post
        user_id: String,
        /// Why
        reason: RejectReason,
    },
    /// An hour's quota was met and more hours remain
    HourCompleted {
        /// Session id
        session_id: i64,
        /// Trainee
        user_id: String,
        /// Hour that was completed
        hour: i32,
        /// Hours configured
        total_hours: i32,
        /// When the next hour begins
        next_hour_at: DateTime<Utc>,
    },
    /// A new hour began after a cooldown
    HourStarted {
        /// Session id
        session_id: i64,
        /// Trainee
        user_id: String,
        /// Hour that began
        hour: i32,
        /// Hours configured
        total_hours: i32,
        /// End of this hour
        deadline: DateTime<Utc>,
    },
    /// The last hour was completed; the session awaits review
    SessionCompleted {
        /// Session id
        session_id: i64,
        /// Trainee
        user_id: String,
        /// Posts over all hours
        total_posts: i32,
        /// Symbols over all hours
        total_symbols: i64,
    },
    /// The session failed
    SessionFailed {
        /// Session id
        session_id: i64,
        /// Trainee
        user_id: String,
        /// Hour that failed
        hour: i32,
        /// Why
        reason: FailureReason,
    },
    /// A reviewer approved the session
    SessionApproved {
        /// Session id
        session_id: i64,
        /// Trainee
        user_id: String,
        /// Reviewer
        reviewer_id: String,
    },
    /// A reviewer rejected the session
    SessionRejected {
        /// Session id
        session_id: i64,
        /// Trainee
        user_id: String,
        /// Reviewer
        reviewer_id: String,
        /// Reason given by the reviewer, verbatim
        reason: String,
    },
}

/// Delivery of engine events to the chat layer.
#[async_trait]
pub trait TrainingNotifier: Send + Sync {
    /// Posts an event into a channel.
    async fn send_channel(&self, channel_id: &str, event: &TrainingEvent) -> Result<()>;

    /// Sends an event to a user directly. Callers treat failures as
    /// best-effort.
    async fn send_direct(&self, user_id: &str, event: &TrainingEvent) -> Result<()>;

    /// Posts a completed session to the review surface and returns the id
    /// of the message reviewers act on, if one was created.
    async fn submit_review(&self, summary: &ReviewSummary) -> Result<Option<String>>;
}

/// Looks up whether a channel can be posted into.
///
/// Recovery uses this in its second phase, once the chat connection is up.
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    /// True when `channel_id` resolves to a channel the bot can reach.
    async fn resolve_channel(&self, channel_id: &str) -> bool;
}
