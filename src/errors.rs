//! Unified error types for the training bot.
//!
//! Every fallible operation in the crate returns [`Result`]. Domain rejections
//! (an active session already exists, a review was already decided, ...) are
//! distinct variants so the Discord layer can turn them into friendly replies,
//! while infrastructure failures (database, Discord, configuration) carry the
//! underlying error text.

use chrono::Duration;
use thiserror::Error;

/// Error type shared by the core engine, persistence and bot layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O failure (config file, data directory)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Required environment variable is missing or malformed
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Writing a formatted message failed
    #[error("Formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),

    /// Serenity/Poise framework error
    #[error("Serenity/Poise framework error: {0}")]
    #[allow(clippy::enum_variant_names)]
    FrameworkError(Box<poise::serenity_prelude::Error>),

    /// The user already has a session in progress
    #[error("User {user_id} already has an active training session (#{session_id})")]
    ActiveSessionExists {
        /// Owner of the session
        user_id: String,
        /// The session that is still active
        session_id: i64,
    },

    /// The user finished a session too recently to start another
    #[error("Training is on cooldown for another {} minutes", .remaining.num_minutes())]
    SessionCooldown {
        /// Time left until a new session may be started
        remaining: Duration,
    },

    /// Requested number of hours is outside the allowed range
    #[error("Invalid number of hours: {hours} (allowed {min}-{max})")]
    InvalidHours {
        /// Requested value
        hours: i32,
        /// Lowest allowed value
        min: i32,
        /// Highest allowed value
        max: i32,
    },

    /// Character does not exist or belongs to someone else
    #[error("Character not found: {id}")]
    CharacterNotFound {
        /// Character id or name that was looked up
        id: String,
    },

    /// Training session does not exist
    #[error("Training session not found: {session_id}")]
    SessionNotFound {
        /// Session id that was looked up
        session_id: i64,
    },

    /// A status change that the session state machine does not allow
    #[error("Session {session_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Session being changed
        session_id: i64,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// A review decision was already recorded for this session
    #[error("Session {session_id} has already been {outcome}")]
    AlreadyDecided {
        /// Session under review
        session_id: i64,
        /// The decision that was recorded first
        outcome: String,
    },
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::FrameworkError(Box::new(value))
    }
}

impl Error {
    /// Whether this error is a user-facing rejection rather than an
    /// infrastructure failure.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ActiveSessionExists { .. }
                | Self::SessionCooldown { .. }
                | Self::InvalidHours { .. }
                | Self::CharacterNotFound { .. }
                | Self::SessionNotFound { .. }
                | Self::InvalidTransition { .. }
                | Self::AlreadyDecided { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
