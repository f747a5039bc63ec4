//! Core module - framework-agnostic training logic.
//!
//! Nothing in here knows about Discord. The bot layer feeds inbound posts and
//! commands into [`engine::TrainingEngine`] and renders the
//! [`notify::TrainingEvent`]s it emits.

pub mod character;
pub mod clock;
pub mod engine;
pub mod ingest;
pub mod notify;
pub mod recovery;
pub mod review;
pub mod session;
pub mod store;
pub mod timers;
pub mod tracker;

pub use engine::{HourCompletion, PostOutcome, SessionView, StartRequest, TrainingEngine};
pub use notify::{ChannelResolver, TrainingEvent, TrainingNotifier};
pub use recovery::{RecoveryPlan, RecoveryReport};
pub use review::ReviewSummary;
