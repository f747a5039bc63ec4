//! Shared test utilities for the training bot.
//!
//! This module provides an in-memory database, a clock tests can move by hand,
//! a notifier that records everything the engine says, and a harness tying
//! them to a [`TrainingEngine`].

use crate::{
    config::TrainingRules,
    core::{
        character,
        clock::Clock,
        engine::{StartRequest, TrainingEngine},
        notify::{ChannelResolver, TrainingEvent, TrainingNotifier},
        review::ReviewSummary,
        session::NewSession,
    },
    entities::{TrainingCategory, character as character_entity, training_session},
    errors::Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sea_orm::DatabaseConnection;
use std::sync::{Arc, Mutex};

/// Channel every test session runs in.
pub const TEST_CHANNEL: &str = "channel-1";

/// Name of the character [`TestHarness::character_of`] creates.
pub const TEST_CHARACTER: &str = "Aiko";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Fixed, whole-second instant all tests measure time from.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Creates a character for `user_id` with no colour.
pub async fn create_test_character(
    db: &DatabaseConnection,
    user_id: &str,
    name: &str,
) -> Result<character_entity::Model> {
    character::create_character(db, user_id, name, None, test_now()).await
}

/// A stats session in [`TEST_CHANNEL`].
#[must_use]
pub fn new_test_session(user_id: &str, character_id: i64, total_hours: i32) -> NewSession {
    NewSession {
        user_id: user_id.to_string(),
        character_id,
        guild_id: "guild-1".to_string(),
        channel_id: TEST_CHANNEL.to_string(),
        total_hours,
        category: TrainingCategory::Stats,
    }
}

/// A start request in [`TEST_CHANNEL`].
#[must_use]
pub fn start_request(user_id: &str, character_id: i64, total_hours: i32) -> StartRequest {
    StartRequest {
        user_id: user_id.to_string(),
        character_id,
        guild_id: "guild-1".to_string(),
        channel_id: TEST_CHANNEL.to_string(),
        total_hours,
        category: TrainingCategory::Stats,
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock standing at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    #[allow(clippy::unwrap_used)]
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    /// Moves the clock forward by `by`.
    #[allow(clippy::unwrap_used)]
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    #[allow(clippy::unwrap_used)]
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Notifier that keeps everything it is asked to deliver.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    channel: Mutex<Vec<(String, TrainingEvent)>>,
    direct: Mutex<Vec<(String, TrainingEvent)>>,
    reviews: Mutex<Vec<ReviewSummary>>,
}

#[allow(clippy::unwrap_used)]
impl RecordingNotifier {
    /// Events posted to channels, in order.
    #[must_use]
    pub fn events(&self) -> Vec<TrainingEvent> {
        self.channel
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Direct messages as `(user_id, event)`.
    #[must_use]
    pub fn direct_messages(&self) -> Vec<(String, TrainingEvent)> {
        self.direct.lock().unwrap().clone()
    }

    /// Summaries submitted for review.
    #[must_use]
    pub fn reviews(&self) -> Vec<ReviewSummary> {
        self.reviews.lock().unwrap().clone()
    }
}

#[async_trait]
#[allow(clippy::unwrap_used)]
impl TrainingNotifier for RecordingNotifier {
    async fn send_channel(&self, channel_id: &str, event: &TrainingEvent) -> Result<()> {
        self.channel
            .lock()
            .unwrap()
            .push((channel_id.to_string(), event.clone()));
        Ok(())
    }

    async fn send_direct(&self, user_id: &str, event: &TrainingEvent) -> Result<()> {
        self.direct
            .lock()
            .unwrap()
            .push((user_id.to_string(), event.clone()));
        Ok(())
    }

    async fn submit_review(&self, summary: &ReviewSummary) -> Result<Option<String>> {
        let mut reviews = self.reviews.lock().unwrap();
        reviews.push(summary.clone());
        Ok(Some(format!("review-{}", reviews.len())))
    }
}

/// Resolver answering the same for every channel.
#[derive(Debug, Clone, Copy)]
pub struct StaticResolver(pub bool);

#[async_trait]
impl ChannelResolver for StaticResolver {
    async fn resolve_channel(&self, _channel_id: &str) -> bool {
        self.0
    }
}

/// An engine over an in-memory database with a manual clock at
/// [`test_now`] and default rules.
pub struct TestHarness {
    /// Engine under test
    pub engine: Arc<TrainingEngine>,
    /// Clock the engine reads
    pub clock: Arc<ManualClock>,
    /// Everything the engine sent
    pub notifier: Arc<RecordingNotifier>,
}

impl TestHarness {
    /// Builds the harness.
    pub async fn new() -> Result<Self> {
        let db = setup_test_db().await?;
        let clock = Arc::new(ManualClock::new(test_now()));
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = TrainingEngine::new(
            db,
            TrainingRules::default(),
            Arc::clone(&notifier) as Arc<dyn TrainingNotifier>,
        )
        .with_clock(Arc::clone(&clock) as Arc<dyn Clock>);
        Ok(Self {
            engine: Arc::new(engine),
            clock,
            notifier,
        })
    }

    /// Id of the user's [`TEST_CHARACTER`], created on first use.
    pub async fn character_of(&self, user_id: &str) -> Result<i64> {
        let db = self.engine.database();
        if let Some(existing) = character::get_character_by_name(db, user_id, TEST_CHARACTER).await? {
            return Ok(existing.id);
        }
        Ok(create_test_character(db, user_id, TEST_CHARACTER).await?.id)
    }

    /// Starts a session for `user_id` through the engine.
    pub async fn start(&self, user_id: &str, total_hours: i32) -> Result<training_session::Model> {
        let character_id = self.character_of(user_id).await?;
        self.engine
            .start_session(start_request(user_id, character_id, total_hours))
            .await
    }
}
