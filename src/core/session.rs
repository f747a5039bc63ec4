//! Training session persistence - the durable record of sessions, posts and
//! completed hours.
//!
//! The database is the source of truth; the engine's in-memory tracker is a
//! cache that can always be rebuilt from these tables. Status changes use
//! conditional updates (`WHERE status = ...`) so two racing callers cannot
//! both move the same session.

use crate::{
    entities::{
        SessionStatus, TrainingCategory, TrainingHour, TrainingPost, TrainingSession,
        training_hour, training_post, training_session,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};

/// Everything needed to persist a freshly configured session.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Trainee
    pub user_id: String,
    /// Character being trained
    pub character_id: i64,
    /// Guild the session runs in
    pub guild_id: String,
    /// Channel posts are written in
    pub channel_id: String,
    /// Hours requested
    pub total_hours: i32,
    /// What is trained
    pub category: TrainingCategory,
}

/// An accepted chat message about to be stored.
#[derive(Debug, Clone)]
pub struct NewPost {
    /// Session the post counts toward
    pub session_id: i64,
    /// Hour it was written in
    pub hour: i32,
    /// Position within the hour, 1-based
    pub sequence: i32,
    /// Discord message id
    pub message_id: String,
    /// Raw text
    pub content: String,
    /// Non-whitespace character count
    pub symbols: i64,
}

/// Inserts a session in `active` status on hour 1, with the hour clock
/// starting at `now`.
pub async fn create_session(
    db: &DatabaseConnection,
    new: NewSession,
    now: DateTime<Utc>,
) -> Result<training_session::Model> {
    let session = training_session::ActiveModel {
        user_id: Set(new.user_id),
        character_id: Set(new.character_id),
        guild_id: Set(new.guild_id),
        channel_id: Set(new.channel_id),
        total_hours: Set(new.total_hours),
        category: Set(new.category),
        current_hour: Set(1),
        status: Set(SessionStatus::Active),
        hour_started_at: Set(now),
        created_at: Set(now),
        finished_at: Set(None),
        failure_reason: Set(None),
        ..Default::default()
    };

    session.insert(db).await.map_err(Into::into)
}

/// Finds a session by id.
pub async fn get_session_by_id<C>(db: &C, session_id: i64) -> Result<Option<training_session::Model>>
where
    C: ConnectionTrait,
{
    TrainingSession::find_by_id(session_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a session by id, failing with [`Error::SessionNotFound`].
pub async fn require_session<C>(db: &C, session_id: i64) -> Result<training_session::Model>
where
    C: ConnectionTrait,
{
    get_session_by_id(db, session_id)
        .await?
        .ok_or(Error::SessionNotFound { session_id })
}

/// Returns the user's `active` session, if any.
pub async fn get_active_session_for_user(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Option<training_session::Model>> {
    TrainingSession::find()
        .filter(training_session::Column::UserId.eq(user_id))
        .filter(training_session::Column::Status.eq(SessionStatus::Active))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Returns every `active` session, oldest first.
pub async fn get_active_sessions(db: &DatabaseConnection) -> Result<Vec<training_session::Model>> {
    TrainingSession::find()
        .filter(training_session::Column::Status.eq(SessionStatus::Active))
        .order_by_asc(training_session::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Returns the user's most recently finished session.
pub async fn get_last_finished_session_for_user(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Option<training_session::Model>> {
    TrainingSession::find()
        .filter(training_session::Column::UserId.eq(user_id))
        .filter(training_session::Column::FinishedAt.is_not_null())
        .order_by_desc(training_session::Column::FinishedAt)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Appends an accepted post.
pub async fn insert_post<C>(db: &C, post: NewPost, now: DateTime<Utc>) -> Result<training_post::Model>
where
    C: ConnectionTrait,
{
    let model = training_post::ActiveModel {
        session_id: Set(post.session_id),
        hour: Set(post.hour),
        sequence: Set(post.sequence),
        message_id: Set(post.message_id),
        content: Set(post.content),
        symbols: Set(post.symbols),
        created_at: Set(now),
        ..Default::default()
    };

    model.insert(db).await.map_err(Into::into)
}

/// Posts of one hour in arrival order.
pub async fn get_posts_for_hour<C>(
    db: &C,
    session_id: i64,
    hour: i32,
) -> Result<Vec<training_post::Model>>
where
    C: ConnectionTrait,
{
    TrainingPost::find()
        .filter(training_post::Column::SessionId.eq(session_id))
        .filter(training_post::Column::Hour.eq(hour))
        .order_by_asc(training_post::Column::Sequence)
        .all(db)
        .await
        .map_err(Into::into)
}

/// All posts of a session ordered by hour and sequence.
pub async fn get_posts_for_session<C>(db: &C, session_id: i64) -> Result<Vec<training_post::Model>>
where
    C: ConnectionTrait,
{
    TrainingPost::find()
        .filter(training_post::Column::SessionId.eq(session_id))
        .order_by_asc(training_post::Column::Hour)
        .order_by_asc(training_post::Column::Sequence)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Completed-hour milestones of a session, in hour order.
pub async fn get_hours_for_session<C>(db: &C, session_id: i64) -> Result<Vec<training_hour::Model>>
where
    C: ConnectionTrait,
{
    TrainingHour::find()
        .filter(training_hour::Column::SessionId.eq(session_id))
        .order_by_asc(training_hour::Column::Hour)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The milestone of one hour, if that hour was completed.
pub async fn get_hour_milestone<C>(
    db: &C,
    session_id: i64,
    hour: i32,
) -> Result<Option<training_hour::Model>>
where
    C: ConnectionTrait,
{
    TrainingHour::find()
        .filter(training_hour::Column::SessionId.eq(session_id))
        .filter(training_hour::Column::Hour.eq(hour))
        .one(db)
        .await
        .map_err(Into::into)
}

async fn record_hour<C>(
    db: &C,
    session_id: i64,
    hour: i32,
    posts: i32,
    symbols: i64,
    now: DateTime<Utc>,
) -> Result<training_hour::Model>
where
    C: ConnectionTrait,
{
    let milestone = training_hour::ActiveModel {
        session_id: Set(session_id),
        hour: Set(hour),
        posts: Set(posts),
        symbols: Set(symbols),
        completed_at: Set(now),
        ..Default::default()
    };
    milestone.insert(db).await.map_err(Into::into)
}

/// Records `hour` as completed and moves the session on to `hour + 1`.
///
/// The hour clock is not touched: the next hour starts at the original
/// boundary, which [`start_hour`] persists when it arrives. Callers run this
/// inside a transaction so the milestone and the hour counter move together.
pub async fn advance_hour<C>(
    db: &C,
    session_id: i64,
    hour: i32,
    posts: i32,
    symbols: i64,
    now: DateTime<Utc>,
) -> Result<training_session::Model>
where
    C: ConnectionTrait,
{
    let session = require_session(db, session_id).await?;
    if session.status != SessionStatus::Active
        || session.current_hour != hour
        || hour >= session.total_hours
    {
        return Err(Error::InvalidTransition {
            session_id,
            from: format!("{} (hour {})", session.status, session.current_hour),
            to: format!("hour {}", hour + 1),
        });
    }

    record_hour(db, session_id, hour, posts, symbols, now).await?;

    TrainingSession::update_many()
        .col_expr(training_session::Column::CurrentHour, Expr::value(hour + 1))
        .filter(training_session::Column::Id.eq(session_id))
        .filter(training_session::Column::Status.eq(SessionStatus::Active))
        .filter(training_session::Column::CurrentHour.eq(hour))
        .exec(db)
        .await?;

    require_session(db, session_id).await
}

/// Persists the start of `hour`, which must be the session's current hour.
pub async fn start_hour(
    db: &DatabaseConnection,
    session_id: i64,
    hour: i32,
    started_at: DateTime<Utc>,
) -> Result<()> {
    let result = TrainingSession::update_many()
        .col_expr(training_session::Column::HourStartedAt, Expr::value(started_at))
        .filter(training_session::Column::Id.eq(session_id))
        .filter(training_session::Column::Status.eq(SessionStatus::Active))
        .filter(training_session::Column::CurrentHour.eq(hour))
        .filter(training_session::Column::HourStartedAt.lte(started_at))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let session = require_session(db, session_id).await?;
        return Err(Error::InvalidTransition {
            session_id,
            from: format!("{} (hour {})", session.status, session.current_hour),
            to: format!("hour {hour} start"),
        });
    }
    Ok(())
}

/// Records the final hour and marks the session `completed`.
pub async fn complete_session<C>(
    db: &C,
    session_id: i64,
    hour: i32,
    posts: i32,
    symbols: i64,
    now: DateTime<Utc>,
) -> Result<training_session::Model>
where
    C: ConnectionTrait,
{
    record_hour(db, session_id, hour, posts, symbols, now).await?;
    finish_session(db, session_id, SessionStatus::Completed, None, now).await
}

/// Moves an `active` session to a terminal status.
pub async fn finish_session<C>(
    db: &C,
    session_id: i64,
    to: SessionStatus,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<training_session::Model>
where
    C: ConnectionTrait,
{
    let result = TrainingSession::update_many()
        .col_expr(training_session::Column::Status, Expr::value(to))
        .col_expr(training_session::Column::FinishedAt, Expr::value(Some(now)))
        .col_expr(
            training_session::Column::FailureReason,
            Expr::value(reason.map(ToString::to_string)),
        )
        .filter(training_session::Column::Id.eq(session_id))
        .filter(training_session::Column::Status.eq(SessionStatus::Active))
        .exec(db)
        .await?;

    let session = require_session(db, session_id).await?;
    if result.rows_affected == 0 {
        return Err(Error::InvalidTransition {
            session_id,
            from: session.status.to_string(),
            to: to.to_string(),
        });
    }
    Ok(session)
}

/// Moves a `completed` session to `approved` or `rejected`.
///
/// Fails with [`Error::AlreadyDecided`] when another decision got there
/// first.
pub async fn decide_session<C>(db: &C, session_id: i64, to: SessionStatus) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = TrainingSession::update_many()
        .col_expr(training_session::Column::Status, Expr::value(to))
        .filter(training_session::Column::Id.eq(session_id))
        .filter(training_session::Column::Status.eq(SessionStatus::Completed))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let session = require_session(db, session_id).await?;
        return Err(match session.status {
            SessionStatus::Approved | SessionStatus::Rejected => Error::AlreadyDecided {
                session_id,
                outcome: session.status.to_string(),
            },
            from => Error::InvalidTransition {
                session_id,
                from: from.to_string(),
                to: to.to_string(),
            },
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_and_find_active_session() -> Result<()> {
        let db = setup_test_db().await?;
        let character = create_test_character(&db, "user1", "Aiko").await?;
        let now = test_now();

        let session = create_session(&db, new_test_session("user1", character.id, 2), now).await?;
        assert_eq!(session.current_hour, 1);
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.hour_started_at, now);

        let active = get_active_session_for_user(&db, "user1").await?.unwrap();
        assert_eq!(active.id, session.id);
        assert!(get_active_session_for_user(&db, "user2").await?.is_none());
        assert_eq!(get_active_sessions(&db).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_advance_hour_records_milestone() -> Result<()> {
        let db = setup_test_db().await?;
        let character = create_test_character(&db, "user1", "Aiko").await?;
        let now = test_now();
        let session = create_session(&db, new_test_session("user1", character.id, 2), now).await?;

        let updated = advance_hour(&db, session.id, 1, 3, 3300, now).await?;
        assert_eq!(updated.current_hour, 2);
        assert_eq!(updated.hour_started_at, now);

        let milestone = get_hour_milestone(&db, session.id, 1).await?.unwrap();
        assert_eq!((milestone.posts, milestone.symbols), (3, 3300));

        // Hour 2 is the last one and cannot be advanced past
        let result = advance_hour(&db, session.id, 2, 4, 3200, now).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        // A stale hour is rejected too
        let result = advance_hour(&db, session.id, 1, 4, 3200, now).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_hour_milestone_recorded_once() -> Result<()> {
        let db = setup_test_db().await?;
        let character = create_test_character(&db, "user1", "Aiko").await?;
        let now = test_now();
        let session = create_session(&db, new_test_session("user1", character.id, 3), now).await?;

        record_hour(&db, session.id, 1, 4, 3200, now).await?;
        assert!(record_hour(&db, session.id, 1, 4, 3300, now).await.is_err());
        record_hour(&db, session.id, 2, 4, 3200, now).await?;
        assert_eq!(get_hours_for_session(&db, session.id).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_start_hour_never_rewinds() -> Result<()> {
        let db = setup_test_db().await?;
        let character = create_test_character(&db, "user1", "Aiko").await?;
        let now = test_now();
        let session = create_session(&db, new_test_session("user1", character.id, 2), now).await?;
        advance_hour(&db, session.id, 1, 3, 3300, now).await?;

        let boundary = now + Duration::minutes(60);
        start_hour(&db, session.id, 2, boundary).await?;
        let stored = require_session(&db, session.id).await?;
        assert_eq!(stored.hour_started_at, boundary);

        let result = start_hour(&db, session.id, 2, now).await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_finish_session_only_from_active() -> Result<()> {
        let db = setup_test_db().await?;
        let character = create_test_character(&db, "user1", "Aiko").await?;
        let now = test_now();
        let session = create_session(&db, new_test_session("user1", character.id, 1), now).await?;

        let failed = finish_session(
            &db,
            session.id,
            SessionStatus::Failed,
            Some("quota not met in time"),
            now,
        )
        .await?;
        assert_eq!(failed.status, SessionStatus::Failed);
        assert_eq!(failed.finished_at, Some(now));
        assert_eq!(failed.failure_reason.as_deref(), Some("quota not met in time"));

        let again = finish_session(&db, session.id, SessionStatus::Completed, None, now).await;
        assert!(matches!(again, Err(Error::InvalidTransition { .. })));

        let last = get_last_finished_session_for_user(&db, "user1").await?.unwrap();
        assert_eq!(last.id, session.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_decide_session_once() -> Result<()> {
        let db = setup_test_db().await?;
        let character = create_test_character(&db, "user1", "Aiko").await?;
        let now = test_now();
        let session = create_session(&db, new_test_session("user1", character.id, 1), now).await?;

        let premature = decide_session(&db, session.id, SessionStatus::Approved).await;
        assert!(matches!(premature, Err(Error::InvalidTransition { .. })));

        complete_session(&db, session.id, 1, 4, 3200, now).await?;
        decide_session(&db, session.id, SessionStatus::Approved).await?;

        let second = decide_session(&db, session.id, SessionStatus::Rejected).await;
        assert!(matches!(second, Err(Error::AlreadyDecided { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_posts_for_hour_in_sequence() -> Result<()> {
        let db = setup_test_db().await?;
        let character = create_test_character(&db, "user1", "Aiko").await?;
        let now = test_now();
        let session = create_session(&db, new_test_session("user1", character.id, 2), now).await?;

        for (sequence, hour) in [(1, 1), (2, 1), (1, 2)] {
            insert_post(
                &db,
                NewPost {
                    session_id: session.id,
                    hour,
                    sequence,
                    message_id: format!("m{hour}-{sequence}"),
                    content: "x".repeat(500),
                    symbols: 500,
                },
                now,
            )
            .await?;
        }

        let hour_one = get_posts_for_hour(&db, session.id, 1).await?;
        assert_eq!(hour_one.len(), 2);
        assert_eq!(hour_one[0].sequence, 1);
        assert_eq!(get_posts_for_session(&db, session.id).await?.len(), 3);
        Ok(())
    }
}
