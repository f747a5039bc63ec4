//! Review handoff - summarising completed sessions and recording the
//! reviewer's decision.
//!
//! A `training_reviews` row is opened in the same transaction that marks a
//! session `completed`. The decision moves both the session and the review row
//! exactly once; a second decision fails with [`Error::AlreadyDecided`].

use crate::{
    core::{character, engine::TrainingEngine, notify::TrainingEvent, session},
    entities::{
        ReviewOutcome, SessionStatus, TrainingCategory, TrainingReview, training_review,
        training_session,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::Expr};
use std::collections::BTreeMap;
use tracing::info;

/// Counters of one hour of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourBreakdown {
    /// Hour number, 1-based
    pub hour: i32,
    /// Posts accepted in the hour
    pub posts: i32,
    /// Symbols accepted in the hour
    pub symbols: i64,
}

/// Everything a reviewer needs to judge a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSummary {
    /// Session under review
    pub session_id: i64,
    /// Trainee
    pub user_id: String,
    /// Trained character
    pub character_id: i64,
    /// Character's name
    pub character_name: String,
    /// Character's embed colour
    pub character_color: Option<i32>,
    /// What was trained
    pub category: TrainingCategory,
    /// Hours configured
    pub total_hours: i32,
    /// Per-hour counters, in hour order
    pub hours: Vec<HourBreakdown>,
    /// Posts over all hours
    pub total_posts: i32,
    /// Symbols over all hours
    pub total_symbols: i64,
    /// When the session was started
    pub started_at: DateTime<Utc>,
    /// When the last hour was completed
    pub completed_at: Option<DateTime<Utc>>,
}

/// Opens the pending review of a session.
pub async fn open_review<C>(
    db: &C,
    session_id: i64,
    now: DateTime<Utc>,
) -> Result<training_review::Model>
where
    C: ConnectionTrait,
{
    let review = training_review::ActiveModel {
        session_id: Set(session_id),
        review_message_id: Set(None),
        outcome: Set(ReviewOutcome::Pending),
        reviewer_id: Set(None),
        reason: Set(None),
        created_at: Set(now),
        decided_at: Set(None),
        ..Default::default()
    };
    review.insert(db).await.map_err(Into::into)
}

/// The review of a session, if one was opened.
pub async fn get_review_for_session<C>(
    db: &C,
    session_id: i64,
) -> Result<Option<training_review::Model>>
where
    C: ConnectionTrait,
{
    TrainingReview::find()
        .filter(training_review::Column::SessionId.eq(session_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Remembers which chat message reviewers act on.
pub async fn set_review_message(
    db: &DatabaseConnection,
    session_id: i64,
    message_id: &str,
) -> Result<()> {
    TrainingReview::update_many()
        .col_expr(
            training_review::Column::ReviewMessageId,
            Expr::value(Some(message_id.to_string())),
        )
        .filter(training_review::Column::SessionId.eq(session_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Builds the review summary of a session from its stored posts.
///
/// Hours are listed in order; an hour without posts is listed with zeroes so
/// the breakdown always covers every configured hour.
pub async fn build_summary<C>(db: &C, session_id: i64) -> Result<ReviewSummary>
where
    C: ConnectionTrait,
{
    let stored = session::require_session(db, session_id).await?;
    let owner = character::get_character_by_id(db, stored.character_id)
        .await?
        .ok_or_else(|| Error::CharacterNotFound {
            id: stored.character_id.to_string(),
        })?;

    let mut by_hour: BTreeMap<i32, HourBreakdown> = (1..=stored.total_hours)
        .map(|hour| {
            (
                hour,
                HourBreakdown {
                    hour,
                    posts: 0,
                    symbols: 0,
                },
            )
        })
        .collect();
    for post in session::get_posts_for_session(db, session_id).await? {
        let slot = by_hour.entry(post.hour).or_insert(HourBreakdown {
            hour: post.hour,
            posts: 0,
            symbols: 0,
        });
        slot.posts += 1;
        slot.symbols += post.symbols;
    }

    let hours: Vec<HourBreakdown> = by_hour.into_values().collect();
    Ok(ReviewSummary {
        session_id,
        user_id: stored.user_id,
        character_id: owner.id,
        character_name: owner.name,
        character_color: owner.color,
        category: stored.category,
        total_hours: stored.total_hours,
        total_posts: hours.iter().map(|h| h.posts).sum(),
        total_symbols: hours.iter().map(|h| h.symbols).sum(),
        hours,
        started_at: stored.created_at,
        completed_at: stored.finished_at,
    })
}

async fn record_decision<C>(
    db: &C,
    session_id: i64,
    outcome: ReviewOutcome,
    reviewer_id: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = TrainingReview::update_many()
        .col_expr(training_review::Column::Outcome, Expr::value(outcome))
        .col_expr(
            training_review::Column::ReviewerId,
            Expr::value(Some(reviewer_id.to_string())),
        )
        .col_expr(
            training_review::Column::Reason,
            Expr::value(reason.map(ToString::to_string)),
        )
        .col_expr(training_review::Column::DecidedAt, Expr::value(Some(now)))
        .filter(training_review::Column::SessionId.eq(session_id))
        .filter(training_review::Column::Outcome.eq(ReviewOutcome::Pending))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let outcome = get_review_for_session(db, session_id)
            .await?
            .map_or_else(|| "missing".to_string(), |review| review.outcome.to_string());
        return Err(Error::AlreadyDecided {
            session_id,
            outcome,
        });
    }
    Ok(())
}

impl TrainingEngine {
    /// Posts a completed session's summary to reviewers.
    ///
    /// # Errors
    /// Fails when the summary cannot be built or delivered; the session stays
    /// `completed` and can still be decided by id.
    pub async fn hand_off_review(&self, session_id: i64) -> Result<ReviewSummary> {
        let summary = build_summary(&self.db, session_id).await?;
        if let Some(message_id) = self.notifier.submit_review(&summary).await? {
            set_review_message(&self.db, session_id, &message_id).await?;
        }
        info!(
            session_id,
            user_id = %summary.user_id,
            total_posts = summary.total_posts,
            total_symbols = summary.total_symbols,
            "Session handed off for review"
        );
        Ok(summary)
    }

    /// Approves a completed session.
    ///
    /// # Errors
    /// [`Error::AlreadyDecided`] when a decision exists, [`Error::InvalidTransition`]
    /// when the session is not `completed`.
    pub async fn approve(
        &self,
        session_id: i64,
        reviewer_id: &str,
    ) -> Result<training_session::Model> {
        let decided = self
            .decide(session_id, SessionStatus::Approved, reviewer_id, None)
            .await?;
        self.notify_owner(
            &decided.channel_id,
            &decided.user_id,
            &TrainingEvent::SessionApproved {
                session_id,
                user_id: decided.user_id.clone(),
                reviewer_id: reviewer_id.to_string(),
            },
        )
        .await;
        Ok(decided)
    }

    /// Rejects a completed session, keeping the reviewer's reason verbatim.
    ///
    /// # Errors
    /// Same as [`TrainingEngine::approve`].
    pub async fn reject(
        &self,
        session_id: i64,
        reviewer_id: &str,
        reason: &str,
    ) -> Result<training_session::Model> {
        let decided = self
            .decide(session_id, SessionStatus::Rejected, reviewer_id, Some(reason))
            .await?;
        self.notify_owner(
            &decided.channel_id,
            &decided.user_id,
            &TrainingEvent::SessionRejected {
                session_id,
                user_id: decided.user_id.clone(),
                reviewer_id: reviewer_id.to_string(),
                reason: reason.to_string(),
            },
        )
        .await;
        Ok(decided)
    }

    async fn decide(
        &self,
        session_id: i64,
        to: SessionStatus,
        reviewer_id: &str,
        reason: Option<&str>,
    ) -> Result<training_session::Model> {
        let outcome = match to {
            SessionStatus::Approved => ReviewOutcome::Approved,
            _ => ReviewOutcome::Rejected,
        };
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        session::decide_session(&txn, session_id, to).await?;
        record_decision(&txn, session_id, outcome, reviewer_id, reason, now).await?;
        let decided = session::require_session(&txn, session_id).await?;
        txn.commit().await?;

        info!(
            session_id,
            reviewer_id,
            outcome = %outcome,
            "Training review decided"
        );
        Ok(decided)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    async fn completed_session(harness: &TestHarness) -> Result<training_session::Model> {
        let db = harness.engine.database();
        let started = harness.start("user1", 2).await?;
        for (hour, sequence, symbols) in [(1, 1, 1800), (1, 2, 1500), (2, 1, 3300)] {
            session::insert_post(
                db,
                session::NewPost {
                    session_id: started.id,
                    hour,
                    sequence,
                    message_id: format!("m{hour}-{sequence}"),
                    content: "x".repeat(10),
                    symbols,
                },
                test_now(),
            )
            .await?;
        }
        session::advance_hour(db, started.id, 1, 2, 3300, test_now()).await?;
        session::complete_session(db, started.id, 2, 1, 3300, test_now()).await?;
        open_review(db, started.id, test_now()).await?;
        Ok(started)
    }

    #[tokio::test]
    async fn test_build_summary_breaks_down_hours() -> Result<()> {
        let harness = TestHarness::new().await?;
        let started = completed_session(&harness).await?;

        let summary = build_summary(harness.engine.database(), started.id).await?;
        assert_eq!(summary.character_name, TEST_CHARACTER);
        assert_eq!(summary.total_posts, 3);
        assert_eq!(summary.total_symbols, 6600);
        assert_eq!(
            summary.hours,
            vec![
                HourBreakdown { hour: 1, posts: 2, symbols: 3300 },
                HourBreakdown { hour: 2, posts: 1, symbols: 3300 },
            ]
        );
        assert_eq!(summary.completed_at, Some(test_now()));
        Ok(())
    }

    #[tokio::test]
    async fn test_hand_off_stores_review_message() -> Result<()> {
        let harness = TestHarness::new().await?;
        let started = completed_session(&harness).await?;

        harness.engine.hand_off_review(started.id).await?;
        let review = get_review_for_session(harness.engine.database(), started.id)
            .await?
            .unwrap();
        assert_eq!(review.review_message_id.as_deref(), Some("review-1"));
        assert_eq!(review.outcome, ReviewOutcome::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_approve_is_terminal() -> Result<()> {
        let harness = TestHarness::new().await?;
        let started = completed_session(&harness).await?;

        let approved = harness.engine.approve(started.id, "admin").await?;
        assert_eq!(approved.status, SessionStatus::Approved);

        let review = get_review_for_session(harness.engine.database(), started.id)
            .await?
            .unwrap();
        assert_eq!(review.outcome, ReviewOutcome::Approved);
        assert_eq!(review.reviewer_id.as_deref(), Some("admin"));

        let second = harness.engine.reject(started.id, "other", "late").await;
        assert!(matches!(second, Err(Error::AlreadyDecided { .. })));
        let again = harness.engine.approve(started.id, "admin").await;
        assert!(matches!(again, Err(Error::AlreadyDecided { .. })));

        assert!(harness.notifier.direct_messages().iter().any(|(user, event)| {
            user == "user1" && matches!(event, TrainingEvent::SessionApproved { .. })
        }));
        Ok(())
    }

    #[tokio::test]
    async fn test_reject_keeps_reason_verbatim() -> Result<()> {
        let harness = TestHarness::new().await?;
        let started = completed_session(&harness).await?;
        let reason = "  Posts repeat the same paragraph.  ";

        let rejected = harness.engine.reject(started.id, "admin", reason).await?;
        assert_eq!(rejected.status, SessionStatus::Rejected);

        let review = get_review_for_session(harness.engine.database(), started.id)
            .await?
            .unwrap();
        assert_eq!(review.reason.as_deref(), Some(reason));
        assert!(harness.notifier.events().iter().any(|event| matches!(
            event,
            TrainingEvent::SessionRejected { reason: r, .. } if r == reason
        )));
        Ok(())
    }

    #[tokio::test]
    async fn test_decision_requires_completed_session() -> Result<()> {
        let harness = TestHarness::new().await?;
        let active = harness.start("user1", 1).await?;

        let result = harness.engine.approve(active.id, "admin").await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
        let missing = harness.engine.approve(9999, "admin").await;
        assert!(matches!(missing, Err(Error::SessionNotFound { .. })));
        Ok(())
    }
}
