//! Recovery - rebuilding in-memory state after a restart.
//!
//! Startup happens in two phases. [`TrainingEngine::reconstruct_state`] only
//! needs the database: it fails sessions whose hour ran out while the process
//! was down, replays stored posts into the quota tracker and works out which
//! timer each surviving session needs. [`TrainingEngine::arm_pending_timers`]
//! runs once the chat connection is up, because announcing anything needs
//! channels that resolve.
//!
//! A session is in cooldown when the milestone of the previous hour was
//! written after the stored hour start: the hour counter moved on but the next
//! hour's clock has not started yet.

use crate::{
    core::{
        engine::{TrainingEngine, record_completion},
        notify::{ChannelResolver, FailureReason, TrainingEvent},
        session,
        timers::{TimerKind, TimerTicket},
        tracker::QuotaEntry,
    },
    entities::{SessionStatus, training_session},
    errors::Result,
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::TransactionTrait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A timer recovery wants armed once channels resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTimerArm {
    /// Timer to arm
    pub ticket: TimerTicket,
    /// When it is due
    pub due_at: DateTime<Utc>,
    /// Time left when the plan was made
    pub remaining: Duration,
}

/// A session recovery marked `failed` because its hour ran out while the
/// process was down.
#[derive(Debug, Clone)]
pub struct ExpiredSession {
    /// The failed session
    pub session: training_session::Model,
}

/// Output of the first recovery phase.
#[derive(Debug, Clone, Default)]
pub struct RecoveryPlan {
    /// Timers to arm
    pub pending: Vec<PendingTimerArm>,
    /// Sessions failed during recovery, to be announced
    pub expired: Vec<ExpiredSession>,
    /// Sessions whose final hour turned out complete, to be handed to review
    pub completed: Vec<i64>,
}

/// What the second recovery phase did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Timers armed
    pub armed: usize,
    /// Expired sessions announced
    pub announced: usize,
    /// Completed sessions handed to review
    pub reviews: usize,
    /// Channels that did not resolve
    pub unresolved: usize,
}

impl TrainingEngine {
    /// Rebuilds the quota tracker from the database and plans the timers of
    /// every active session. Sessions whose hour has already run out are
    /// marked `failed` here.
    ///
    /// A failure in one session is logged and does not stop the others.
    ///
    /// # Errors
    /// Fails only when the active sessions cannot be listed.
    pub async fn reconstruct_state(&self) -> Result<RecoveryPlan> {
        let sessions = session::get_active_sessions(&self.db).await?;
        let mut plan = RecoveryPlan::default();

        for stored in sessions {
            let session_id = stored.id;
            if let Err(e) = self.recover_session(stored, &mut plan).await {
                error!(session_id, "Failed to recover training session: {e}");
            }
        }

        info!(
            pending = plan.pending.len(),
            expired = plan.expired.len(),
            completed = plan.completed.len(),
            "Training state reconstructed"
        );
        Ok(plan)
    }

    async fn recover_session(
        &self,
        stored: training_session::Model,
        plan: &mut RecoveryPlan,
    ) -> Result<()> {
        let now = self.clock.now();
        let hour_length = self.rules.hour_length();
        let boundary = stored.hour_started_at + hour_length;

        let finished_hour = if stored.current_hour > 1 {
            session::get_hour_milestone(&self.db, stored.id, stored.current_hour - 1)
                .await?
                .filter(|milestone| milestone.completed_at >= stored.hour_started_at)
        } else {
            None
        };

        if let Some(milestone) = finished_hour {
            if now >= boundary + hour_length {
                return self.expire(stored, plan).await;
            }
            if now >= boundary {
                // The next hour began while the process was down
                session::start_hour(&self.db, stored.id, stored.current_hour, boundary).await?;
                let started = training_session::Model {
                    hour_started_at: boundary,
                    ..stored
                };
                return self.recover_open_hour(started, now, plan).await;
            }

            self.tracker.insert(
                &stored.user_id,
                QuotaEntry {
                    posts: milestone.posts,
                    symbols: milestone.symbols,
                    in_cooldown: true,
                    ..QuotaEntry::new(
                        stored.id,
                        stored.channel_id.clone(),
                        milestone.hour,
                        stored.total_hours,
                        stored.hour_started_at,
                    )
                },
            );
            plan.pending.push(PendingTimerArm {
                ticket: ticket_for(&stored, TimerKind::Cooldown),
                due_at: boundary,
                remaining: boundary - now,
            });
            return Ok(());
        }

        if now >= boundary {
            return self.expire(stored, plan).await;
        }
        self.recover_open_hour(stored, now, plan).await
    }

    /// Recovers a session whose current hour is running.
    async fn recover_open_hour(
        &self,
        stored: training_session::Model,
        now: DateTime<Utc>,
        plan: &mut RecoveryPlan,
    ) -> Result<()> {
        let posts = session::get_posts_for_hour(&self.db, stored.id, stored.current_hour).await?;
        let entry = QuotaEntry {
            posts: i32::try_from(posts.len()).unwrap_or(i32::MAX),
            symbols: posts.iter().map(|p| p.symbols).sum(),
            ..QuotaEntry::new(
                stored.id,
                stored.channel_id.clone(),
                stored.current_hour,
                stored.total_hours,
                stored.hour_started_at,
            )
        };
        let boundary = stored.hour_started_at + self.rules.hour_length();

        if entry.symbols < self.rules.symbols_per_hour {
            self.tracker.insert(&stored.user_id, entry);
            plan.pending.push(PendingTimerArm {
                ticket: ticket_for(&stored, TimerKind::Failure),
                due_at: boundary,
                remaining: boundary - now,
            });
            return Ok(());
        }

        // Quota was met but the process stopped before the hour was recorded
        let txn = self.db.begin().await?;
        let updated = record_completion(&txn, &entry, now).await?;
        txn.commit().await?;

        if updated.status == SessionStatus::Completed {
            info!(session_id = stored.id, "Recovered a session whose last hour was complete");
            plan.completed.push(stored.id);
            return Ok(());
        }

        self.tracker.insert(
            &stored.user_id,
            QuotaEntry {
                in_cooldown: true,
                ..entry
            },
        );
        plan.pending.push(PendingTimerArm {
            ticket: ticket_for(&updated, TimerKind::Cooldown),
            due_at: boundary,
            remaining: boundary - now,
        });
        Ok(())
    }

    async fn expire(&self, stored: training_session::Model, plan: &mut RecoveryPlan) -> Result<()> {
        let failed = session::finish_session(
            &self.db,
            stored.id,
            SessionStatus::Failed,
            Some(FailureReason::Timeout.as_str()),
            self.clock.now(),
        )
        .await?;
        warn!(
            user_id = %failed.user_id,
            session_id = failed.id,
            hour = failed.current_hour,
            "Training hour expired while offline"
        );
        plan.expired.push(ExpiredSession { session: failed });
        Ok(())
    }

    /// Second recovery phase: announces sessions failed during recovery,
    /// hands completed ones to review, and arms the planned timers.
    ///
    /// Timers are armed for their recorded due time even when the channel
    /// does not resolve, so a session can never be left without a deadline.
    pub async fn arm_pending_timers(
        self: &Arc<Self>,
        plan: RecoveryPlan,
        resolver: &dyn ChannelResolver,
    ) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        for expired in plan.expired {
            let stored = expired.session;
            let event = TrainingEvent::SessionFailed {
                session_id: stored.id,
                user_id: stored.user_id.clone(),
                hour: stored.current_hour,
                reason: FailureReason::Timeout,
            };
            if resolver.resolve_channel(&stored.channel_id).await {
                self.notify_owner(&stored.channel_id, &stored.user_id, &event)
                    .await;
                report.announced += 1;
            } else {
                warn!(
                    session_id = stored.id,
                    channel_id = %stored.channel_id,
                    "Cannot announce expired session, channel unavailable"
                );
                report.unresolved += 1;
            }
        }

        for session_id in plan.completed {
            match self.hand_off_review(session_id).await {
                Ok(_) => report.reviews += 1,
                Err(e) => error!(session_id, "Failed to submit recovered session for review: {e}"),
            }
        }

        for arm in plan.pending {
            if !resolver.resolve_channel(&arm.ticket.channel_id).await {
                warn!(
                    session_id = arm.ticket.session_id,
                    channel_id = %arm.ticket.channel_id,
                    "Session channel unavailable, arming timer anyway"
                );
                report.unresolved += 1;
            }

            let lock = self.user_lock(&arm.ticket.user_id);
            let _guard = lock.lock().await;
            if !self.timers.pending(&arm.ticket.user_id).is_empty() {
                continue;
            }
            let delay = (arm.due_at - self.clock.now()).max(Duration::zero());
            self.arm_timer(arm.ticket, arm.due_at, delay);
            report.armed += 1;
        }

        info!(
            armed = report.armed,
            announced = report.announced,
            reviews = report.reviews,
            unresolved = report.unresolved,
            "Recovered training timers"
        );
        report
    }
}

fn ticket_for(stored: &training_session::Model, kind: TimerKind) -> TimerTicket {
    TimerTicket {
        kind,
        user_id: stored.user_id.clone(),
        session_id: stored.id,
        hour: stored.current_hour,
        channel_id: stored.channel_id.clone(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::session::{NewPost, create_session, insert_post};
    use crate::entities::training_hour;
    use crate::test_utils::*;
    use sea_orm::{ActiveModelTrait, Set};

    async fn stored_session(harness: &TestHarness, total_hours: i32) -> Result<training_session::Model> {
        stored_session_for(harness, "user1", total_hours).await
    }

    async fn stored_session_for(
        harness: &TestHarness,
        user_id: &str,
        total_hours: i32,
    ) -> Result<training_session::Model> {
        let character_id = harness.character_of(user_id).await?;
        create_session(
            harness.engine.database(),
            new_test_session(user_id, character_id, total_hours),
            test_now(),
        )
        .await
    }

    async fn stored_post(
        harness: &TestHarness,
        session_id: i64,
        hour: i32,
        sequence: i32,
        symbols: i64,
    ) -> Result<()> {
        insert_post(
            harness.engine.database(),
            NewPost {
                session_id,
                hour,
                sequence,
                message_id: format!("m{hour}-{sequence}"),
                content: "x".repeat(10),
                symbols,
            },
            test_now(),
        )
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_recovers_running_hour_with_remaining_delay() -> Result<()> {
        let harness = TestHarness::new().await?;
        let stored = stored_session(&harness, 2).await?;
        stored_post(&harness, stored.id, 1, 1, 1000).await?;
        stored_post(&harness, stored.id, 1, 2, 1000).await?;

        harness.clock.set(test_now() + Duration::minutes(20));
        let plan = harness.engine.reconstruct_state().await?;

        let entry = harness.engine.tracker().get("user1").unwrap();
        assert_eq!((entry.hour, entry.posts, entry.symbols), (1, 2, 2000));
        assert!(!entry.in_cooldown);
        assert_eq!(plan.pending.len(), 1);
        assert_eq!(plan.pending[0].ticket.kind, TimerKind::Failure);
        assert_eq!(plan.pending[0].remaining, Duration::minutes(40));

        let report = harness
            .engine
            .arm_pending_timers(plan, &StaticResolver(true))
            .await;
        assert_eq!(report.armed, 1);
        let pending = harness.engine.timers().pending("user1");
        assert_eq!(pending[0].1, test_now() + Duration::minutes(60));
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_hour_fails_on_startup() -> Result<()> {
        let harness = TestHarness::new().await?;
        let stored = stored_session(&harness, 2).await?;

        harness.clock.set(test_now() + Duration::minutes(61));
        let plan = harness.engine.reconstruct_state().await?;
        assert_eq!(plan.expired.len(), 1);
        assert!(plan.pending.is_empty());
        assert!(harness.engine.tracker().get("user1").is_none());

        let failed = session::require_session(harness.engine.database(), stored.id).await?;
        assert_eq!(failed.status, SessionStatus::Failed);

        let report = harness
            .engine
            .arm_pending_timers(plan, &StaticResolver(true))
            .await;
        assert_eq!(report.announced, 1);
        assert!(harness.notifier.events().iter().any(|event| matches!(
            event,
            TrainingEvent::SessionFailed { session_id, .. } if *session_id == stored.id
        )));
        Ok(())
    }

    #[tokio::test]
    async fn test_recovers_cooldown() -> Result<()> {
        let harness = TestHarness::new().await?;
        let stored = stored_session(&harness, 2).await?;
        stored_post(&harness, stored.id, 1, 1, 3300).await?;
        session::advance_hour(
            harness.engine.database(),
            stored.id,
            1,
            1,
            3300,
            test_now() + Duration::minutes(10),
        )
        .await?;

        harness.clock.set(test_now() + Duration::minutes(30));
        let plan = harness.engine.reconstruct_state().await?;

        let entry = harness.engine.tracker().get("user1").unwrap();
        assert!(entry.in_cooldown);
        assert_eq!((entry.hour, entry.symbols), (1, 3300));
        assert_eq!(plan.pending.len(), 1);
        let arm = &plan.pending[0];
        assert_eq!(arm.ticket.kind, TimerKind::Cooldown);
        assert_eq!(arm.ticket.hour, 2);
        assert_eq!(arm.due_at, test_now() + Duration::minutes(60));
        assert_eq!(arm.remaining, Duration::minutes(30));
        Ok(())
    }

    #[tokio::test]
    async fn test_cooldown_boundary_passed_while_offline() -> Result<()> {
        let harness = TestHarness::new().await?;
        let stored = stored_session(&harness, 2).await?;
        stored_post(&harness, stored.id, 1, 1, 3300).await?;
        session::advance_hour(
            harness.engine.database(),
            stored.id,
            1,
            1,
            3300,
            test_now() + Duration::minutes(10),
        )
        .await?;

        harness.clock.set(test_now() + Duration::minutes(70));
        let plan = harness.engine.reconstruct_state().await?;

        let entry = harness.engine.tracker().get("user1").unwrap();
        assert_eq!((entry.hour, entry.posts, entry.in_cooldown), (2, 0, false));
        assert_eq!(entry.hour_started_at, test_now() + Duration::minutes(60));
        assert_eq!(plan.pending[0].ticket.kind, TimerKind::Failure);
        assert_eq!(plan.pending[0].due_at, test_now() + Duration::minutes(120));

        let restarted = session::require_session(harness.engine.database(), stored.id).await?;
        assert_eq!(restarted.hour_started_at, test_now() + Duration::minutes(60));
        Ok(())
    }

    #[tokio::test]
    async fn test_met_quota_without_milestone_advances() -> Result<()> {
        let harness = TestHarness::new().await?;
        let stored = stored_session(&harness, 2).await?;
        stored_post(&harness, stored.id, 1, 1, 1700).await?;
        stored_post(&harness, stored.id, 1, 2, 1700).await?;

        harness.clock.set(test_now() + Duration::minutes(20));
        let plan = harness.engine.reconstruct_state().await?;

        let advanced = session::require_session(harness.engine.database(), stored.id).await?;
        assert_eq!(advanced.current_hour, 2);
        assert!(harness.engine.tracker().get("user1").unwrap().in_cooldown);
        assert_eq!(plan.pending[0].ticket.kind, TimerKind::Cooldown);
        assert_eq!(plan.pending[0].ticket.hour, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_met_final_hour_completes_and_reviews() -> Result<()> {
        let harness = TestHarness::new().await?;
        let stored = stored_session(&harness, 1).await?;
        stored_post(&harness, stored.id, 1, 1, 3200).await?;

        harness.clock.set(test_now() + Duration::minutes(20));
        let plan = harness.engine.reconstruct_state().await?;
        assert_eq!(plan.completed, vec![stored.id]);
        assert!(plan.pending.is_empty());

        let report = harness
            .engine
            .arm_pending_timers(plan, &StaticResolver(true))
            .await;
        assert_eq!(report.reviews, 1);
        assert_eq!(harness.notifier.reviews().len(), 1);
        let completed = session::require_session(harness.engine.database(), stored.id).await?;
        assert_eq!(completed.status, SessionStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_session_does_not_block_others() -> Result<()> {
        let harness = TestHarness::new().await?;
        let db = harness.engine.database();

        // Hour 1 is already on record, so finishing its transition fails
        let broken = stored_session_for(&harness, "user1", 2).await?;
        stored_post(&harness, broken.id, 1, 1, 3300).await?;
        training_hour::ActiveModel {
            session_id: Set(broken.id),
            hour: Set(1),
            posts: Set(1),
            symbols: Set(3300),
            completed_at: Set(test_now() - Duration::minutes(5)),
            ..Default::default()
        }
        .insert(db)
        .await?;

        let healthy = stored_session_for(&harness, "user2", 2).await?;
        stored_post(&harness, healthy.id, 1, 1, 1000).await?;

        harness.clock.set(test_now() + Duration::minutes(20));
        let plan = harness.engine.reconstruct_state().await?;

        assert!(harness.engine.tracker().get("user1").is_none());
        let entry = harness.engine.tracker().get("user2").unwrap();
        assert_eq!((entry.session_id, entry.hour, entry.symbols), (healthy.id, 1, 1000));
        assert_eq!(plan.pending.len(), 1);
        assert_eq!(plan.pending[0].ticket.session_id, healthy.id);
        assert_eq!(plan.pending[0].ticket.kind, TimerKind::Failure);

        let untouched = session::require_session(db, broken.id).await?;
        assert_eq!(untouched.status, SessionStatus::Active);
        assert_eq!(untouched.current_hour, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_unresolved_channel_still_armed() -> Result<()> {
        let harness = TestHarness::new().await?;
        stored_session(&harness, 1).await?;

        harness.clock.set(test_now() + Duration::minutes(5));
        let plan = harness.engine.reconstruct_state().await?;
        let report = harness
            .engine
            .arm_pending_timers(plan, &StaticResolver(false))
            .await;

        assert_eq!(report.unresolved, 1);
        assert_eq!(report.armed, 1);
        assert_eq!(harness.engine.timers().len(), 1);
        Ok(())
    }
}
