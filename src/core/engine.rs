//! Training engine - the lifecycle controller of training sessions.
//!
//! The engine owns every piece of in-memory state the training regimen needs:
//! the quota tracker, the hour timers, the warning limiter and a lock per user.
//! All of it is a cache of the database and can be rebuilt by
//! [`TrainingEngine::reconstruct_state`].
//!
//! Session states: `active` -> `completed` -> `approved` | `rejected`, or
//! `active` -> `failed`. While `active`, a session moves through its hours:
//! meeting an hour's quota early puts the user in cooldown until the hour's
//! fixed boundary, after which the next hour starts. Only a failure timer (or
//! recovery finding an expired hour) fails a session.
//!
//! Posts and timer callbacks of the same user are serialised through that
//! user's lock, so an hour completion triggered by one post finishes before
//! the next post of that user is looked at.

use crate::{
    config::TrainingRules,
    core::{
        character,
        clock::{Clock, SystemClock},
        ingest::{InboundPost, Verdict, WarningLimiter, check_post, count_symbols, hour_deadline},
        notify::{FailureReason, RejectReason, TrainingEvent, TrainingNotifier},
        review,
        session::{self, NewPost, NewSession},
        store::KeyValueStore,
        timers::{HourTimers, TimerKind, TimerTicket},
        tracker::{HourProgress, QuotaEntry, QuotaTracker},
    },
    entities::{SessionStatus, TrainingCategory, training_session},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use std::{future::Future, pin::Pin, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// A user's request to begin training.
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Trainee
    pub user_id: String,
    /// Character to train
    pub character_id: i64,
    /// Guild the session runs in
    pub guild_id: String,
    /// Channel posts will be written in
    pub channel_id: String,
    /// Hours requested
    pub total_hours: i32,
    /// What to train
    pub category: TrainingCategory,
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// The author has no active session in this channel
    Ignored,
    /// The post did not count
    Rejected {
        /// Why
        reason: RejectReason,
        /// Whether the user was told (rate-limited warnings may be skipped)
        notified: bool,
    },
    /// The post counted
    Accepted {
        /// Stored post id
        post_id: i64,
        /// Progress after this post
        progress: HourProgress,
        /// Set when this post met the hour's quota
        completion: Option<HourCompletion>,
    },
}

/// Result of meeting an hour's quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HourCompletion {
    /// More hours remain; the next one starts at the fixed boundary
    Advanced {
        /// Hour that starts next
        next_hour: i32,
        /// When it starts
        next_hour_at: DateTime<Utc>,
    },
    /// That was the last hour; the session awaits review
    SessionCompleted {
        /// Posts over all hours
        total_posts: i32,
        /// Symbols over all hours
        total_symbols: i64,
    },
}

/// A user's current session with its live counters.
#[derive(Debug, Clone)]
pub struct SessionView {
    /// Stored session
    pub session: training_session::Model,
    /// Counters of the current hour, if the session is tracked
    pub entry: Option<QuotaEntry>,
    /// Progress toward the hourly quota
    pub progress: Option<HourProgress>,
    /// End of the current hour
    pub deadline: Option<DateTime<Utc>>,
}

/// Boxed future returned by the timer dispatcher.
pub type TimerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Orchestrates training sessions: start, post ingestion, hour transitions,
/// failure, completion, review and recovery.
pub struct TrainingEngine {
    pub(crate) db: DatabaseConnection,
    pub(crate) rules: TrainingRules,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) notifier: Arc<dyn TrainingNotifier>,
    pub(crate) tracker: QuotaTracker,
    pub(crate) timers: HourTimers,
    warnings: WarningLimiter,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for TrainingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingEngine")
            .field("rules", &self.rules)
            .field("tracker", &self.tracker)
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

impl TrainingEngine {
    /// Creates an engine using the system clock and an in-memory tracker.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        rules: TrainingRules,
        notifier: Arc<dyn TrainingNotifier>,
    ) -> Self {
        Self {
            tracker: QuotaTracker::new(rules.symbols_per_hour),
            warnings: WarningLimiter::new(rules.warning_interval()),
            timers: HourTimers::new(),
            user_locks: DashMap::new(),
            clock: Arc::new(SystemClock),
            db,
            rules,
            notifier,
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the store behind the quota tracker.
    #[must_use]
    pub fn with_tracker_store(mut self, store: Box<dyn KeyValueStore<String, QuotaEntry>>) -> Self {
        self.tracker = QuotaTracker::with_store(store, self.rules.symbols_per_hour);
        self
    }

    /// Rules the engine enforces.
    #[must_use]
    pub const fn rules(&self) -> &TrainingRules {
        &self.rules
    }

    /// Database connection the engine persists to.
    #[must_use]
    pub const fn database(&self) -> &DatabaseConnection {
        &self.db
    }

    /// The quota tracker.
    #[must_use]
    pub const fn tracker(&self) -> &QuotaTracker {
        &self.tracker
    }

    /// The armed hour timers.
    #[must_use]
    pub const fn timers(&self) -> &HourTimers {
        &self.timers
    }

    pub(crate) fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.user_locks.entry(user_id.to_string()).or_default().value())
    }

    /// Runs `op` holding the user's lock, then drops the lock entry when the
    /// user is no longer tracked and nobody else is waiting on it.
    pub(crate) async fn with_user_lock<T, F, Fut>(&self, user_id: &str, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.user_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            op().await
        };
        drop(lock);
        self.user_locks.remove_if(user_id, |_, idle| {
            Arc::strong_count(idle) == 1 && self.tracker.get(user_id).is_none()
        });
        result
    }

    #[cfg(test)]
    pub(crate) fn locked_users(&self) -> usize {
        self.user_locks.len()
    }

    /// Starts a new session on hour 1 and arms its failure timer.
    ///
    /// # Errors
    /// Rejects out-of-range hours, characters the user does not own, users
    /// with an active session, and users whose last session ended within the
    /// restart cooldown. Nothing is created in those cases.
    pub async fn start_session(
        self: &Arc<Self>,
        request: StartRequest,
    ) -> Result<training_session::Model> {
        let user_id = request.user_id.clone();
        self.with_user_lock(&user_id, move || self.start_locked(request))
            .await
    }

    async fn start_locked(self: &Arc<Self>, request: StartRequest) -> Result<training_session::Model> {
        if !(self.rules.min_hours..=self.rules.max_hours).contains(&request.total_hours) {
            return Err(Error::InvalidHours {
                hours: request.total_hours,
                min: self.rules.min_hours,
                max: self.rules.max_hours,
            });
        }

        let character =
            character::require_owned_character(&self.db, &request.user_id, request.character_id)
                .await?;

        if let Some(active) = session::get_active_session_for_user(&self.db, &request.user_id).await? {
            return Err(Error::ActiveSessionExists {
                user_id: request.user_id,
                session_id: active.id,
            });
        }

        let now = self.clock.now();
        if let Some(finished_at) =
            session::get_last_finished_session_for_user(&self.db, &request.user_id)
                .await?
                .and_then(|last| last.finished_at)
        {
            let available_at = finished_at + self.rules.restart_cooldown();
            if now < available_at {
                return Err(Error::SessionCooldown {
                    remaining: available_at - now,
                });
            }
        }

        let created = session::create_session(
            &self.db,
            NewSession {
                user_id: request.user_id.clone(),
                character_id: character.id,
                guild_id: request.guild_id,
                channel_id: request.channel_id.clone(),
                total_hours: request.total_hours,
                category: request.category,
            },
            now,
        )
        .await?;

        self.tracker.insert(
            &created.user_id,
            QuotaEntry::new(
                created.id,
                created.channel_id.clone(),
                1,
                created.total_hours,
                now,
            ),
        );
        let deadline = now + self.rules.hour_length();
        self.arm_timer(
            TimerTicket {
                kind: TimerKind::Failure,
                user_id: created.user_id.clone(),
                session_id: created.id,
                hour: 1,
                channel_id: created.channel_id.clone(),
            },
            deadline,
            deadline - now,
        );

        info!(
            user_id = %created.user_id,
            session_id = created.id,
            total_hours = created.total_hours,
            category = %created.category,
            "Training session started"
        );
        self.announce(
            &created.channel_id,
            &TrainingEvent::SessionStarted {
                session_id: created.id,
                user_id: created.user_id.clone(),
                character_name: character.name,
                total_hours: created.total_hours,
                category: created.category.label().to_string(),
                deadline,
            },
        )
        .await;

        Ok(created)
    }

    /// Runs an inbound chat message through the ingestion pipeline.
    ///
    /// # Errors
    /// Only persistence failures are errors; rule violations are reported as
    /// [`PostOutcome::Rejected`].
    pub async fn handle_post(self: &Arc<Self>, post: InboundPost) -> Result<PostOutcome> {
        let tracked = self
            .tracker
            .get(&post.user_id)
            .is_some_and(|entry| entry.channel_id == post.channel_id);
        if !tracked {
            return Ok(PostOutcome::Ignored);
        }

        let user_id = post.user_id.clone();
        self.with_user_lock(&user_id, move || self.ingest(post))
            .await
    }

    async fn ingest(self: &Arc<Self>, post: InboundPost) -> Result<PostOutcome> {
        let Some(entry) = self.tracker.get(&post.user_id) else {
            return Ok(PostOutcome::Ignored);
        };
        if entry.channel_id != post.channel_id {
            return Ok(PostOutcome::Ignored);
        }

        let now = self.clock.now();
        let symbols = count_symbols(&post.content);

        if let Verdict::Reject(reason) = check_post(&entry, symbols, &self.rules, now) {
            let notified = reason
                .warning_kind()
                .is_none_or(|kind| self.warnings.should_warn(&post.user_id, kind, now));
            debug!(
                user_id = %post.user_id,
                session_id = entry.session_id,
                hour = entry.hour,
                ?reason,
                notified,
                "Training post rejected"
            );
            if notified {
                self.announce(
                    &post.channel_id,
                    &TrainingEvent::PostRejected {
                        user_id: post.user_id.clone(),
                        reason,
                    },
                )
                .await;
            }
            return Ok(PostOutcome::Rejected { reason, notified });
        }

        let counted = QuotaEntry {
            posts: entry.posts + 1,
            symbols: entry.symbols + symbols,
            ..entry
        };
        let progress = self.tracker.progress_of(&counted);

        // The post and the hour transition it triggers commit together; the
        // tracker follows only once they have.
        let txn = self.db.begin().await?;
        let stored = session::insert_post(
            &txn,
            NewPost {
                session_id: counted.session_id,
                hour: counted.hour,
                sequence: counted.posts,
                message_id: post.message_id,
                content: post.content,
                symbols,
            },
            now,
        )
        .await?;
        let transition = if progress.quota_met {
            Some(record_completion(&txn, &counted, now).await?)
        } else {
            None
        };
        txn.commit().await?;
        self.tracker.insert(&post.user_id, counted.clone());

        debug!(
            user_id = %post.user_id,
            session_id = counted.session_id,
            hour = progress.hour,
            posts = progress.posts,
            symbols = progress.symbols,
            "Training post accepted"
        );
        self.announce(
            &post.channel_id,
            &TrainingEvent::PostAccepted {
                session_id: counted.session_id,
                user_id: post.user_id.clone(),
                hour: progress.hour,
                total_hours: counted.total_hours,
                posts: progress.posts,
                max_posts: self.rules.max_posts_per_hour,
                symbols: progress.symbols,
                quota: self.rules.symbols_per_hour,
                percent: progress.percent,
            },
        )
        .await;

        let completion = match transition {
            Some(updated) => Some(self.complete_hour(&post.user_id, counted, &updated, now).await?),
            None => None,
        };

        Ok(PostOutcome::Accepted {
            post_id: stored.id,
            progress,
            completion,
        })
    }

    /// Follows up a committed hour transition: cooldown until the fixed
    /// boundary, or session completion on the final hour. Caller holds the
    /// user's lock.
    async fn complete_hour(
        self: &Arc<Self>,
        user_id: &str,
        entry: QuotaEntry,
        updated: &training_session::Model,
        now: DateTime<Utc>,
    ) -> Result<HourCompletion> {
        if updated.status == SessionStatus::Completed {
            return self.complete_session(user_id, &entry).await;
        }

        self.tracker.enter_cooldown(user_id);

        let boundary = hour_deadline(&entry, &self.rules);
        self.timers.cancel_user(user_id);
        self.arm_timer(
            TimerTicket {
                kind: TimerKind::Cooldown,
                user_id: user_id.to_string(),
                session_id: entry.session_id,
                hour: updated.current_hour,
                channel_id: entry.channel_id.clone(),
            },
            boundary,
            boundary - now,
        );

        info!(
            user_id,
            session_id = entry.session_id,
            hour = entry.hour,
            next_hour_at = %boundary,
            "Training hour completed"
        );
        self.announce(
            &entry.channel_id,
            &TrainingEvent::HourCompleted {
                session_id: entry.session_id,
                user_id: user_id.to_string(),
                hour: entry.hour,
                total_hours: entry.total_hours,
                next_hour_at: boundary,
            },
        )
        .await;

        Ok(HourCompletion::Advanced {
            next_hour: updated.current_hour,
            next_hour_at: boundary,
        })
    }

    async fn complete_session(
        self: &Arc<Self>,
        user_id: &str,
        entry: &QuotaEntry,
    ) -> Result<HourCompletion> {
        self.forget_user(user_id);

        let posts = session::get_posts_for_session(&self.db, entry.session_id).await?;
        let total_posts = i32::try_from(posts.len()).unwrap_or(i32::MAX);
        let total_symbols: i64 = posts.iter().map(|p| p.symbols).sum();

        info!(
            user_id,
            session_id = entry.session_id,
            total_posts,
            total_symbols,
            "Training session completed"
        );
        self.announce(
            &entry.channel_id,
            &TrainingEvent::SessionCompleted {
                session_id: entry.session_id,
                user_id: user_id.to_string(),
                total_posts,
                total_symbols,
            },
        )
        .await;

        if let Err(e) = self.hand_off_review(entry.session_id).await {
            error!(session_id = entry.session_id, "Failed to submit session for review: {e}");
        }

        Ok(HourCompletion::SessionCompleted {
            total_posts,
            total_symbols,
        })
    }

    /// Marks an active session `failed`, drops its in-memory state and tells
    /// the owner.
    pub(crate) async fn fail_session(
        &self,
        session: &training_session::Model,
        reason: FailureReason,
    ) -> Result<()> {
        let now = self.clock.now();
        session::finish_session(
            &self.db,
            session.id,
            SessionStatus::Failed,
            Some(reason.as_str()),
            now,
        )
        .await?;

        if self
            .tracker
            .get(&session.user_id)
            .is_some_and(|entry| entry.session_id == session.id)
        {
            self.forget_user(&session.user_id);
        }

        warn!(
            user_id = %session.user_id,
            session_id = session.id,
            hour = session.current_hour,
            reason = reason.as_str(),
            "Training session failed"
        );
        self.notify_owner(
            &session.channel_id,
            &session.user_id,
            &TrainingEvent::SessionFailed {
                session_id: session.id,
                user_id: session.user_id.clone(),
                hour: session.current_hour,
                reason,
            },
        )
        .await;
        Ok(())
    }

    fn forget_user(&self, user_id: &str) {
        self.timers.cancel_user(user_id);
        self.tracker.evict(user_id);
        self.warnings.clear_user(user_id);
    }

    /// Arms a timer whose expiry is handed to [`TrainingEngine::fire_timer`].
    pub(crate) fn arm_timer(self: &Arc<Self>, ticket: TimerTicket, due_at: DateTime<Utc>, delay: Duration) {
        let engine = Arc::clone(self);
        self.timers
            .schedule(ticket, due_at, delay, move |fired| engine.fire_timer(fired));
    }

    /// Dispatches an expired timer. Stale tickets (replaced, cancelled, or no
    /// longer matching the session's hour) are ignored.
    pub fn fire_timer(self: Arc<Self>, ticket: TimerTicket) -> TimerFuture {
        Box::pin(async move {
            self.with_user_lock(&ticket.user_id, || self.dispatch_timer(&ticket))
                .await;
        })
    }

    async fn dispatch_timer(self: &Arc<Self>, ticket: &TimerTicket) {
        if !self.timers.take_fired(ticket) {
            debug!(?ticket, "Ignoring timer that is no longer armed");
            return;
        }

        let result = match ticket.kind {
            TimerKind::Failure => self.on_failure_timer(ticket).await,
            TimerKind::Cooldown => self.on_cooldown_timer(ticket).await,
        };
        if let Err(e) = result {
            error!(
                user_id = %ticket.user_id,
                session_id = ticket.session_id,
                hour = ticket.hour,
                kind = ?ticket.kind,
                "Hour timer failed: {e}"
            );
        }
    }

    async fn current_session_for(
        &self,
        ticket: &TimerTicket,
    ) -> Result<Option<(training_session::Model, QuotaEntry)>> {
        let Some(entry) = self.tracker.get(&ticket.user_id) else {
            return Ok(None);
        };
        if entry.session_id != ticket.session_id {
            return Ok(None);
        }
        let Some(stored) = session::get_session_by_id(&self.db, ticket.session_id).await? else {
            return Ok(None);
        };
        if stored.status != SessionStatus::Active || stored.current_hour != ticket.hour {
            return Ok(None);
        }
        Ok(Some((stored, entry)))
    }

    async fn on_failure_timer(&self, ticket: &TimerTicket) -> Result<()> {
        let Some((stored, entry)) = self.current_session_for(ticket).await? else {
            debug!(?ticket, "Stale failure timer");
            return Ok(());
        };
        if entry.hour != ticket.hour || entry.in_cooldown {
            debug!(?ticket, "Failure timer fired after the hour was met");
            return Ok(());
        }
        self.fail_session(&stored, FailureReason::Timeout).await
    }

    async fn on_cooldown_timer(self: &Arc<Self>, ticket: &TimerTicket) -> Result<()> {
        let Some((_, entry)) = self.current_session_for(ticket).await? else {
            debug!(?ticket, "Stale cooldown timer");
            return Ok(());
        };
        if !entry.in_cooldown {
            debug!(?ticket, "Cooldown timer fired outside cooldown");
            return Ok(());
        }

        let boundary = hour_deadline(&entry, &self.rules);
        session::start_hour(&self.db, ticket.session_id, ticket.hour, boundary).await?;
        self.tracker.reset(&ticket.user_id, ticket.hour, boundary);

        let deadline = boundary + self.rules.hour_length();
        let now = self.clock.now();
        self.arm_timer(
            TimerTicket {
                kind: TimerKind::Failure,
                ..ticket.clone()
            },
            deadline,
            deadline - now,
        );

        info!(
            user_id = %ticket.user_id,
            session_id = ticket.session_id,
            hour = ticket.hour,
            %deadline,
            "Training hour started"
        );
        self.announce(
            &ticket.channel_id,
            &TrainingEvent::HourStarted {
                session_id: ticket.session_id,
                user_id: ticket.user_id.clone(),
                hour: ticket.hour,
                total_hours: entry.total_hours,
                deadline,
            },
        )
        .await;
        Ok(())
    }

    /// The user's active session with its live counters.
    pub async fn session_status(&self, user_id: &str) -> Result<Option<SessionView>> {
        let Some(stored) = session::get_active_session_for_user(&self.db, user_id).await? else {
            return Ok(None);
        };
        let entry = self
            .tracker
            .get(user_id)
            .filter(|entry| entry.session_id == stored.id);
        let progress = entry.as_ref().map(|e| self.tracker.progress_of(e));
        let deadline = entry.as_ref().map(|e| hour_deadline(e, &self.rules));
        Ok(Some(SessionView {
            session: stored,
            entry,
            progress,
            deadline,
        }))
    }

    /// Posts an event to a channel; delivery failures are logged.
    pub(crate) async fn announce(&self, channel_id: &str, event: &TrainingEvent) {
        if let Err(e) = self.notifier.send_channel(channel_id, event).await {
            error!(channel_id, "Failed to deliver training notification: {e}");
        }
    }

    /// Posts an event to the session channel and, best effort, to the owner
    /// directly.
    pub(crate) async fn notify_owner(&self, channel_id: &str, user_id: &str, event: &TrainingEvent) {
        self.announce(channel_id, event).await;
        if let Err(e) = self.notifier.send_direct(user_id, event).await {
            warn!(user_id, "Could not send direct message: {e}");
        }
    }
}

/// Writes the transition for an hour whose quota is met: the milestone and
/// the next hour, or on the final hour the completed session and its pending
/// review. Returns the session as stored afterwards.
pub(crate) async fn record_completion<C>(
    db: &C,
    entry: &QuotaEntry,
    now: DateTime<Utc>,
) -> Result<training_session::Model>
where
    C: ConnectionTrait,
{
    if entry.hour >= entry.total_hours {
        let completed =
            session::complete_session(db, entry.session_id, entry.hour, entry.posts, entry.symbols, now)
                .await?;
        review::open_review(db, entry.session_id, now).await?;
        return Ok(completed);
    }
    session::advance_hour(db, entry.session_id, entry.hour, entry.posts, entry.symbols, now).await
}
