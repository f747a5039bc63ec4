//! Hour timers - the failure and cooldown deadlines of a training hour.
//!
//! Each armed timer is a plain value ([`TimerTicket`]) keyed by
//! `(user, session, hour)`. When the delay elapses the ticket is handed to a
//! dispatcher supplied at scheduling time, which re-reads current state before
//! acting; the timer itself never captures session state. Scheduling under a
//! key that already has a timer aborts the old one first.
//!
//! Delays are always explicit so recovery can re-arm a timer with whatever
//! time was left before the process stopped.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::future::Future;
use tokio::task::AbortHandle;
use tracing::debug;

/// Which deadline a timer enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Quota not met by the end of the hour: the session fails
    Failure,
    /// Quota met early: the next hour begins at the boundary
    Cooldown,
}

/// Identity of a timer slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Session owner
    pub user_id: String,
    /// Session the timer belongs to
    pub session_id: i64,
    /// Hour the timer acts on
    pub hour: i32,
}

/// An armed timer, passed to the dispatcher when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTicket {
    /// Failure or cooldown
    pub kind: TimerKind,
    /// Session owner
    pub user_id: String,
    /// Session the timer belongs to
    pub session_id: i64,
    /// For failure timers the hour that fails; for cooldown timers the hour
    /// that begins when it fires
    pub hour: i32,
    /// Channel notifications go to
    pub channel_id: String,
}

impl TimerTicket {
    /// Slot this ticket occupies.
    #[must_use]
    pub fn key(&self) -> TimerKey {
        TimerKey {
            user_id: self.user_id.clone(),
            session_id: self.session_id,
            hour: self.hour,
        }
    }
}

#[derive(Debug)]
struct ScheduledTimer {
    ticket: TimerTicket,
    due_at: DateTime<Utc>,
    handle: AbortHandle,
}

/// Outstanding hour timers of every user.
#[derive(Debug, Default)]
pub struct HourTimers {
    timers: DashMap<TimerKey, ScheduledTimer>,
}

impl HourTimers {
    /// Creates an empty timer set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `ticket` to fire after `delay`, replacing any timer in the same
    /// slot. `due_at` is recorded for inspection only.
    ///
    /// When the delay elapses `fire` is called with the ticket on a fresh
    /// task, so aborting this timer from inside the dispatcher cannot cut the
    /// dispatcher short.
    pub fn schedule<F, Fut>(
        &self,
        ticket: TimerTicket,
        due_at: DateTime<Utc>,
        delay: chrono::Duration,
        fire: F,
    ) where
        F: FnOnce(TimerTicket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = ticket.key();
        self.cancel(&key);

        let sleep_for = delay.to_std().unwrap_or_default();
        let fired = ticket.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(sleep_for).await;
            tokio::spawn(fire(fired));
        });

        debug!(
            user_id = %ticket.user_id,
            session_id = ticket.session_id,
            hour = ticket.hour,
            kind = ?ticket.kind,
            %due_at,
            "Armed hour timer"
        );
        self.timers.insert(
            key,
            ScheduledTimer {
                ticket,
                due_at,
                handle: handle.abort_handle(),
            },
        );
    }

    /// Aborts the timer in `key`'s slot. Returns whether one was armed.
    pub fn cancel(&self, key: &TimerKey) -> bool {
        self.timers.remove(key).is_some_and(|(_, timer)| {
            timer.handle.abort();
            true
        })
    }

    /// Aborts every timer belonging to `user_id` and returns how many there
    /// were.
    pub fn cancel_user(&self, user_id: &str) -> usize {
        let keys: Vec<TimerKey> = self
            .timers
            .iter()
            .filter(|entry| entry.key().user_id == user_id)
            .map(|entry| entry.key().clone())
            .collect();
        keys.iter().filter(|key| self.cancel(key)).count()
    }

    /// Forgets a timer that has fired, leaving any newer timer that has
    /// since replaced it in the same slot untouched. Returns whether the
    /// ticket was still the armed one.
    pub fn take_fired(&self, ticket: &TimerTicket) -> bool {
        self.timers
            .remove_if(&ticket.key(), |_, timer| timer.ticket == *ticket)
            .is_some()
    }

    /// Timers armed for `user_id` with their due times.
    #[must_use]
    pub fn pending(&self, user_id: &str) -> Vec<(TimerTicket, DateTime<Utc>)> {
        self.timers
            .iter()
            .filter(|entry| entry.key().user_id == user_id)
            .map(|entry| (entry.value().ticket.clone(), entry.value().due_at))
            .collect()
    }

    /// Number of armed timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// True when no timer is armed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
