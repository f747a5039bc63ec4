//! Wall-clock source for the training engine.
//!
//! Hour deadlines are wall-clock instants persisted in the database, so the
//! engine reads time through this trait instead of calling `Utc::now()`
//! directly. Tests swap in a manual clock to step through an hour.

use chrono::{DateTime, Utc};
use std::fmt;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
