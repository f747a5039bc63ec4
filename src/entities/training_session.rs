//! Training session entity - One multi-hour writing regimen for a character.
//!
//! A session is `active` while the user is working through its hours and ends
//! as `completed` (awaiting review) or `failed`. A completed session is then
//! `approved` or `rejected` by a reviewer. `hour_started_at` is the start of
//! the current hour's deadline clock and only moves at hour transitions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a training session
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum SessionStatus {
    /// Hours are still being worked through
    #[sea_orm(string_value = "active")]
    Active,
    /// All hours met their quota; waiting for review
    #[sea_orm(string_value = "completed")]
    Completed,
    /// An hour's deadline passed without meeting quota
    #[sea_orm(string_value = "failed")]
    Failed,
    /// A reviewer accepted the completed session
    #[sea_orm(string_value = "approved")]
    Approved,
    /// A reviewer turned the completed session down
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl SessionStatus {
    /// Whether the session can no longer change hours.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Lowercase name used in logs and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the session trains
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum TrainingCategory {
    /// Physical stats
    #[sea_orm(string_value = "stats")]
    Stats,
    /// Special abilities
    #[sea_orm(string_value = "abilities")]
    Abilities,
    /// Willpower
    #[sea_orm(string_value = "willpower")]
    Willpower,
    /// Martial arts
    #[sea_orm(string_value = "martial_arts")]
    MartialArts,
}

impl TrainingCategory {
    /// Human readable label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Stats => "Stats",
            Self::Abilities => "Abilities",
            Self::Willpower => "Willpower",
            Self::MartialArts => "Martial arts",
        }
    }
}

impl fmt::Display for TrainingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Training session database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "training_sessions")]
pub struct Model {
    /// Unique identifier for the session
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Discord user ID of the trainee
    pub user_id: String,
    /// Character being trained
    pub character_id: i64,
    /// Discord guild the session runs in
    pub guild_id: String,
    /// Discord channel posts are written in
    pub channel_id: String,
    /// Number of hours requested (1-10)
    pub total_hours: i32,
    /// What is being trained
    pub category: TrainingCategory,
    /// Current hour, 1-based, never above `total_hours`
    pub current_hour: i32,
    /// Lifecycle status
    pub status: SessionStatus,
    /// When the current hour's deadline clock started
    pub hour_started_at: DateTimeUtc,
    /// When the session was created
    pub created_at: DateTimeUtc,
    /// When the session left `active` (completion or failure)
    pub finished_at: Option<DateTimeUtc>,
    /// Why the session failed, if it did
    pub failure_reason: Option<String>,
}

/// Defines relationships between `TrainingSession` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each session trains one character
    #[sea_orm(
        belongs_to = "super::character::Entity",
        from = "Column::CharacterId",
        to = "super::character::Column::Id"
    )]
    Character,
    /// One session has many posts
    #[sea_orm(has_many = "super::training_post::Entity")]
    Posts,
    /// One session has many completed hours
    #[sea_orm(has_many = "super::training_hour::Entity")]
    Hours,
}

impl Related<super::character::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Character.def()
    }
}

impl Related<super::training_post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Posts.def()
    }
}

impl Related<super::training_hour::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Hours.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
