//! Training review entity - The single reviewer decision for a completed session.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a review
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum ReviewOutcome {
    /// No decision yet
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Reviewer accepted the session
    #[sea_orm(string_value = "approved")]
    Approved,
    /// Reviewer turned the session down
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        })
    }
}

/// Training review database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "training_reviews")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Session under review
    #[sea_orm(unique)]
    pub session_id: i64,
    /// Discord message ID of the summary posted to the review channel
    pub review_message_id: Option<String>,
    /// Current outcome
    pub outcome: ReviewOutcome,
    /// Discord user ID of the reviewer who decided
    pub reviewer_id: Option<String>,
    /// Reason given when rejecting
    pub reason: Option<String>,
    /// When the review was opened
    pub created_at: DateTimeUtc,
    /// When the decision was recorded
    pub decided_at: Option<DateTimeUtc>,
}

/// Defines relationships between `TrainingReview` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each review belongs to one session
    #[sea_orm(
        belongs_to = "super::training_session::Entity",
        from = "Column::SessionId",
        to = "super::training_session::Column::Id"
    )]
    Session,
}

impl Related<super::training_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
