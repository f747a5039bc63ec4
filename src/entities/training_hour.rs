//! Training hour entity - Milestone recorded when an hour's quota is met.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Completed hour database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "training_hours")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Session the hour belongs to
    pub session_id: i64,
    /// Hour number, 1-based
    pub hour: i32,
    /// Posts accepted in the hour
    pub posts: i32,
    /// Symbols accepted in the hour
    pub symbols: i64,
    /// When the quota was met
    pub completed_at: DateTimeUtc,
}

/// Defines relationships between `TrainingHour` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each hour belongs to one session
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
