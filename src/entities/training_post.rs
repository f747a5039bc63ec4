//! Training post entity - One accepted chat message counted toward an hour.
//!
//! Posts are append-only: they are inserted when accepted and never updated
//! or deleted, so the per-hour counters can always be rebuilt from them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Training post database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "training_posts")]
pub struct Model {
    /// Unique identifier for the post
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Session this post belongs to
    pub session_id: i64,
    /// Hour of the session the post was written in
    pub hour: i32,
    /// 1-based position within the hour
    pub sequence: i32,
    /// Discord message ID of the original message
    pub message_id: String,
    /// Raw message text
    pub content: String,
    /// Non-whitespace character count
    pub symbols: i64,
    /// When the post was accepted
    pub created_at: DateTimeUtc,
}

/// Defines relationships between `TrainingPost` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each post belongs to one session
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
