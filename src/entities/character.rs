//! Character entity - A roleplay character owned by a Discord user.
//!
//! Characters are the identity a training session is run for. The training
//! engine only reads them (name and colour for summaries).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Character database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "characters")]
pub struct Model {
    /// Unique identifier for the character
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Discord user ID of the owner
    pub user_id: String,
    /// Display name of the character
    pub name: String,
    /// Embed colour as 0xRRGGBB
    pub color: Option<i32>,
    /// When the character was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Character and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One character has many training sessions
    #[sea_orm(has_many = "super::training_session::Entity")]
    TrainingSessions,
}

impl Related<super::training_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TrainingSessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
