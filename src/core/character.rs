//! Character lookups - the identity a training session is run for.
//!
//! The training engine only reads characters; creating them is exposed to the
//! bot so users can register a character before training it.

use crate::{
    entities::{Character, character},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};

/// Creates a character for `user_id`.
///
/// The name is trimmed and must not be empty or already used by the same
/// user.
pub async fn create_character(
    db: &DatabaseConnection,
    user_id: &str,
    name: &str,
    color: Option<i32>,
    now: DateTime<Utc>,
) -> Result<character::Model> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Config {
            message: "Character name cannot be empty".to_string(),
        });
    }

    if get_character_by_name(db, user_id, name).await?.is_some() {
        return Err(Error::Config {
            message: format!("You already have a character named '{name}'"),
        });
    }

    let model = character::ActiveModel {
        user_id: Set(user_id.to_string()),
        name: Set(name.to_string()),
        color: Set(color),
        created_at: Set(now),
        ..Default::default()
    };
    model.insert(db).await.map_err(Into::into)
}

/// Finds a character by id.
pub async fn get_character_by_id<C>(db: &C, character_id: i64) -> Result<Option<character::Model>>
where
    C: ConnectionTrait,
{
    Character::find_by_id(character_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a character by name among the user's characters.
pub async fn get_character_by_name(
    db: &DatabaseConnection,
    user_id: &str,
    name: &str,
) -> Result<Option<character::Model>> {
    Character::find()
        .filter(character::Column::UserId.eq(user_id))
        .filter(character::Column::Name.eq(name))
        .one(db)
        .await
        .map_err(Into::into)
}

/// The user's characters, alphabetically.
pub async fn get_characters_for_user(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Vec<character::Model>> {
    Character::find()
        .filter(character::Column::UserId.eq(user_id))
        .order_by_asc(character::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds a character that belongs to `user_id`, failing with
/// [`Error::CharacterNotFound`] otherwise.
pub async fn require_owned_character(
    db: &DatabaseConnection,
    user_id: &str,
    character_id: i64,
) -> Result<character::Model> {
    get_character_by_id(db, character_id)
        .await?
        .filter(|c| c.user_id == user_id)
        .ok_or_else(|| Error::CharacterNotFound {
            id: character_id.to_string(),
        })
}
