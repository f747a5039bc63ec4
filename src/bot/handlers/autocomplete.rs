//! Autocomplete handlers for Discord slash command parameters.
//!
//! Suggests the invoking user's own characters, so a session can only ever be
//! started for a character the user owns.

use crate::{bot::BotData, core::character, errors::Error};

/// Provides autocomplete suggestions for the author's character names.
///
/// # Arguments
/// * `ctx` - The poise context containing the database connection
/// * `partial` - The partial string the user has typed so far
///
/// # Returns
/// Up to 25 of the author's character names containing the partial input
pub async fn autocomplete_character_name(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<String> {
    let db = &ctx.data().database;
    let user_id = ctx.author().id.to_string();

    let Ok(characters) = character::get_characters_for_user(db, &user_id).await else {
        return Vec::new();
    };

    filter_names(characters.into_iter().map(|c| c.name), partial)
}

/// Case-insensitive substring filter, capped at Discord's 25 choices.
fn filter_names(names: impl Iterator<Item = String>, partial: &str) -> Vec<String> {
    let partial_lower = partial.to_lowercase();
    names
        .filter(|name| name.to_lowercase().contains(&partial_lower))
        .take(25) // Discord autocomplete limit
        .collect()
}
