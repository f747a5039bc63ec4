//! Character Discord commands - registering and listing characters.

/// Parses a `#RRGGBB` or `RRGGBB` colour.
#[must_use]
pub fn parse_color(raw: &str) -> Option<i32> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    i32::from_str_radix(hex, 16).ok()
}

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use super::parse_color;
    use crate::{
        bot::{BotData, render::DEFAULT_COLOR},
        core::character,
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;

    /// Parent command for managing your characters.
    #[poise::command(slash_command, subcommands("character_create", "character_list"))]
    pub async fn character(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "Character command. Available subcommands:\n\
            `/character create` - Register a character\n\
            `/character list` - List your characters";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Registers a new character you can train.
    #[poise::command(slash_command, rename = "create")]
    pub async fn character_create(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Character name"] name: String,
        #[description = "Embed colour as hex, e.g. #FF8800"] color: Option<String>,
    ) -> Result<()> {
        let color = match color.as_deref().map(parse_color) {
            Some(None) => {
                ctx.say("❌ Colour must be a hex value like `#FF8800`.").await?;
                return Ok(());
            }
            Some(parsed) => parsed,
            None => None,
        };

        let db = &ctx.data().database;
        let user_id = ctx.author().id.to_string();
        match character::create_character(db, &user_id, &name, color, chrono::Utc::now()).await {
            Ok(created) => {
                ctx.say(format!("✅ Character **{}** registered.", created.name))
                    .await?;
            }
            Err(Error::Config { message }) => {
                ctx.say(format!("❌ {message}")).await?;
            }
            Err(e) => {
                tracing::error!("Failed to create character: {e}");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Lists your characters.
    #[poise::command(slash_command, rename = "list")]
    pub async fn character_list(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let db = &ctx.data().database;
        let user_id = ctx.author().id.to_string();
        let characters = character::get_characters_for_user(db, &user_id).await?;

        if characters.is_empty() {
            ctx.say("You have no characters yet. Use `/character create` to add one!")
                .await?;
            return Ok(());
        }

        let names: Vec<String> = characters
            .iter()
            .map(|c| format!("• {} (#{})", c.name, c.id))
            .collect();
        let embed = serenity::CreateEmbed::default()
            .title("**Your Characters**")
            .color(DEFAULT_COLOR)
            .description(names.join("\n"));

        ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        Ok(())
    }
}

pub use inner::*;
