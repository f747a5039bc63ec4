//! Training Discord commands - starting sessions, checking progress and
//! reviewing completed sessions.
//!
//! Rule violations (an active session, restart cooldown, a decided review...)
//! come back from the engine as errors and are turned into replies by the
//! framework's error handler.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{BotData, handlers::autocomplete, render::render_status},
        core::{character, engine::StartRequest},
        entities::TrainingCategory,
        errors::{Error, Result},
    };

    /// Training categories offered as slash command choices.
    #[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
    pub enum CategoryChoice {
        #[name = "Stats"]
        Stats,
        #[name = "Abilities"]
        Abilities,
        #[name = "Willpower"]
        Willpower,
        #[name = "Martial arts"]
        MartialArts,
    }

    impl From<CategoryChoice> for TrainingCategory {
        fn from(choice: CategoryChoice) -> Self {
            match choice {
                CategoryChoice::Stats => Self::Stats,
                CategoryChoice::Abilities => Self::Abilities,
                CategoryChoice::Willpower => Self::Willpower,
                CategoryChoice::MartialArts => Self::MartialArts,
            }
        }
    }

    /// Parent command for training sessions.
    #[poise::command(
        slash_command,
        subcommands(
            "training_start",
            "training_status",
            "training_approve",
            "training_reject"
        )
    )]
    pub async fn training(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "Training command. Available subcommands:\n\
            `/training start` - Start a session in this channel\n\
            `/training status` - Show your progress\n\
            `/training approve` - Approve a completed session (moderators)\n\
            `/training reject` - Reject a completed session (moderators)";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Starts a training session in the current channel.
    #[poise::command(slash_command, guild_only, rename = "start")]
    pub async fn training_start(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Character to train"]
        #[autocomplete = "autocomplete::autocomplete_character_name"]
        character_name: String,
        #[description = "Number of hours"] hours: i32,
        #[description = "What to train"] category: CategoryChoice,
    ) -> Result<()> {
        let Some(guild_id) = ctx.guild_id() else {
            ctx.say("❌ Training can only be started in a server channel.")
                .await?;
            return Ok(());
        };

        let data = ctx.data();
        let user_id = ctx.author().id.to_string();
        let Some(owned) =
            character::get_character_by_name(&data.database, &user_id, &character_name).await?
        else {
            return Err(Error::CharacterNotFound { id: character_name });
        };

        let session = data
            .engine
            .start_session(StartRequest {
                user_id,
                character_id: owned.id,
                guild_id: guild_id.to_string(),
                channel_id: ctx.channel_id().to_string(),
                total_hours: hours,
                category: category.into(),
            })
            .await?;

        ctx.send(
            poise::CreateReply::default()
                .content(format!(
                    "✅ Session #{} started. Write your posts in this channel.",
                    session.id
                ))
                .ephemeral(true),
        )
        .await?;
        Ok(())
    }

    /// Shows your active session and this hour's progress.
    #[poise::command(slash_command, rename = "status")]
    pub async fn training_status(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let data = ctx.data();
        let user_id = ctx.author().id.to_string();

        let reply = match data.engine.session_status(&user_id).await? {
            Some(view) => render_status(&view, data.engine.rules().symbols_per_hour)?,
            None => "You have no active training session.".to_string(),
        };
        ctx.send(poise::CreateReply::default().content(reply).ephemeral(true))
            .await?;
        Ok(())
    }

    /// Approves a completed training session.
    #[poise::command(slash_command, rename = "approve", required_permissions = "MANAGE_GUILD")]
    pub async fn training_approve(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Session number"] session_id: i64,
    ) -> Result<()> {
        let reviewer_id = ctx.author().id.to_string();
        ctx.data().engine.approve(session_id, &reviewer_id).await?;
        ctx.say(format!("✅ Session #{session_id} approved.")).await?;
        Ok(())
    }

    /// Rejects a completed training session.
    #[poise::command(slash_command, rename = "reject", required_permissions = "MANAGE_GUILD")]
    pub async fn training_reject(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Session number"] session_id: i64,
        #[description = "Why the session is rejected"] reason: String,
    ) -> Result<()> {
        let reviewer_id = ctx.author().id.to_string();
        ctx.data()
            .engine
            .reject(session_id, &reviewer_id, &reason)
            .await?;
        ctx.say(format!("📝 Session #{session_id} rejected.")).await?;
        Ok(())
    }
}

pub use inner::*;
