//! General Discord commands - ping, help, and other utility commands.
//! This module contains simple commands that don't require database operations
//! and provide basic bot functionality and user assistance.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        errors::{Error, Result},
    };

    /// Responds with "Pong!" to test bot connectivity.
    ///
    /// This is a simple health check command that doesn't require any database operations.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands and training rules.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let rules = ctx.data().engine.rules();
        let help_text = format!(
            "**Training Bot Help**\n\n\
            **Characters**\n\
            • `/character create <name> [color]` - Registers a character.\n\
            • `/character list` - Lists your characters.\n\n\
            **Training**\n\
            • `/training start <character> <hours> <category>` - Starts a session in this channel.\n\
            • `/training status` - Shows your current hour and progress.\n\n\
            **Review** (moderators)\n\
            • `/training approve <session_id>` - Approves a completed session.\n\
            • `/training reject <session_id> <reason>` - Rejects a completed session.\n\n\
            **Rules**\n\
            Each hour needs {quota} symbols in at most {posts} posts of at least {min} symbols. \
            Meeting the quota early pauses you until the hour ends. Missing it fails the session. \
            After a session ends you can start another in {cooldown} h.",
            quota = rules.symbols_per_hour,
            posts = rules.max_posts_per_hour,
            min = rules.min_post_symbols,
            cooldown = rules.restart_cooldown_hours,
        );

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
