//! Gateway event handler.
//!
//! Every guild message from a human is offered to the training engine. The
//! engine ignores messages from users without an active session in that
//! channel, so no filtering beyond bots and DMs happens here.

use crate::{
    bot::BotData,
    core::ingest::InboundPost,
    errors::{Error, Result},
};
use poise::serenity_prelude as serenity;
use tracing::{error, trace};

/// Handles gateway events that are not commands.
pub async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, BotData, Error>,
    data: &BotData,
) -> Result<()> {
    if let serenity::FullEvent::Message { new_message } = event {
        if new_message.author.bot || new_message.guild_id.is_none() {
            return Ok(());
        }

        let post = InboundPost {
            user_id: new_message.author.id.to_string(),
            channel_id: new_message.channel_id.to_string(),
            message_id: new_message.id.to_string(),
            content: new_message.content.clone(),
        };
        match data.engine.handle_post(post).await {
            Ok(outcome) => trace!(message_id = %new_message.id, ?outcome, "Message ingested"),
            Err(e) => error!(message_id = %new_message.id, "Failed to ingest training post: {e}"),
        }
    }
    Ok(())
}
