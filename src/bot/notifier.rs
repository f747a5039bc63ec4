//! Discord delivery of training events.

use crate::{
    bot::render::{render_event, review_embed},
    core::{
        notify::{ChannelResolver, TrainingEvent, TrainingNotifier},
        review::ReviewSummary,
    },
    errors::{Error, Result},
};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{debug, warn};

fn parse_id(kind: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| Error::Config {
            message: format!("Invalid Discord {kind} id '{raw}'"),
        })
}

/// Sends training events through the Discord HTTP API.
#[derive(Clone)]
pub struct DiscordNotifier {
    http: Arc<serenity::Http>,
    review_channel: Option<serenity::ChannelId>,
}

impl DiscordNotifier {
    /// Creates a notifier. Without a review channel, completed sessions are
    /// only announced in their own channel.
    #[must_use]
    pub fn new(http: Arc<serenity::Http>, review_channel_id: Option<u64>) -> Self {
        Self {
            http,
            review_channel: review_channel_id
                .filter(|id| *id != 0)
                .map(serenity::ChannelId::new),
        }
    }
}

#[async_trait]
impl TrainingNotifier for DiscordNotifier {
    async fn send_channel(&self, channel_id: &str, event: &TrainingEvent) -> Result<()> {
        let channel = serenity::ChannelId::new(parse_id("channel", channel_id)?);
        channel.say(self.http.as_ref(), render_event(event)).await?;
        Ok(())
    }

    async fn send_direct(&self, user_id: &str, event: &TrainingEvent) -> Result<()> {
        let user = serenity::UserId::new(parse_id("user", user_id)?);
        user.direct_message(
            self.http.as_ref(),
            serenity::CreateMessage::new().content(render_event(event)),
        )
        .await?;
        Ok(())
    }

    async fn submit_review(&self, summary: &ReviewSummary) -> Result<Option<String>> {
        let Some(channel) = self.review_channel else {
            warn!(
                session_id = summary.session_id,
                "No review channel configured; session awaits review by id"
            );
            return Ok(None);
        };

        let message = channel
            .send_message(
                self.http.as_ref(),
                serenity::CreateMessage::new().embed(review_embed(summary)?),
            )
            .await?;
        debug!(session_id = summary.session_id, message_id = %message.id, "Posted review summary");
        Ok(Some(message.id.to_string()))
    }
}

/// Resolves channels through the Discord HTTP API.
#[derive(Clone)]
pub struct SerenityResolver {
    http: Arc<serenity::Http>,
}

impl SerenityResolver {
    /// Creates a resolver.
    #[must_use]
    pub const fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelResolver for SerenityResolver {
    async fn resolve_channel(&self, channel_id: &str) -> bool {
        let Ok(id) = parse_id("channel", channel_id) else {
            return false;
        };
        serenity::ChannelId::new(id)
            .to_channel(self.http.as_ref())
            .await
            .is_ok()
    }
}
