//! Bot layer - Discord-specific interface and command handlers
//!
//! This module provides the Discord interface for the training bot: slash
//! commands, the message handler that feeds the training engine, rendering of
//! engine events, and the poise framework setup.

/// Discord command implementations (character, training, general)
pub mod commands;
/// Discord interaction handlers (autocomplete, gateway events)
pub mod handlers;
/// Discord delivery of training events
pub mod notifier;
/// Text rendering of training events
pub mod render;

use crate::{
    core::{engine::TrainingEngine, recovery::RecoveryPlan},
    errors::{Error, Result},
};
use notifier::SerenityResolver;
use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::{error, info};

/// Shared data available to all bot commands.
/// This structure holds the database connection and the training engine
/// that commands and the message handler work through.
pub struct BotData {
    /// Database connection for all database operations
    pub database: DatabaseConnection,
    /// The training engine
    pub engine: Arc<TrainingEngine>,
}

impl BotData {
    /// Creates a new `BotData` instance.
    #[must_use]
    pub const fn new(database: DatabaseConnection, engine: Arc<TrainingEngine>) -> Self {
        Self { database, engine }
    }
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            let reply = if error.is_user_error() {
                format!("❌ {error}")
            } else {
                error!("Error in command `{}`: {:?}", ctx.command().name, error);
                "❌ Something went wrong while running that command.".to_string()
            };
            if let Err(e) = ctx
                .send(poise::CreateReply::default().content(reply).ephemeral(true))
                .await
            {
                error!("Failed to send error message: {}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Runs the Discord client until it stops.
///
/// Once the gateway is ready the recovery plan's timers are armed, since
/// recovered announcements need channels that resolve.
pub async fn run_bot(
    token: &str,
    http: Arc<serenity::Http>,
    data: BotData,
    plan: RecoveryPlan,
) -> Result<()> {
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::ping(),
                commands::help(),
                commands::character(),
                commands::training(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(handlers::events::event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let resolver = SerenityResolver::new(http);
                data.engine.arm_pending_timers(plan, &resolver).await;
                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .inspect_err(|e| error!("Error creating client: {:?}", e))?;

    info!("Starting bot client...");
    client.start().await.map_err(Error::from)
}
