use dotenvy::dotenv;
use poise::serenity_prelude as serenity;
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use training_bot::{
    bot::{self, BotData, notifier::DiscordNotifier},
    config::{database, settings},
    core::TrainingEngine,
    errors::{Error, Result},
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Settings
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;
    info!("Loaded settings: {:?}", settings);

    // 4. Database
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Engine, with state rebuilt from the database before Discord is up
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;
    let http = Arc::new(serenity::Http::new(&token));
    let notifier = Arc::new(DiscordNotifier::new(
        Arc::clone(&http),
        settings.review.channel_id,
    ));
    let engine = Arc::new(TrainingEngine::new(
        db.clone(),
        settings.training.clone(),
        notifier,
    ));
    let plan = engine.reconstruct_state().await?;

    // 6. Run the bot; recovered timers are armed once it is ready
    bot::run_bot(&token, http, BotData::new(db, engine), plan).await
}
