/// Database connection and table creation
pub mod database;

/// Training rules and review channel from config.toml
pub mod settings;

pub use settings::{ReviewSettings, Settings, TrainingRules};
