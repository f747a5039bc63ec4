//! Database configuration module.
//!
//! This module handles the `SQLite` connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust
//! structs without hand-written SQL.

use crate::entities::{
    Character, TrainingHour, TrainingPost, TrainingReview, TrainingSession, training_hour,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema, sea_query::Index};
use std::path::{Path, PathBuf};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/training_bot.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable or
/// returns the default local `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Directory holding the `SQLite` file a URL points at. `None` for in-memory
/// databases, bare file names and other backends.
#[must_use]
pub fn sqlite_directory(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// Establishes a connection to the database named by [`get_database_url`],
/// creating the directory of a `SQLite` file first.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    if let Some(dir) = sqlite_directory(&database_url) {
        std::fs::create_dir_all(&dir)?;
    }
    tracing::debug!("Connecting to database at {database_url}");
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all tables that do not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut character_table = schema.create_table_from_entity(Character);
    let mut session_table = schema.create_table_from_entity(TrainingSession);
    let mut post_table = schema.create_table_from_entity(TrainingPost);
    let mut hour_table = schema.create_table_from_entity(TrainingHour);
    let mut review_table = schema.create_table_from_entity(TrainingReview);

    for table in [
        &mut character_table,
        &mut session_table,
        &mut post_table,
        &mut hour_table,
        &mut review_table,
    ] {
        table.if_not_exists();
        db.execute(builder.build(&*table)).await?;
    }

    // An hour can be completed only once
    let milestone_index = Index::create()
        .name("idx_training_hours_session_hour")
        .table(TrainingHour)
        .col(training_hour::Column::SessionId)
        .col(training_hour::Column::Hour)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&milestone_index)).await?;

    Ok(())
}
