//! Database configuration module.
//!
//! This module handles `SQLite` connection setup and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so column-level UNIQUE constraints (slugs, resolver identity keys) come straight from
//! the models. The one constraint the entity macros cannot express, "one pending edit per
//! venue and user", is added as a partial unique index afterwards.

use crate::entities::{Artist, PendingVenueEdit, Show, ShowArtist, ShowVenue, Venue};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/showlist.sqlite?mode=rwc";

const PENDING_EDIT_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_one_pending_edit_per_user \
     ON pending_venue_edits(venue_id, proposed_by) WHERE status = 'pending'";

/// Gets the database URL from the `DATABASE_URL` environment variable or the default path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by [`get_database_url`].
pub async fn create_connection() -> Result<DatabaseConnection> {
    connect(&get_database_url()).await
}

/// File behind a `sqlite:` URL; `None` for in-memory databases and other backends.
fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Connects to an explicit database URL, creating the parent directory of a `SQLite`
/// file first.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(parent) = sqlite_file_path(database_url)
        .as_deref()
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(parent)?;
    }
    debug!("Connecting to database at {}", database_url);
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates all catalog tables and indexes if they do not exist yet.
///
/// Tables are created parents first so the foreign keys emitted for the join tables
/// and the pending edit table resolve.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut statements = vec![
        schema.create_table_from_entity(Venue),
        schema.create_table_from_entity(Artist),
        schema.create_table_from_entity(Show),
        schema.create_table_from_entity(ShowVenue),
        schema.create_table_from_entity(ShowArtist),
        schema.create_table_from_entity(PendingVenueEdit),
    ];

    for statement in &mut statements {
        statement.if_not_exists();
        db.execute(builder.build(statement)).await?;
    }

    db.execute_unprepared(PENDING_EDIT_INDEX).await?;

    info!("Database tables ensured");
    Ok(())
}
