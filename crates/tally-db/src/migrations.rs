//! Embedded schema migrations.
//!
//! Files live in the workspace `migrations/sqlite/` directory as
//! `NNN_description.sql` and are compiled into the binary. Applied files are
//! tracked in `_sqlx_migrations`; edit history by adding a file, never by
//! changing one.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every migration not yet recorded, in order.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(count = MIGRATOR.migrations.len(), "Schema up to date");
    Ok(())
}
