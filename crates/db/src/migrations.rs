use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of known up-migrations that have not been applied to `pool` yet.
pub async fn pending_count(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    let applied: i64 = if tracked == 0 {
        0
    } else {
        sqlx::query_scalar("SELECT COUNT(1) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?
    };

    let known = MIGRATOR.iter().filter(|m| m.migration_type.is_up_migration()).count();
    Ok(known.saturating_sub(usize::try_from(applied).unwrap_or(0)))
}
