use anyhow::{Context, Result};
use sqlx::MySqlPool;
use tracing::info;

/// Connects and applies the embedded migrations under `migrations/`.
pub async fn init_db(database_url: &str) -> Result<MySqlPool> {
    let pool = MySqlPool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    info!("Database ready");
    Ok(pool)
}
