//! Database migration command.
//!
//! ```bash
//! ol-cli migrate
//! ```
//!
//! Applies `crates/engine/migrations/` to `ORDERLINE_DATABASE_URL`.

use orderline_engine::EngineConfig;
use orderline_engine::db::{self, MIGRATOR};

/// Apply pending migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the connection fails or
/// a migration fails.
pub async fn run(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let database_url = config.require_database_url()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(database_url, 1).await?;

    tracing::info!(available = MIGRATOR.iter().count(), "Running migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
