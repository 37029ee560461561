//! CLI command implementations.

pub mod checkout;
pub mod demo;
pub mod migrate;
pub mod order;
pub mod seed;

use orderline_engine::EngineConfig;
use orderline_engine::db::{self, PgStore};

/// Connect to the configured database.
async fn connect(config: &EngineConfig) -> Result<PgStore, Box<dyn std::error::Error>> {
    let database_url = config.require_database_url()?;
    let pool = db::create_pool(database_url, config.max_connections).await?;
    tracing::debug!("Database pool created");
    Ok(PgStore::new(pool))
}

/// Print a value as pretty JSON on stdout.
fn print_json<T: serde::Serialize>(value: &T) -> Result<(), serde_json::Error> {
    let json = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{json}");
    }
    Ok(())
}
