//! PostgreSQL connection pooling.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Build the shared connection pool.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
}
