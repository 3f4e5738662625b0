//! Database connection and pool management.
//!
//! Builds the SeaORM pool (Postgres in production, SQLite for tests and local runs) and
//! applies the schema migrations.

use anyhow::{Context, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppConfig;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("Database connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

const MAX_CONNECT_ATTEMPTS: u32 = 5;

/// Initializes a database connection pool, retrying transient connection failures with
/// exponential backoff.
///
/// ```no_run
/// use attendance::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::default();
///     let db = init_pool(&config).await?;
///     attendance::db::run_migrations(&db).await?;
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "Database URL cannot be empty".to_string(),
        }
        .into());
    }

    let mut opt = ConnectOptions::new(&cfg.database_url);
    // An in-memory SQLite database exists per connection.
    let max_connections = if cfg.database_url.starts_with("sqlite::memory:") {
        1
    } else {
        cfg.db_max_connections
    };
    opt.max_connections(max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let mut retry_delay = Duration::from_millis(100);

    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                tracing::info!(attempt, "Connected to database");
                return Ok(conn);
            }
            Err(e) => {
                if attempt == MAX_CONNECT_ATTEMPTS {
                    tracing::error!(
                        attempts = MAX_CONNECT_ATTEMPTS,
                        error = %e,
                        "Failed to connect to database"
                    );
                    return Err(DatabaseError::ConnectionFailed { source: e }.into());
                }

                tracing::warn!(
                    attempt,
                    error = %e,
                    retry_in_ms = retry_delay.as_millis() as u64,
                    "Database connection attempt failed"
                );

                sleep(retry_delay).await;
                retry_delay *= 2;
            }
        }
    }

    Err(DatabaseError::ConnectionTimeout {
        timeout_ms: cfg.db_acquire_timeout_ms,
    }
    .into())
}

/// Applies all pending schema migrations.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .context("Failed to apply database migrations")?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Verifies that the connection is alive by running `SELECT 1`.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());

    db.query_one(stmt)
        .await
        .context("Database health check failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_database_url_is_rejected() {
        let config = AppConfig {
            database_url: String::new(),
            ..AppConfig::default()
        };

        let result = init_pool(&config).await;

        assert!(matches!(
            result.unwrap_err().downcast::<DatabaseError>(),
            Ok(DatabaseError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn in_memory_database_migrates_and_answers_health_checks() {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            ..AppConfig::default()
        };

        let db = init_pool(&config).await.unwrap();
        run_migrations(&db).await.unwrap();
        health_check(&db).await.unwrap();
    }
}
