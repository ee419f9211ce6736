//! PostgreSQL backend for `streamstore`.
//!
//! Commits are stored one row per commit in `streamstore_commits`, with the
//! events as a JSONB array. The optimistic concurrency check is enforced by the
//! database itself through unique constraints on `(stream_id, commit_sequence)`
//! and `(stream_id, start_revision)`, so it holds across connections and
//! processes, not just within one pool.

mod config;
mod persistence;

use std::num::NonZeroU32;

use sqlx::{postgres::PgPoolOptions, query, Pool, Postgres};
use thiserror::Error;
use tracing::{error, info, instrument};

pub use config::{
    MaxConnections, PostgresConfig, ACQUIRE_TIMEOUT_VAR, IDLE_TIMEOUT_VAR, MAX_CONNECTIONS_VAR,
};

/// Errors raised while setting up the backend. Errors of individual store
/// operations are reported as `streamstore::EventStoreError`.
#[derive(Debug, Error)]
pub enum PostgresPersistenceError {
    /// The connection pool could not be created.
    #[error("failed to create postgres connection pool")]
    ConnectionFailed(#[source] sqlx::Error),

    /// The embedded migrations could not be applied.
    #[error("failed to apply postgres migrations")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// The database did not answer a trivial query.
    #[error("postgres ping failed")]
    PingFailed(#[source] sqlx::Error),

    /// A configuration variable held an unusable value.
    #[error("invalid value {value:?} for {variable}")]
    InvalidConfig {
        /// The environment variable
        variable: &'static str,
        /// The rejected value
        value: String,
    },
}

/// Commit persistence backed by a PostgreSQL connection pool.
///
/// Cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct PostgresPersistence {
    pool: Pool<Postgres>,
}

impl PostgresPersistence {
    /// Connects with the default configuration.
    pub async fn new<S: Into<String>>(
        connection_string: S,
    ) -> Result<Self, PostgresPersistenceError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Connects with a custom configuration.
    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresPersistenceError> {
        let connection_string = connection_string.into();
        let pool = pool_options(&config)
            .connect(&connection_string)
            .await
            .map_err(PostgresPersistenceError::ConnectionFailed)?;
        Ok(Self { pool })
    }

    /// Creates the pool without opening a connection; connections are
    /// established on first use.
    ///
    /// Must be called within a tokio runtime.
    pub fn connect_lazy<S: AsRef<str>>(
        connection_string: S,
        config: &PostgresConfig,
    ) -> Result<Self, PostgresPersistenceError> {
        let pool = pool_options(config)
            .connect_lazy(connection_string.as_ref())
            .map_err(PostgresPersistenceError::ConnectionFailed)?;
        Ok(Self { pool })
    }

    /// Wraps an existing connection pool.
    ///
    /// Use this when you need full control over pool configuration or want to
    /// share a pool across multiple components.
    pub const fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// The underlying pool, e.g. for ad-hoc queries over the commit table.
    pub const fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Checks that the database answers.
    pub async fn ping(&self) -> Result<(), PostgresPersistenceError> {
        let _ = query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(PostgresPersistenceError::PingFailed)?;
        Ok(())
    }

    /// Applies the embedded schema migrations.
    #[instrument(name = "postgres.migrate", skip(self))]
    pub async fn migrate(&self) -> Result<(), PostgresPersistenceError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|source| {
                error!(error = %source, "[postgres.migrate] migration failed");
                PostgresPersistenceError::MigrationFailed(source)
            })?;
        info!("[postgres.migrate] schema is up to date");
        Ok(())
    }
}

fn pool_options(config: &PostgresConfig) -> PgPoolOptions {
    let max_connections: NonZeroU32 = config.max_connections.into();
    PgPoolOptions::new()
        .max_connections(max_connections.get())
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_lazy_rejects_malformed_url() {
        let result = PostgresPersistence::connect_lazy("not a url", &PostgresConfig::default());

        assert!(matches!(
            result,
            Err(PostgresPersistenceError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn invalid_config_message_names_variable() {
        let error = PostgresPersistenceError::InvalidConfig {
            variable: MAX_CONNECTIONS_VAR,
            value: "many".to_string(),
        };

        insta::assert_snapshot!(error.to_string(), @r#"invalid value "many" for STREAMSTORE_PG_MAX_CONNECTIONS"#);
    }
}
