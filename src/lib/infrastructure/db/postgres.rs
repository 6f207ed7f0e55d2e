//! Postgres module.
//!
//! Repositories use runtime-checked `query_as::<_, Record>` with `FromRow` records instead of
//! the `query!` macros, so the crate builds without a live database or `.sqlx` offline data.
//! Migrations in `migrations/` are embedded with `sqlx::migrate!`.

use anyhow::{anyhow, Result};
use clap::Parser;
use sqlx::PgPool;

mod mailing;
mod subscriptions;

/// Database connection
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    /// The database connection pool
    pub pool: PgPool,
}

impl PostgresDatabase {
    /// Create a new database connection
    pub async fn new(connection_string: &str) -> Result<Self> {
        Ok(Self {
            pool: PgPool::connect(connection_string).await?,
        })
    }

    /// Returns the underlying database connection
    pub fn connection(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    #[mutants::skip]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;

        Ok(())
    }
}

/// Database connection details
#[derive(Debug, Clone, Parser)]
pub struct DatabaseConnectionDetails {
    /// The database connection string
    #[arg(long, env = "DATABASE_URL")]
    pub connection_string: String,
}

fn unknown(err: sqlx::Error) -> anyhow::Error {
    anyhow!("Unknown database error: {:?}", err)
}
