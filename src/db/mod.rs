//! Connection pools and health checks.
//!
//! Two independent stores: the Postgres document store (backlog source and
//! result sink) and the MySQL scheduler log (dedupe sweep target). The
//! Postgres pool is sized to the worker count so each pool worker can hold
//! its own connection while processing.

pub mod attributes;
pub mod backlog;
pub mod writer;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::{MySqlPool, PgPool};

use crate::error::Result;

/// Handle to the Postgres document store.
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect with a pool sized for `workers` concurrent consumers.
    pub async fn connect(url: &str, workers: usize) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(workers.max(1) as u32)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Simple health check — run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool, for ad-hoc statements and tests.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Handle to the MySQL scheduler log.
pub struct LogStore {
    pool: MySqlPool,
}

impl LogStore {
    /// Connect with a small pool; the sweep runs on one connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool, for ad-hoc statements and tests.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}
