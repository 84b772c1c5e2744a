use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use matchcast_models::Result;

use crate::migrations::get_migrations;

pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool> {
        let row = sqlx::query("SELECT 1 as health")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get::<i32, _>("health") == 1)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for (version, statement) in get_migrations() {
            tracing::debug!(version, "applying schema statement");
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}
