use std::{path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use sqlx::{
    Sqlite,
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::gateway::config::GatewayConfig;

static MIGRATOR: Migrator = sqlx::migrate!(); // defaults to "./migrations"

#[derive(Debug, Clone)]
pub struct Db(sqlx::Pool<Sqlite>);

/// Challenge waiting for the customer to come back from the ACS.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PendingRedirect {
    pub transaction_id: String,
    pub handler: String,
    settings: String,
    pub vps_tx_id: Option<String>,
    /// Host page the customer's browser is sent to once the challenge is done
    pub return_url: Option<String>,
}

const PENDING_COLUMNS: &str = "transaction_id, handler, settings, vps_tx_id, return_url";

impl PendingRedirect {
    pub fn new(
        transaction_id: impl Into<String>,
        handler: impl Into<String>,
        settings: &GatewayConfig,
        vps_tx_id: Option<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            transaction_id: transaction_id.into(),
            handler: handler.into(),
            settings: serde_json::to_string(settings)?,
            vps_tx_id,
            return_url: None,
        })
    }

    pub fn with_return_url(mut self, return_url: Option<String>) -> Self {
        self.return_url = return_url.filter(|url| !url.trim().is_empty());
        self
    }

    pub fn settings(&self) -> anyhow::Result<GatewayConfig> {
        serde_json::from_str(&self.settings).context("stored gateway settings are corrupted")
    }
}

impl Db {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        tracing::debug!(%database_url);
        let in_memory = database_url.contains(":memory:");
        if !in_memory {
            if let Some(parent) = database_url
                .strip_prefix("sqlite://")
                .and_then(|path| Path::new(path).parent())
                .filter(|parent| !parent.as_os_str().is_empty())
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("create database directory {}", parent.display()))?;
            }
        }
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every in-memory connection is a separate database
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self(pool))
    }

    pub async fn insert_pending(&self, pending: &PendingRedirect) -> sqlx::Result<()> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO pending_redirects ({PENDING_COLUMNS}) VALUES (?, ?, ?, ?, ?)"
        ))
        .bind(&pending.transaction_id)
        .bind(&pending.handler)
        .bind(&pending.settings)
        .bind(&pending.vps_tx_id)
        .bind(&pending.return_url)
        .execute(&self.0)
        .await?;
        Ok(())
    }

    /// Removes and returns the row in one statement, so only one caller can
    /// complete a challenge. Rows older than `ttl` are never returned.
    pub async fn take_pending(
        &self,
        transaction_id: &str,
        handler: &str,
        ttl: Duration,
    ) -> sqlx::Result<Option<PendingRedirect>> {
        sqlx::query_as(&format!(
            "DELETE FROM pending_redirects \
             WHERE transaction_id = ? AND handler = ? AND created_at > datetime('now', ?) \
             RETURNING {PENDING_COLUMNS}"
        ))
        .bind(transaction_id)
        .bind(handler)
        .bind(age_modifier(ttl))
        .fetch_optional(&self.0)
        .await
    }

    /// Drops abandoned challenges, returns how many were removed.
    pub async fn purge_expired(&self, ttl: Duration) -> sqlx::Result<u64> {
        let result =
            sqlx::query("DELETE FROM pending_redirects WHERE created_at <= datetime('now', ?)")
                .bind(age_modifier(ttl))
                .execute(&self.0)
                .await?;
        Ok(result.rows_affected())
    }
}

/// SQLite `datetime` modifier for `ttl` in the past.
fn age_modifier(ttl: Duration) -> String {
    format!("-{} seconds", ttl.as_secs())
}

#[cfg(test)]
impl Db {
    pub async fn get_pending(&self, transaction_id: &str) -> sqlx::Result<Option<PendingRedirect>> {
        sqlx::query_as(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_redirects WHERE transaction_id = ?"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.0)
        .await
    }

    async fn age(&self, transaction_id: &str, by: Duration) {
        sqlx::query(
            "UPDATE pending_redirects SET created_at = datetime(created_at, ?) WHERE transaction_id = ?",
        )
        .bind(age_modifier(by))
        .bind(transaction_id)
        .execute(&self.0)
        .await
        .unwrap();
    }
}
