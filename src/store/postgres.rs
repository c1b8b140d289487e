use std::collections::HashSet;

use anyhow::Context;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{info, warn};
use tokio_postgres::{NoTls, Row};

use super::UserStore;
use crate::{
    config::PostgresSettings,
    error::WalletError,
    models::{
        Chain, CustomToken, NewNotification, Notification, NotificationKind, TokenKey, UserId,
        UserSettings,
    },
};

/// Split SQL into statements, respecting dollar-quoted strings.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_dollar_quote = false;
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if i + 1 < bytes.len() && bytes[i] == b'$' && bytes[i + 1] == b'$' {
            in_dollar_quote = !in_dollar_quote;
            i += 2;
            continue;
        }

        if bytes[i] == b';' && !in_dollar_quote {
            let stmt = &sql[start..i];
            if !stmt.trim().is_empty() {
                statements.push(stmt);
            }
            start = i + 1;
        }
        i += 1;
    }

    if start < sql.len() {
        let stmt = &sql[start..];
        if !stmt.trim().is_empty() {
            statements.push(stmt);
        }
    }

    statements
}

/// [`UserStore`] on PostgreSQL with connection pooling.
#[derive(Clone)]
pub struct PostgresUserStore {
    pool: Pool,
}

const CONNECT_ATTEMPTS: u32 = 3;

impl PostgresUserStore {
    pub async fn new(settings: &PostgresSettings) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL at {}:{}", settings.host, settings.port);

        let mut attempt = 0;
        loop {
            let mut pg_config = tokio_postgres::Config::new();
            pg_config
                .host(&settings.host)
                .port(settings.port)
                .user(&settings.user)
                .password(&settings.password)
                .dbname(&settings.database);

            let mgr = Manager::from_config(
                pg_config,
                NoTls,
                ManagerConfig {
                    recycling_method: RecyclingMethod::Fast,
                },
            );
            let pool = Pool::builder(mgr)
                .max_size(settings.pool_size)
                .build()
                .context("Failed to create PostgreSQL connection pool")?;

            match pool.get().await {
                Ok(_conn) => {
                    info!("Connected to PostgreSQL");
                    return Ok(Self { pool });
                },
                Err(e) => {
                    attempt += 1;
                    if attempt >= CONNECT_ATTEMPTS {
                        return Err(anyhow::anyhow!(
                            "Failed to connect to PostgreSQL after {} attempts: {}",
                            CONNECT_ATTEMPTS,
                            e
                        ));
                    }
                    let delay = std::time::Duration::from_millis(100 * 2_u64.pow(attempt));
                    warn!(
                        "Failed to connect to PostgreSQL (attempt {}/{}), retrying in {:?}...",
                        attempt, CONNECT_ATTEMPTS, delay
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// Apply `schema/postgres.sql`; every statement is idempotent.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        info!("Applying PostgreSQL schema");
        let client = self.pool.get().await?;

        let schema = tokio::fs::read_to_string("schema/postgres.sql")
            .await
            .context("Failed to read schema/postgres.sql")?;

        for stmt in split_sql_statements(&schema) {
            let stmt = stmt.trim();
            client
                .execute(stmt, &[])
                .await
                .with_context(|| format!("Failed to execute migration statement: {}", stmt))?;
        }

        info!("PostgreSQL schema applied");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), WalletError> {
        let client = self.pool.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        Ok(())
    }
}

fn parse_chain(name: &str) -> Result<Chain, WalletError> {
    name.parse()
        .map_err(|_| WalletError::Storage(format!("unknown chain '{}' in database", name)))
}

fn row_to_custom_token(row: &Row) -> Result<CustomToken, WalletError> {
    let chain: String = row.get("chain");
    let decimals: i16 = row.get("decimals");
    Ok(CustomToken {
        chain: parse_chain(&chain)?,
        address: row.get("address"),
        symbol: row.get("symbol"),
        decimals: u8::try_from(decimals)
            .map_err(|_| WalletError::Storage(format!("decimals {} out of range", decimals)))?,
    })
}

fn row_to_notification(row: &Row) -> Result<Notification, WalletError> {
    let kind: String = row.get("kind");
    let chain: String = row.get("chain");
    Ok(Notification {
        id: row.get("id"),
        kind: NotificationKind::parse(&kind)
            .ok_or_else(|| WalletError::Storage(format!("unknown notification kind '{}'", kind)))?,
        chain: parse_chain(&chain)?,
        message: row.get("message"),
        tx_hash: row.get("tx_hash"),
        read: row.get("read"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn authenticate(&self, session: &str) -> Result<UserId, WalletError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT user_id FROM wallet.sessions
                 WHERE token = $1 AND (expires_at IS NULL OR expires_at > NOW())",
                &[&session],
            )
            .await?;
        row.map(|r| r.get("user_id")).ok_or(WalletError::Unauthorized)
    }

    async fn hidden_tokens(&self, user: &UserId) -> Result<HashSet<TokenKey>, WalletError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT chain, address FROM wallet.hidden_tokens WHERE user_id = $1",
                &[user],
            )
            .await?;

        rows.iter()
            .map(|row| {
                let chain: String = row.get("chain");
                let address: String = row.get("address");
                Ok(TokenKey::new(parse_chain(&chain)?, &address))
            })
            .collect()
    }

    async fn set_token_hidden(
        &self,
        user: &UserId,
        token: &TokenKey,
        hidden: bool,
    ) -> Result<(), WalletError> {
        let client = self.pool.get().await?;
        let chain = token.chain.name();
        if hidden {
            client
                .execute(
                    "INSERT INTO wallet.hidden_tokens (user_id, chain, address)
                     VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
                    &[user, &chain, &token.address],
                )
                .await?;
        } else {
            client
                .execute(
                    "DELETE FROM wallet.hidden_tokens
                     WHERE user_id = $1 AND chain = $2 AND address = $3",
                    &[user, &chain, &token.address],
                )
                .await?;
        }
        Ok(())
    }

    async fn custom_tokens(
        &self,
        user: &UserId,
        chain: Option<Chain>,
    ) -> Result<Vec<CustomToken>, WalletError> {
        let client = self.pool.get().await?;
        let chain_name = chain.map(|c| c.name());
        let rows = client
            .query(
                "SELECT chain, address, symbol, decimals FROM wallet.custom_tokens
                 WHERE user_id = $1 AND ($2::TEXT IS NULL OR chain = $2)
                 ORDER BY created_at",
                &[user, &chain_name],
            )
            .await?;
        rows.iter().map(row_to_custom_token).collect()
    }

    async fn add_custom_tokens(
        &self,
        user: &UserId,
        tokens: &[CustomToken],
    ) -> Result<(), WalletError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let stmt = tx
            .prepare(
                "INSERT INTO wallet.custom_tokens (user_id, chain, address, symbol, decimals)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (user_id, chain, address) DO UPDATE SET
                    symbol = EXCLUDED.symbol,
                    decimals = EXCLUDED.decimals",
            )
            .await?;

        for token in tokens {
            let chain = token.chain.name();
            let decimals = i16::from(token.decimals);
            // Null bytes are invalid in TEXT columns
            let symbol = token.symbol.replace('\0', "");
            tx.execute(&stmt, &[user, &chain, &token.address, &symbol, &decimals])
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn settings(&self, user: &UserId) -> Result<UserSettings, WalletError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT settings FROM wallet.user_settings WHERE user_id = $1",
                &[user],
            )
            .await?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row.get("settings");
                serde_json::from_value(value)
                    .map_err(|e| WalletError::Storage(format!("malformed settings: {}", e)))
            },
            None => Ok(UserSettings::default()),
        }
    }

    async fn save_settings(
        &self,
        user: &UserId,
        settings: &UserSettings,
    ) -> Result<(), WalletError> {
        let value = serde_json::to_value(settings)
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO wallet.user_settings (user_id, settings, updated_at)
                 VALUES ($1, $2, NOW())
                 ON CONFLICT (user_id) DO UPDATE SET
                    settings = EXCLUDED.settings,
                    updated_at = NOW()",
                &[user, &value],
            )
            .await?;
        Ok(())
    }

    async fn notifications(&self, user: &UserId) -> Result<Vec<Notification>, WalletError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, kind, chain, message, tx_hash, read, created_at
                 FROM wallet.notifications
                 WHERE user_id = $1
                 ORDER BY created_at DESC, id DESC
                 LIMIT 200",
                &[user],
            )
            .await?;
        rows.iter().map(row_to_notification).collect()
    }

    async fn add_notification(
        &self,
        user: &UserId,
        notification: NewNotification,
    ) -> Result<Notification, WalletError> {
        let client = self.pool.get().await?;
        let kind = notification.kind.as_str();
        let chain = notification.chain.name();
        let row = client
            .query_one(
                "INSERT INTO wallet.notifications (user_id, kind, chain, message, tx_hash)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id, kind, chain, message, tx_hash, read, created_at",
                &[user, &kind, &chain, &notification.message, &notification.tx_hash],
            )
            .await?;
        row_to_notification(&row)
    }

    async fn mark_notifications_read(
        &self,
        user: &UserId,
        ids: Option<&[i64]>,
    ) -> Result<u64, WalletError> {
        let client = self.pool.get().await?;
        let changed = match ids {
            Some(ids) => {
                let ids = ids.to_vec();
                client
                    .execute(
                        "UPDATE wallet.notifications SET read = TRUE
                         WHERE user_id = $1 AND NOT read AND id = ANY($2)",
                        &[user, &ids],
                    )
                    .await?
            },
            None => {
                client
                    .execute(
                        "UPDATE wallet.notifications SET read = TRUE
                         WHERE user_id = $1 AND NOT read",
                        &[user],
                    )
                    .await?
            },
        };
        Ok(changed)
    }
}
