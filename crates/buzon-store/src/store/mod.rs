//! SQLite-backed inbox store.
//!
//! Split into focused submodules:
//! - `conversations` — conflict-safe find-or-create and display upgrades
//! - `messages` — append-only ingestion, echo dedup, status reconciliation
//! - `credentials` — two-tier channel credential resolution
//!
//! The datastore is the sole synchronization point for concurrent webhook
//! deliveries: creation goes through upserts keyed on the uniqueness
//! constraints, never through check-then-insert.

mod conversations;
mod credentials;
mod messages;

pub use credentials::NewCredential;

use crate::crypto::Encryptor;
use buzon_core::{
    config::{shellexpand, StoreConfig},
    error::BuzonError,
    model::{Attachment, Conversation, Message},
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

/// Row counts reported by `buzon status`.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub conversations: i64,
    pub messages: i64,
    pub credentials: i64,
}

/// Persistent inbox store backed by SQLite.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    encryptor: Encryptor,
}

impl Store {
    /// Create a new store, running migrations on first use.
    pub async fn new(config: &StoreConfig, encryptor: Encryptor) -> Result<Self, BuzonError> {
        let db_path = shellexpand(&config.db_path);

        // Ensure parent directory exists.
        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BuzonError::Store(format!("failed to create data dir: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| BuzonError::Store(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(opts)
            .await
            .map_err(|e| BuzonError::Store(format!("failed to connect to sqlite: {e}")))?;

        Self::run_migrations(&pool).await?;

        info!("Inbox store initialized at {db_path}");

        Ok(Self { pool, encryptor })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Row counts for the status report.
    pub async fn stats(&self) -> Result<StoreStats, BuzonError> {
        let mut counts = [0i64; 3];
        for (i, table) in ["conversations", "messages", "channel_credentials"]
            .iter()
            .enumerate()
        {
            let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| BuzonError::Store(format!("count query failed: {e}")))?;
            counts[i] = count;
        }
        Ok(StoreStats {
            conversations: counts[0],
            messages: counts[1],
            credentials: counts[2],
        })
    }

    /// Run SQL migrations, tracking which have already been applied.
    pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<(), BuzonError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| BuzonError::Store(format!("failed to create migrations table: {e}")))?;

        let migrations: &[(&str, &str)] =
            &[("001_init", include_str!("../../migrations/001_init.sql"))];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        BuzonError::Store(format!("failed to check migration {name}: {e}"))
                    })?;

            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql)
                .execute(pool)
                .await
                .map_err(|e| BuzonError::Store(format!("migration {name} failed: {e}")))?;

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| BuzonError::Store(format!("failed to record migration {name}: {e}")))?;
        }
        Ok(())
    }
}

pub(crate) const CONVERSATION_COLUMNS: &str = "id, tenant_id, channel, external_conversation_id, \
     external_participant_id, contact_name, contact_avatar, assigned_user_id, metadata, \
     unread_count, last_message_at, last_message_preview, created_at, updated_at";

pub(crate) const MESSAGE_COLUMNS: &str = "id, tenant_id, conversation_id, direction, sender_id, \
     sender_name, kind, content, plain_content, attachments, external_message_id, status, \
     status_detail, metadata, created_at, updated_at";

pub(crate) fn conversation_from_row(row: &SqliteRow) -> Result<Conversation, BuzonError> {
    let map = |e: sqlx::Error| BuzonError::Store(format!("conversation row decode failed: {e}"));
    let metadata: String = row.try_get("metadata").map_err(map)?;
    Ok(Conversation {
        id: row.try_get("id").map_err(map)?,
        tenant_id: row.try_get("tenant_id").map_err(map)?,
        channel: row.try_get::<String, _>("channel").map_err(map)?.parse()?,
        external_conversation_id: row.try_get("external_conversation_id").map_err(map)?,
        external_participant_id: row.try_get("external_participant_id").map_err(map)?,
        contact_name: row.try_get("contact_name").map_err(map)?,
        contact_avatar: row.try_get("contact_avatar").map_err(map)?,
        assigned_user_id: row.try_get("assigned_user_id").map_err(map)?,
        metadata: serde_json::from_str(&metadata)?,
        unread_count: row.try_get("unread_count").map_err(map)?,
        last_message_at: row
            .try_get::<Option<DateTime<Utc>>, _>("last_message_at")
            .map_err(map)?,
        last_message_preview: row.try_get("last_message_preview").map_err(map)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(map)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(map)?,
    })
}

pub(crate) fn message_from_row(row: &SqliteRow) -> Result<Message, BuzonError> {
    let map = |e: sqlx::Error| BuzonError::Store(format!("message row decode failed: {e}"));
    let attachments: String = row.try_get("attachments").map_err(map)?;
    let metadata: String = row.try_get("metadata").map_err(map)?;
    Ok(Message {
        id: row.try_get("id").map_err(map)?,
        tenant_id: row.try_get("tenant_id").map_err(map)?,
        conversation_id: row.try_get("conversation_id").map_err(map)?,
        direction: row.try_get::<String, _>("direction").map_err(map)?.parse()?,
        sender_id: row.try_get("sender_id").map_err(map)?,
        sender_name: row.try_get("sender_name").map_err(map)?,
        kind: row.try_get::<String, _>("kind").map_err(map)?.parse()?,
        content: row.try_get("content").map_err(map)?,
        plain_content: row.try_get("plain_content").map_err(map)?,
        attachments: serde_json::from_str::<Vec<Attachment>>(&attachments)?,
        external_message_id: row.try_get("external_message_id").map_err(map)?,
        status: row.try_get::<String, _>("status").map_err(map)?.parse()?,
        status_detail: row.try_get("status_detail").map_err(map)?,
        metadata: serde_json::from_str(&metadata)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(map)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(map)?,
    })
}
