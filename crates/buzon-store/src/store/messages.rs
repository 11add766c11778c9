//! Message ingestion, echo dedup, and delivery-status reconciliation.

use super::{message_from_row, Store, MESSAGE_COLUMNS};
use buzon_core::{
    error::BuzonError,
    model::{Message, MessageStatus, NewMessage},
};
use chrono::Utc;
use uuid::Uuid;

const ALL_STATUSES: [MessageStatus; 5] = [
    MessageStatus::Pending,
    MessageStatus::Sent,
    MessageStatus::Delivered,
    MessageStatus::Read,
    MessageStatus::Failed,
];

/// Current statuses a receipt carrying `target` is allowed to replace.
fn eligible_currents(target: MessageStatus) -> Vec<&'static str> {
    ALL_STATUSES
        .iter()
        .filter(|s| s.upgrades_to(target))
        .map(|s| s.as_str())
        .collect()
}

impl Store {
    /// Append one message row unconditionally. Used by the CRM send path,
    /// which writes a pending row before a provider id exists. Webhook
    /// pipelines go through [`Store::record_external_message`] instead.
    pub async fn create_message(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        fields: &NewMessage,
    ) -> Result<Message, BuzonError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let attachments = serde_json::to_string(&fields.attachments)?;

        let sql = format!(
            "INSERT INTO messages (id, tenant_id, conversation_id, direction, sender_id, \
             sender_name, kind, content, plain_content, attachments, external_message_id, \
             status, metadata, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {MESSAGE_COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(tenant_id)
            .bind(conversation_id)
            .bind(fields.direction.as_str())
            .bind(&fields.sender_id)
            .bind(&fields.sender_name)
            .bind(fields.kind.as_str())
            .bind(&fields.content)
            .bind(&fields.plain_content)
            .bind(attachments)
            .bind(&fields.external_message_id)
            .bind(fields.status.as_str())
            .bind(fields.metadata.to_string())
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BuzonError::Store(format!("message insert failed: {e}")))?;

        message_from_row(&row)
    }

    /// Record a provider-delivered message, deduplicating on
    /// (tenant, external_message_id).
    ///
    /// Returns the new row, or `None` when a message with that external id
    /// was already recorded: a redelivered inbound message, or an echo of a
    /// send our own path already wrote. The insert is conflict-ignoring, so
    /// the race between two deliveries of the same event resolves inside
    /// the datastore.
    pub async fn record_external_message(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        fields: &NewMessage,
    ) -> Result<Option<Message>, BuzonError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let attachments = serde_json::to_string(&fields.attachments)?;

        let result = sqlx::query(
            "INSERT INTO messages (id, tenant_id, conversation_id, direction, sender_id, \
             sender_name, kind, content, plain_content, attachments, external_message_id, \
             status, metadata, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT DO NOTHING",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(conversation_id)
        .bind(fields.direction.as_str())
        .bind(&fields.sender_id)
        .bind(&fields.sender_name)
        .bind(fields.kind.as_str())
        .bind(&fields.content)
        .bind(&fields.plain_content)
        .bind(attachments)
        .bind(&fields.external_message_id)
        .bind(fields.status.as_str())
        .bind(fields.metadata.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| BuzonError::Store(format!("message insert failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(&id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BuzonError::Store(format!("message readback failed: {e}")))?;

        Ok(Some(message_from_row(&row)?))
    }

    /// Fetch a message by its provider-assigned id.
    pub async fn find_message_by_external_id(
        &self,
        tenant_id: &str,
        external_message_id: &str,
    ) -> Result<Option<Message>, BuzonError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE tenant_id = ? AND external_message_id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(external_message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BuzonError::Store(format!("message query failed: {e}")))?;

        row.as_ref().map(message_from_row).transpose()
    }

    /// Apply an id-addressed delivery receipt under the monotonic rule:
    /// the target status only lands when it strictly outranks the current
    /// one. `failed` outranks everything and records the provider's error
    /// detail; once failed, no later receipt changes the row.
    ///
    /// Returns whether a row was updated (a late or duplicate receipt is a
    /// silent no-op).
    pub async fn apply_status_receipt(
        &self,
        tenant_id: &str,
        external_message_id: &str,
        target: MessageStatus,
        detail: Option<&str>,
    ) -> Result<bool, BuzonError> {
        let eligible = eligible_currents(target);
        if eligible.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; eligible.len()].join(", ");
        let sql = format!(
            "UPDATE messages SET status = ?, status_detail = COALESCE(?, status_detail), \
             updated_at = ? \
             WHERE tenant_id = ? AND external_message_id = ? AND status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql)
            .bind(target.as_str())
            .bind(detail)
            .bind(Utc::now())
            .bind(tenant_id)
            .bind(external_message_id);
        for status in &eligible {
            query = query.bind(*status);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| BuzonError::Store(format!("status update failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply a read watermark: every outbound message in the conversation
    /// still at sent/delivered advances to read. Rows already read or failed
    /// are untouched.
    pub async fn apply_read_watermark(
        &self,
        tenant_id: &str,
        conversation_id: &str,
    ) -> Result<u64, BuzonError> {
        let result = sqlx::query(
            "UPDATE messages SET status = 'read', updated_at = ? \
             WHERE tenant_id = ? AND conversation_id = ? \
               AND direction = 'outbound' AND status IN ('sent', 'delivered')",
        )
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| BuzonError::Store(format!("watermark update failed: {e}")))?;

        Ok(result.rows_affected())
    }

    /// Patch-back primitive for the outbound send path: attach the
    /// provider-assigned id to a row and advance its status. Subject to the
    /// same monotonic rule, so a receipt that already landed is not undone.
    pub async fn attach_external_id(
        &self,
        tenant_id: &str,
        message_id: &str,
        external_message_id: &str,
        status: MessageStatus,
    ) -> Result<(), BuzonError> {
        sqlx::query(
            "UPDATE messages SET \
                 external_message_id = COALESCE(external_message_id, ?), \
                 updated_at = ? \
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(external_message_id)
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| BuzonError::Store(format!("external id patch failed: {e}")))?;

        let eligible = eligible_currents(status);
        if eligible.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; eligible.len()].join(", ");
        let sql = format!(
            "UPDATE messages SET status = ?, updated_at = ? \
             WHERE tenant_id = ? AND id = ? AND status IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(tenant_id)
            .bind(message_id);
        for current in &eligible {
            query = query.bind(*current);
        }
        query
            .execute(&self.pool)
            .await
            .map_err(|e| BuzonError::Store(format!("status patch failed: {e}")))?;

        Ok(())
    }

    /// Count messages in a conversation.
    pub async fn count_messages(
        &self,
        tenant_id: &str,
        conversation_id: &str,
    ) -> Result<i64, BuzonError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE tenant_id = ? AND conversation_id = ?",
        )
        .bind(tenant_id)
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BuzonError::Store(format!("message count failed: {e}")))?;

        Ok(count)
    }
}
