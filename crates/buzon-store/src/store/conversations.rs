//! Conversation lifecycle — conflict-safe find-or-create, display upgrades,
//! unread and last-message bookkeeping.

use super::{conversation_from_row, Store, CONVERSATION_COLUMNS};
use buzon_core::{
    error::BuzonError,
    model::{is_meaningful_name, ChannelKind, Conversation, ConversationPatch, ConversationSeed},
};
use chrono::Utc;
use uuid::Uuid;

impl Store {
    /// Idempotent find-or-create keyed on (tenant, channel, external id).
    ///
    /// This is a true upsert: two concurrent deliveries of the same event
    /// both land here and the uniqueness constraint yields exactly one row.
    /// Returns the surviving row and whether it was created by this call.
    ///
    /// Display fields on an existing row are only upgraded when the seed
    /// carries real information, never clobbered with the raw external id.
    /// `assigned_user_id` is set at creation and never reassigned here.
    pub async fn find_or_create_conversation(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
        external_id: &str,
        seed: &ConversationSeed,
    ) -> Result<(Conversation, bool), BuzonError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let metadata = seed
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));

        let sql = format!(
            "INSERT INTO conversations (id, tenant_id, channel, external_conversation_id, \
             external_participant_id, contact_name, contact_avatar, assigned_user_id, metadata, \
             unread_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?) \
             ON CONFLICT (tenant_id, channel, external_conversation_id) \
             DO UPDATE SET updated_at = excluded.updated_at \
             RETURNING {CONVERSATION_COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(tenant_id)
            .bind(channel.as_str())
            .bind(external_id)
            .bind(&seed.participant_id)
            .bind(&seed.contact_name)
            .bind(&seed.contact_avatar)
            .bind(&seed.assigned_user_id)
            .bind(metadata.to_string())
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BuzonError::Store(format!("conversation upsert failed: {e}")))?;

        let conversation = conversation_from_row(&row)?;
        let created = conversation.id == id;
        if created {
            return Ok((conversation, true));
        }

        // Upgrade patch: only overwrite display fields with real values.
        let name_upgrade = seed
            .contact_name
            .as_deref()
            .filter(|n| is_meaningful_name(n, external_id))
            .filter(|n| conversation.contact_name.as_deref() != Some(*n))
            .map(str::to_string);
        let avatar_upgrade = seed
            .contact_avatar
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .filter(|a| conversation.contact_avatar.as_deref() != Some(*a))
            .map(str::to_string);

        if name_upgrade.is_none() && avatar_upgrade.is_none() {
            return Ok((conversation, false));
        }

        let patch = ConversationPatch {
            contact_name: name_upgrade,
            contact_avatar: avatar_upgrade,
            ..Default::default()
        };
        self.update_conversation(tenant_id, &conversation.id, &patch)
            .await?;

        let refreshed = self
            .get_conversation(tenant_id, &conversation.id)
            .await?
            .ok_or_else(|| BuzonError::Store("conversation vanished after upgrade".to_string()))?;
        Ok((refreshed, false))
    }

    /// Apply a partial update. `None` fields are left untouched.
    pub async fn update_conversation(
        &self,
        tenant_id: &str,
        id: &str,
        patch: &ConversationPatch,
    ) -> Result<(), BuzonError> {
        sqlx::query(
            "UPDATE conversations SET \
                 contact_name = COALESCE(?, contact_name), \
                 contact_avatar = COALESCE(?, contact_avatar), \
                 last_message_at = COALESCE(?, last_message_at), \
                 last_message_preview = COALESCE(?, last_message_preview), \
                 unread_count = unread_count + ?, \
                 updated_at = ? \
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(&patch.contact_name)
        .bind(&patch.contact_avatar)
        .bind(patch.last_message_at)
        .bind(&patch.last_message_preview)
        .bind(if patch.increment_unread { 1i64 } else { 0i64 })
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| BuzonError::Store(format!("conversation update failed: {e}")))?;

        Ok(())
    }

    /// Fetch a conversation by id.
    pub async fn get_conversation(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<Conversation>, BuzonError> {
        let sql =
            format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE tenant_id = ? AND id = ?");
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BuzonError::Store(format!("conversation query failed: {e}")))?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    /// Look up an existing conversation by its idempotency key, without
    /// creating one. Echo handling uses this: an echo for a participant we
    /// have never tracked is dropped.
    pub async fn find_conversation(
        &self,
        tenant_id: &str,
        channel: ChannelKind,
        external_id: &str,
    ) -> Result<Option<Conversation>, BuzonError> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE tenant_id = ? AND channel = ? AND external_conversation_id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(channel.as_str())
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BuzonError::Store(format!("conversation query failed: {e}")))?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    /// Reset the unread counter (an agent opened the thread).
    pub async fn mark_conversation_read(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<(), BuzonError> {
        sqlx::query(
            "UPDATE conversations SET unread_count = 0, updated_at = ? \
             WHERE tenant_id = ? AND id = ?",
        )
        .bind(Utc::now())
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| BuzonError::Store(format!("conversation update failed: {e}")))?;

        Ok(())
    }
}
