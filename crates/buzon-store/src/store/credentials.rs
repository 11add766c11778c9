//! Channel credential storage and two-tier resolution.
//!
//! User-scoped credentials win over tenant-scoped ones: independent advisors
//! each own their pages, while a shared tenant credential covers the rest.
//! Tokens are decrypted only here, at the point of resolution, and never
//! cached across events — credential rotation takes effect on the next event.

use super::Store;
use buzon_core::{
    error::BuzonError,
    model::{ChannelKind, CredentialSource, ResolvedCredential},
};
use chrono::Utc;
use uuid::Uuid;

/// Fields for provisioning a credential. The token arrives in plaintext and
/// is encrypted before it touches the database.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub tenant_id: String,
    /// `None` makes this a tenant-scoped shared credential.
    pub user_id: Option<String>,
    pub channel: ChannelKind,
    pub external_account_id: String,
    pub secondary_account_id: Option<String>,
    pub access_token: String,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    tenant_id: String,
    user_id: Option<String>,
    external_account_id: String,
    secondary_account_id: Option<String>,
    access_token: String,
}

impl Store {
    /// Insert or refresh a credential, keyed on (tenant, channel, account,
    /// scope). Re-provisioning an account replaces its token and reactivates
    /// the row.
    pub async fn upsert_credential(&self, cred: &NewCredential) -> Result<String, BuzonError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let encrypted = self.encryptor.encrypt(&cred.access_token)?;

        let (stored_id,): (String,) = sqlx::query_as(
            "INSERT INTO channel_credentials (id, tenant_id, user_id, channel, \
             external_account_id, secondary_account_id, access_token, active, \
             created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?) \
             ON CONFLICT (tenant_id, channel, external_account_id, COALESCE(user_id, '')) \
             DO UPDATE SET access_token = excluded.access_token, \
                           secondary_account_id = excluded.secondary_account_id, \
                           active = 1, \
                           updated_at = excluded.updated_at \
             RETURNING id",
        )
        .bind(&id)
        .bind(&cred.tenant_id)
        .bind(&cred.user_id)
        .bind(cred.channel.as_str())
        .bind(&cred.external_account_id)
        .bind(&cred.secondary_account_id)
        .bind(encrypted)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BuzonError::Store(format!("credential upsert failed: {e}")))?;

        Ok(stored_id)
    }

    /// Deactivate a credential without deleting it.
    pub async fn deactivate_credential(&self, id: &str) -> Result<bool, BuzonError> {
        let result =
            sqlx::query("UPDATE channel_credentials SET active = 0, updated_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| BuzonError::Store(format!("credential update failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Resolve a channel-specific external account id to its owner.
    ///
    /// Tries user-scoped credentials first, then tenant-scoped; for WhatsApp
    /// the business-account id can be passed as `secondary_hint` and is tried
    /// against the secondary column when the primary id misses. Returns
    /// `Ok(None)` when nothing matches — the caller logs and skips the event.
    pub async fn resolve_credential(
        &self,
        channel: ChannelKind,
        external_account_id: &str,
        secondary_hint: Option<&str>,
    ) -> Result<Option<ResolvedCredential>, BuzonError> {
        for (column, value) in [("external_account_id", Some(external_account_id)),
            ("secondary_account_id", secondary_hint)]
        {
            let Some(value) = value else { continue };
            for (user_scoped, source) in
                [(true, CredentialSource::User), (false, CredentialSource::Tenant)]
            {
                if let Some(row) = self
                    .lookup_credential(channel, column, value, user_scoped)
                    .await?
                {
                    let access_token = self.encryptor.decrypt(&row.access_token)?;
                    return Ok(Some(ResolvedCredential {
                        tenant_id: row.tenant_id,
                        user_id: row.user_id,
                        access_token,
                        external_account_id: row.external_account_id,
                        secondary_account_id: row.secondary_account_id,
                        source,
                    }));
                }
            }
        }

        Ok(None)
    }

    async fn lookup_credential(
        &self,
        channel: ChannelKind,
        column: &'static str,
        value: &str,
        user_scoped: bool,
    ) -> Result<Option<CredentialRow>, BuzonError> {
        let scope = if user_scoped { "NOT NULL" } else { "NULL" };
        let sql = format!(
            "SELECT tenant_id, user_id, external_account_id, secondary_account_id, access_token \
             FROM channel_credentials \
             WHERE channel = ? AND {column} = ? AND active = 1 AND user_id IS {scope} \
             ORDER BY updated_at DESC LIMIT 1"
        );

        sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(channel.as_str())
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BuzonError::Store(format!("credential query failed: {e}")))
    }
}
