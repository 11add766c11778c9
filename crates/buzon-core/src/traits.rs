use crate::error::BuzonError;
use async_trait::async_trait;

/// Contact profile returned by a provider lookup.
#[derive(Debug, Clone, Default)]
pub struct UserProfile {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Channel sender — one per provider.
///
/// Called by the ingestion core for side effects only: profile enrichment and
/// read receipts. Failures are non-fatal; ingestion degrades to the raw
/// external id instead of stalling a batch on a slow or broken lookup.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Human-readable sender name, for log lines.
    fn name(&self) -> &str;

    /// Fetch a contact's display name and avatar.
    async fn get_user_profile(
        &self,
        token: &str,
        external_id: &str,
    ) -> Result<UserProfile, BuzonError>;

    /// Mark a conversation (or message) as read on the provider side.
    ///
    /// `account_id` is the owning page/account/phone-number id; `target` is
    /// the participant id for Meta channels and the message id for WhatsApp.
    async fn mark_read(
        &self,
        token: &str,
        account_id: &str,
        target: &str,
    ) -> Result<(), BuzonError>;
}
