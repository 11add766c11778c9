//! Graph API clients for the three channels.
//!
//! Docs: <https://developers.facebook.com/docs/graph-api>
//!
//! These cover the side effects the inbox performs against the provider:
//! contact profile lookups and read receipts. Message sending to contacts
//! lives in the CRM layer above; it hands its provider-assigned ids back
//! through the store's patch-back path.

use async_trait::async_trait;
use buzon_core::{
    config::GraphConfig,
    error::BuzonError,
    traits::{ChannelSender, UserProfile},
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Shared HTTP plumbing for Graph API calls.
#[derive(Clone)]
pub struct GraphClient {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct MetaProfile {
    first_name: Option<String>,
    last_name: Option<String>,
    name: Option<String>,
    username: Option<String>,
    profile_pic: Option<String>,
}

impl MetaProfile {
    fn display_name(&self) -> Option<String> {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.to_string()),
            (None, Some(last)) => Some(last.to_string()),
            (None, None) => self.username.clone(),
        }
    }
}

impl GraphClient {
    pub fn new(config: &GraphConfig) -> Result<Self, BuzonError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BuzonError::Channel(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// GET a contact profile with the given field list.
    async fn fetch_profile(
        &self,
        token: &str,
        external_id: &str,
        fields: &str,
    ) -> Result<UserProfile, BuzonError> {
        let url = format!("{}/{external_id}", self.api_base);
        let resp = self
            .client
            .get(&url)
            .query(&[("fields", fields)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BuzonError::Channel(format!("profile request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(BuzonError::Channel(format!(
                "profile lookup got {status}: {error_text}"
            )));
        }

        let profile: MetaProfile = resp
            .json()
            .await
            .map_err(|e| BuzonError::Channel(format!("profile decode failed: {e}")))?;

        Ok(UserProfile {
            name: profile.display_name(),
            avatar_url: profile.profile_pic.clone(),
        })
    }

    /// POST a `mark_seen` sender action on behalf of a page/account.
    async fn send_mark_seen(
        &self,
        token: &str,
        account_id: &str,
        participant_id: &str,
    ) -> Result<(), BuzonError> {
        let url = format!("{}/{account_id}/messages", self.api_base);
        let body = serde_json::json!({
            "recipient": {"id": participant_id},
            "sender_action": "mark_seen",
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BuzonError::Channel(format!("mark_seen request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            warn!("mark_seen got {status}: {error_text}");
        }
        Ok(())
    }
}

/// Facebook Messenger sender.
pub struct FacebookSender {
    graph: GraphClient,
}

impl FacebookSender {
    pub fn new(graph: GraphClient) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl ChannelSender for FacebookSender {
    fn name(&self) -> &str {
        "facebook"
    }

    async fn get_user_profile(
        &self,
        token: &str,
        external_id: &str,
    ) -> Result<UserProfile, BuzonError> {
        self.graph
            .fetch_profile(token, external_id, "first_name,last_name,profile_pic")
            .await
    }

    async fn mark_read(
        &self,
        token: &str,
        account_id: &str,
        target: &str,
    ) -> Result<(), BuzonError> {
        self.graph.send_mark_seen(token, account_id, target).await
    }
}

/// Instagram Direct sender.
pub struct InstagramSender {
    graph: GraphClient,
}

impl InstagramSender {
    pub fn new(graph: GraphClient) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl ChannelSender for InstagramSender {
    fn name(&self) -> &str {
        "instagram"
    }

    async fn get_user_profile(
        &self,
        token: &str,
        external_id: &str,
    ) -> Result<UserProfile, BuzonError> {
        self.graph
            .fetch_profile(token, external_id, "name,username,profile_pic")
            .await
    }

    async fn mark_read(
        &self,
        token: &str,
        account_id: &str,
        target: &str,
    ) -> Result<(), BuzonError> {
        self.graph.send_mark_seen(token, account_id, target).await
    }
}

/// WhatsApp Cloud API sender.
pub struct WhatsAppSender {
    graph: GraphClient,
}

impl WhatsAppSender {
    pub fn new(graph: GraphClient) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl ChannelSender for WhatsAppSender {
    fn name(&self) -> &str {
        "whatsapp"
    }

    /// WhatsApp has no profile-lookup endpoint; names arrive as push names
    /// inside the webhook itself.
    async fn get_user_profile(
        &self,
        _token: &str,
        external_id: &str,
    ) -> Result<UserProfile, BuzonError> {
        debug!("No profile endpoint for whatsapp contact {external_id}");
        Ok(UserProfile::default())
    }

    /// `target` is the inbound message id to mark as read.
    async fn mark_read(
        &self,
        token: &str,
        account_id: &str,
        target: &str,
    ) -> Result<(), BuzonError> {
        let url = format!("{}/{account_id}/messages", self.graph.api_base);
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": target,
        });

        let resp = self
            .graph
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BuzonError::Channel(format!("read receipt request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            warn!("whatsapp read receipt got {status}: {error_text}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_profile_display_name() {
        let profile: MetaProfile =
            serde_json::from_str(r#"{"first_name": "Ana", "last_name": "Pérez"}"#).unwrap();
        assert_eq!(profile.display_name().unwrap(), "Ana Pérez");

        let profile: MetaProfile =
            serde_json::from_str(r#"{"name": "Ana Pérez", "username": "anaperez"}"#).unwrap();
        assert_eq!(profile.display_name().unwrap(), "Ana Pérez");

        let profile: MetaProfile = serde_json::from_str(r#"{"username": "anaperez"}"#).unwrap();
        assert_eq!(profile.display_name().unwrap(), "anaperez");

        let profile: MetaProfile = serde_json::from_str("{}").unwrap();
        assert!(profile.display_name().is_none());
    }

    #[test]
    fn test_graph_client_strips_trailing_slash() {
        let config = GraphConfig {
            api_base: "https://graph.facebook.com/v19.0/".to_string(),
            timeout_secs: 5,
        };
        let client = GraphClient::new(&config).unwrap();
        assert_eq!(client.api_base, "https://graph.facebook.com/v19.0");
    }
}
