use crate::error::BuzonError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A messaging channel wired into the inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    FacebookDm,
    InstagramDm,
    Whatsapp,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FacebookDm => "facebook_dm",
            Self::InstagramDm => "instagram_dm",
            Self::Whatsapp => "whatsapp",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = BuzonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facebook_dm" => Ok(Self::FacebookDm),
            "instagram_dm" => Ok(Self::InstagramDm),
            "whatsapp" => Ok(Self::Whatsapp),
            other => Err(BuzonError::Store(format!("unknown channel: {other}"))),
        }
    }
}

/// Whether a message came from the contact or from the CRM side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl FromStr for Direction {
    type Err = BuzonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            other => Err(BuzonError::Store(format!("unknown direction: {other}"))),
        }
    }
}

/// Canonical message kind, derived from the first attachment when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Location,
    Contacts,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Location => "location",
            Self::Contacts => "contacts",
        }
    }

    /// Bracketed preview marker used when a message has no textual body,
    /// so the inbox never shows an empty preview.
    pub fn marker(&self) -> String {
        format!("[{}]", self.as_str())
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = BuzonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            "location" => Ok(Self::Location),
            "contacts" => Ok(Self::Contacts),
            other => Err(BuzonError::Store(format!("unknown message kind: {other}"))),
        }
    }
}

/// Delivery status of a message.
///
/// Receipts from the provider may arrive duplicated and out of order, so
/// transitions follow an explicit rank: a receipt only applies when its rank
/// is strictly greater than the current one. `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    /// Rank used for the never-downgrade rule.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 4,
        }
    }

    /// Whether a receipt carrying `target` should replace this status.
    pub fn upgrades_to(&self, target: MessageStatus) -> bool {
        target.rank() > self.rank()
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = BuzonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            "failed" => Ok(Self::Failed),
            other => Err(BuzonError::Store(format!("unknown status: {other}"))),
        }
    }
}

/// One attachment on a canonical message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: MessageKind,
    /// Provider media reference: a URL for Meta, a media id for WhatsApp.
    pub reference: String,
    pub mime: Option<String>,
    pub title: Option<String>,
}

/// The provider-independent shape every inbound payload normalizes into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub kind: MessageKind,
    /// Display string; synthesized (marker, location text, contact names)
    /// when the payload has no textual body.
    pub content: String,
    /// Raw text body, when the payload carried one.
    pub plain_content: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl CanonicalMessage {
    pub fn text(body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            kind: MessageKind::Text,
            plain_content: Some(body.clone()),
            content: body,
            attachments: Vec::new(),
        }
    }
}

/// A per-participant thread, unique per (tenant, channel, external id).
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    pub channel: ChannelKind,
    pub external_conversation_id: String,
    pub external_participant_id: String,
    pub contact_name: Option<String>,
    pub contact_avatar: Option<String>,
    pub assigned_user_id: Option<String>,
    pub metadata: serde_json::Value,
    pub unread_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Seed fields for conversation creation. Display fields are best-effort and
/// only applied over an existing row when they carry real information.
#[derive(Debug, Clone, Default)]
pub struct ConversationSeed {
    pub participant_id: String,
    pub contact_name: Option<String>,
    pub contact_avatar: Option<String>,
    pub assigned_user_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Partial update for a conversation row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    pub contact_name: Option<String>,
    pub contact_avatar: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub increment_unread: bool,
}

/// One stored inbound or outbound message.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub tenant_id: String,
    pub conversation_id: String,
    pub direction: Direction,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub kind: MessageKind,
    pub content: String,
    pub plain_content: Option<String>,
    pub attachments: Vec<Attachment>,
    pub external_message_id: Option<String>,
    pub status: MessageStatus,
    pub status_detail: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for appending a message row.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub direction: Direction,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub kind: MessageKind,
    pub content: String,
    pub plain_content: Option<String>,
    pub attachments: Vec<Attachment>,
    pub external_message_id: Option<String>,
    pub status: MessageStatus,
    pub metadata: serde_json::Value,
}

impl NewMessage {
    /// An inbound message from a contact. Inbound rows start at `delivered`:
    /// the payload reaching this subsystem is the delivery.
    pub fn inbound(sender_id: impl Into<String>, canonical: CanonicalMessage) -> Self {
        Self {
            direction: Direction::Inbound,
            sender_id: sender_id.into(),
            sender_name: None,
            kind: canonical.kind,
            content: canonical.content,
            plain_content: canonical.plain_content,
            attachments: canonical.attachments,
            external_message_id: None,
            status: MessageStatus::Delivered,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    /// An outbound message mirrored back by the provider (echo) or written
    /// by the CRM's own send path.
    pub fn outbound(sender_id: impl Into<String>, canonical: CanonicalMessage) -> Self {
        Self {
            direction: Direction::Outbound,
            sender_id: sender_id.into(),
            sender_name: None,
            kind: canonical.kind,
            content: canonical.content,
            plain_content: canonical.plain_content,
            attachments: canonical.attachments,
            external_message_id: None,
            status: MessageStatus::Sent,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_message_id = Some(id.into());
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Which credential tier a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    User,
    Tenant,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Tenant => "tenant",
        }
    }
}

/// The outcome of resolving an external account id to its owner.
///
/// The access token is decrypted at resolution and must not outlive the
/// current event's processing.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub access_token: String,
    pub external_account_id: String,
    pub secondary_account_id: Option<String>,
    pub source: CredentialSource,
}

/// Whether a resolved display name is real information, as opposed to the
/// raw external id used as a placeholder.
pub fn is_meaningful_name(name: &str, external_id: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed != external_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rank_ordering() {
        assert!(MessageStatus::Pending.rank() < MessageStatus::Sent.rank());
        assert!(MessageStatus::Sent.rank() < MessageStatus::Delivered.rank());
        assert!(MessageStatus::Delivered.rank() < MessageStatus::Read.rank());
        assert!(MessageStatus::Read.rank() < MessageStatus::Failed.rank());
    }

    #[test]
    fn test_status_never_downgrades() {
        assert!(!MessageStatus::Read.upgrades_to(MessageStatus::Delivered));
        assert!(!MessageStatus::Delivered.upgrades_to(MessageStatus::Delivered));
        assert!(MessageStatus::Delivered.upgrades_to(MessageStatus::Read));
        assert!(MessageStatus::Sent.upgrades_to(MessageStatus::Delivered));
    }

    #[test]
    fn test_failed_is_absorbing() {
        // Failure applies from any state.
        for status in [
            MessageStatus::Pending,
            MessageStatus::Sent,
            MessageStatus::Delivered,
            MessageStatus::Read,
        ] {
            assert!(status.upgrades_to(MessageStatus::Failed));
        }
        // And nothing leaves it.
        assert!(!MessageStatus::Failed.upgrades_to(MessageStatus::Read));
        assert!(!MessageStatus::Failed.upgrades_to(MessageStatus::Delivered));
    }

    #[test]
    fn test_channel_round_trip() {
        for channel in [
            ChannelKind::FacebookDm,
            ChannelKind::InstagramDm,
            ChannelKind::Whatsapp,
        ] {
            assert_eq!(channel.as_str().parse::<ChannelKind>().unwrap(), channel);
        }
    }

    #[test]
    fn test_kind_marker() {
        assert_eq!(MessageKind::Image.marker(), "[image]");
        assert_eq!(MessageKind::Document.marker(), "[document]");
    }

    #[test]
    fn test_meaningful_name() {
        assert!(is_meaningful_name("Ana Pérez", "1789555123"));
        assert!(!is_meaningful_name("1789555123", "1789555123"));
        assert!(!is_meaningful_name("  ", "1789555123"));
    }
}
