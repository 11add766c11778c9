//! Wire payload types for the three provider webhooks.
//!
//! The transport layer hands this subsystem an already-authenticated body of
//! shape `{ object, entry: [...] }`. Entries are kept as raw JSON at the top
//! level so one malformed entry can be rejected inside the per-event boundary
//! without poisoning the rest of the batch.

use serde::Deserialize;

/// A parsed webhook body as delivered by Meta.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookBody {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<serde_json::Value>,
}

/// Classified object type of a webhook body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookObject {
    /// Facebook Messenger (`object: "page"`).
    Page,
    /// Instagram Direct (`object: "instagram"`).
    Instagram,
    /// WhatsApp Cloud API (`object: "whatsapp_business_account"`).
    WhatsAppBusiness,
    /// Anything else. Providers add object types; these are a no-op, not an error.
    Unknown,
}

impl WebhookBody {
    pub fn classify(&self) -> WebhookObject {
        match self.object.as_str() {
            "page" => WebhookObject::Page,
            "instagram" => WebhookObject::Instagram,
            "whatsapp_business_account" => WebhookObject::WhatsAppBusiness,
            _ => WebhookObject::Unknown,
        }
    }
}

// --- Facebook Messenger / Instagram Direct ---

/// One `entry` of a page/instagram webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct MetaEntry {
    /// Page id or Instagram business account id.
    pub id: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

/// One messaging sub-event: a message, an echo, a receipt, or a reaction.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingEvent {
    pub sender: MetaParty,
    pub recipient: MetaParty,
    #[serde(default)]
    pub timestamp: i64,
    pub message: Option<MetaMessage>,
    pub delivery: Option<MetaDelivery>,
    pub read: Option<MetaRead>,
    pub reaction: Option<MetaReaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaParty {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaMessage {
    pub mid: String,
    pub text: Option<String>,
    #[serde(default)]
    pub is_echo: bool,
    #[serde(default)]
    pub attachments: Vec<MetaAttachment>,
    pub reply_to: Option<MetaReplyTo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaReplyTo {
    pub mid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaAttachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Option<MetaAttachmentPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaAttachmentPayload {
    pub url: Option<String>,
    pub title: Option<String>,
    pub sticker_id: Option<i64>,
    pub coordinates: Option<MetaCoordinates>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaCoordinates {
    pub lat: f64,
    #[serde(rename = "long")]
    pub lng: f64,
}

/// Delivery receipt: the mids delivered, plus a watermark timestamp.
#[derive(Debug, Clone, Deserialize)]
pub struct MetaDelivery {
    #[serde(default)]
    pub mids: Vec<String>,
    #[serde(default)]
    pub watermark: i64,
}

/// Read watermark: everything sent up to this point has been read.
#[derive(Debug, Clone, Deserialize)]
pub struct MetaRead {
    #[serde(default)]
    pub watermark: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaReaction {
    pub mid: String,
    pub action: String,
    pub emoji: Option<String>,
}

// --- WhatsApp Cloud API ---

/// One `entry` of a whatsapp_business_account webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct WaEntry {
    /// WhatsApp business account id.
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WaChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaChange {
    pub field: String,
    pub value: WaValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaValue {
    pub metadata: Option<WaMetadata>,
    #[serde(default)]
    pub contacts: Vec<WaContact>,
    #[serde(default)]
    pub messages: Vec<WaMessage>,
    #[serde(default)]
    pub statuses: Vec<WaStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaMetadata {
    pub display_phone_number: Option<String>,
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaContact {
    pub wa_id: String,
    pub profile: Option<WaProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaProfile {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaMessage {
    pub from: String,
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub text: Option<WaText>,
    pub image: Option<WaMedia>,
    pub video: Option<WaMedia>,
    pub audio: Option<WaMedia>,
    pub document: Option<WaMedia>,
    pub sticker: Option<WaMedia>,
    pub location: Option<WaLocation>,
    #[serde(default)]
    pub contacts: Vec<WaContactCard>,
    pub reaction: Option<WaReaction>,
    pub context: Option<WaContext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaText {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaMedia {
    pub id: Option<String>,
    pub link: Option<String>,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub filename: Option<String>,
}

impl WaMedia {
    /// Media reference for storage: the media id, or the direct link.
    pub fn reference(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.link.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaContactCard {
    pub name: Option<WaContactName>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaContactName {
    pub formatted_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl WaContactCard {
    /// Best available display name for a shared contact card.
    pub fn display_name(&self) -> Option<String> {
        let name = self.name.as_ref()?;
        if let Some(formatted) = name.formatted_name.as_deref() {
            if !formatted.is_empty() {
                return Some(formatted.to_string());
            }
        }
        match (name.first_name.as_deref(), name.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.to_string()),
            (None, Some(last)) => Some(last.to_string()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaReaction {
    pub message_id: String,
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaContext {
    pub id: Option<String>,
    pub from: Option<String>,
}

/// One delivery/read/failure receipt for an outbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct WaStatus {
    /// The external message id the receipt addresses (e.g. `wamid.XXX`).
    pub id: String,
    pub status: String,
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub errors: Vec<WaError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaError {
    pub code: i64,
    pub title: Option<String>,
    pub message: Option<String>,
}

impl WaError {
    /// `code: title` detail string stored alongside a failed status.
    pub fn detail(&self) -> String {
        let text = self
            .title
            .as_deref()
            .or(self.message.as_deref())
            .unwrap_or("unknown error");
        format!("{}: {}", self.code, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_objects() {
        let body: WebhookBody = serde_json::from_str(r#"{"object":"page","entry":[]}"#).unwrap();
        assert_eq!(body.classify(), WebhookObject::Page);

        let body: WebhookBody =
            serde_json::from_str(r#"{"object":"whatsapp_business_account"}"#).unwrap();
        assert_eq!(body.classify(), WebhookObject::WhatsAppBusiness);

        let body: WebhookBody = serde_json::from_str(r#"{"object":"ad_account"}"#).unwrap();
        assert_eq!(body.classify(), WebhookObject::Unknown);
    }

    #[test]
    fn test_meta_entry_without_messaging() {
        let entry: MetaEntry =
            serde_json::from_str(r#"{"id":"17841400000000","time":1700000000}"#).unwrap();
        assert!(entry.messaging.is_empty());
    }

    #[test]
    fn test_meta_echo_flag() {
        let json = r#"{
            "sender": {"id": "108900000000"},
            "recipient": {"id": "24680"},
            "timestamp": 1700000001,
            "message": {"mid": "m_abc", "text": "hola", "is_echo": true}
        }"#;
        let event: MessagingEvent = serde_json::from_str(json).unwrap();
        assert!(event.message.unwrap().is_echo);
    }

    #[test]
    fn test_wa_message_text() {
        let json = r#"{
            "from": "18095551234",
            "id": "wamid.1",
            "timestamp": "1700000000",
            "type": "text",
            "text": {"body": "Hola"}
        }"#;
        let msg: WaMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.text.unwrap().body, "Hola");
        assert_eq!(msg.kind, "text");
    }

    #[test]
    fn test_wa_status_error_detail() {
        let json = r#"{
            "id": "wamid.123",
            "status": "failed",
            "errors": [{"code": 131026, "title": "Message undeliverable"}]
        }"#;
        let status: WaStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.errors[0].detail(), "131026: Message undeliverable");
    }

    #[test]
    fn test_contact_card_name_fallback() {
        let card: WaContactCard =
            serde_json::from_str(r#"{"name": {"first_name": "Ana", "last_name": "Pérez"}}"#)
                .unwrap();
        assert_eq!(card.display_name().unwrap(), "Ana Pérez");

        let card: WaContactCard =
            serde_json::from_str(r#"{"name": {"formatted_name": "Dr. Ana Pérez"}}"#).unwrap();
        assert_eq!(card.display_name().unwrap(), "Dr. Ana Pérez");
    }

    #[test]
    fn test_wa_media_reference_prefers_id() {
        let media: WaMedia =
            serde_json::from_str(r#"{"id": "media-1", "link": "https://example.com/x.jpg"}"#)
                .unwrap();
        assert_eq!(media.reference(), "media-1");

        let media: WaMedia =
            serde_json::from_str(r#"{"link": "https://example.com/x.jpg"}"#).unwrap();
        assert_eq!(media.reference(), "https://example.com/x.jpg");
    }
}
