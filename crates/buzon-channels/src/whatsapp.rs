//! Normalization for WhatsApp Cloud API messages.

use buzon_core::model::{Attachment, CanonicalMessage, MessageKind};
use buzon_core::webhook::{WaMedia, WaMessage};
use tracing::debug;

/// Turn a WhatsApp Cloud API message into the canonical shape.
///
/// Returns `None` for payload types the inbox does not store as messages
/// (reactions, unsupported types), which the caller skips.
pub fn normalize(message: &WaMessage) -> Option<CanonicalMessage> {
    match message.kind.as_str() {
        "text" => {
            let body = message.text.as_ref()?.body.clone();
            Some(CanonicalMessage::text(body))
        }
        "image" => message.image.as_ref().map(|m| media(MessageKind::Image, m)),
        "video" => message.video.as_ref().map(|m| media(MessageKind::Video, m)),
        "audio" => message.audio.as_ref().map(|m| media(MessageKind::Audio, m)),
        "document" => message
            .document
            .as_ref()
            .map(|m| media(MessageKind::Document, m)),
        // Stickers are stored as images with a sticker marker.
        "sticker" => message.sticker.as_ref().map(|m| {
            let mut canonical = media(MessageKind::Image, m);
            canonical.content = "[sticker]".to_string();
            canonical
        }),
        "location" => message.location.as_ref().map(|loc| {
            let content = match (loc.name.as_deref(), loc.address.as_deref()) {
                (Some(name), _) => format!("📍 {name}"),
                (None, Some(address)) => format!("📍 {address}"),
                (None, None) => format!("📍 {}, {}", loc.latitude, loc.longitude),
            };
            CanonicalMessage {
                kind: MessageKind::Location,
                content,
                plain_content: None,
                attachments: vec![Attachment {
                    kind: MessageKind::Location,
                    reference: format!("{},{}", loc.latitude, loc.longitude),
                    mime: None,
                    title: loc.name.clone(),
                }],
            }
        }),
        "contacts" => {
            let names: Vec<String> = message
                .contacts
                .iter()
                .filter_map(|card| card.display_name())
                .collect();
            let content = if names.is_empty() {
                MessageKind::Contacts.marker()
            } else {
                format!("[contact] {}", names.join(", "))
            };
            Some(CanonicalMessage {
                kind: MessageKind::Contacts,
                content,
                plain_content: None,
                attachments: Vec::new(),
            })
        }
        "reaction" => None,
        other => {
            debug!("Skipping unsupported whatsapp message type: {other}");
            None
        }
    }
}

fn media(kind: MessageKind, raw: &WaMedia) -> CanonicalMessage {
    let content = raw
        .caption
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| kind.marker());
    CanonicalMessage {
        kind,
        plain_content: raw.caption.clone().filter(|c| !c.is_empty()),
        content,
        attachments: vec![Attachment {
            kind,
            reference: raw.reference(),
            mime: raw.mime_type.clone(),
            title: raw.filename.clone(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: &str) -> WaMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_text_message() {
        let canonical = normalize(&message(
            r#"{
                "from": "18095551234",
                "id": "wamid.1",
                "type": "text",
                "text": {"body": "Quisiera una cotización"}
            }"#,
        ))
        .unwrap();
        assert_eq!(canonical.kind, MessageKind::Text);
        assert_eq!(canonical.content, "Quisiera una cotización");
    }

    #[test]
    fn test_image_with_caption() {
        let canonical = normalize(&message(
            r#"{
                "from": "18095551234",
                "id": "wamid.2",
                "type": "image",
                "image": {"id": "media-9", "mime_type": "image/jpeg", "caption": "el recibo"}
            }"#,
        ))
        .unwrap();
        assert_eq!(canonical.kind, MessageKind::Image);
        assert_eq!(canonical.content, "el recibo");
        assert_eq!(canonical.attachments[0].reference, "media-9");
        assert_eq!(canonical.attachments[0].mime.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_document_without_caption_gets_marker() {
        let canonical = normalize(&message(
            r#"{
                "from": "18095551234",
                "id": "wamid.3",
                "type": "document",
                "document": {"id": "media-10", "filename": "factura.pdf"}
            }"#,
        ))
        .unwrap();
        assert_eq!(canonical.content, "[document]");
        assert_eq!(canonical.attachments[0].title.as_deref(), Some("factura.pdf"));
    }

    #[test]
    fn test_sticker_stored_as_image() {
        let canonical = normalize(&message(
            r#"{
                "from": "18095551234",
                "id": "wamid.4",
                "type": "sticker",
                "sticker": {"id": "media-11", "mime_type": "image/webp"}
            }"#,
        ))
        .unwrap();
        assert_eq!(canonical.kind, MessageKind::Image);
        assert_eq!(canonical.content, "[sticker]");
    }

    #[test]
    fn test_location_prefers_place_name() {
        let canonical = normalize(&message(
            r#"{
                "from": "18095551234",
                "id": "wamid.5",
                "type": "location",
                "location": {"latitude": 18.47, "longitude": -69.89, "name": "Agora Mall"}
            }"#,
        ))
        .unwrap();
        assert_eq!(canonical.kind, MessageKind::Location);
        assert_eq!(canonical.content, "📍 Agora Mall");
        assert_eq!(canonical.attachments[0].reference, "18.47,-69.89");
    }

    #[test]
    fn test_contact_card_names() {
        let canonical = normalize(&message(
            r#"{
                "from": "18095551234",
                "id": "wamid.6",
                "type": "contacts",
                "contacts": [{"name": {"formatted_name": "Ana Pérez"}}]
            }"#,
        ))
        .unwrap();
        assert_eq!(canonical.kind, MessageKind::Contacts);
        assert_eq!(canonical.content, "[contact] Ana Pérez");
    }

    #[test]
    fn test_reaction_is_skipped() {
        let canonical = normalize(&message(
            r#"{
                "from": "18095551234",
                "id": "wamid.7",
                "type": "reaction",
                "reaction": {"message_id": "wamid.1", "emoji": "👍"}
            }"#,
        ));
        assert!(canonical.is_none());
    }

    #[test]
    fn test_unsupported_type_is_skipped() {
        let canonical = normalize(&message(
            r#"{"from": "18095551234", "id": "wamid.8", "type": "order"}"#,
        ));
        assert!(canonical.is_none());
    }
}
