//! Normalization for Facebook Messenger and Instagram Direct messages.
//!
//! Both channels share the Messenger Platform payload shape, so one
//! normalizer covers the two.

use buzon_core::model::{Attachment, CanonicalMessage, MessageKind};
use buzon_core::webhook::{MetaAttachment, MetaMessage};
use tracing::debug;

/// Turn a Messenger Platform message into the canonical shape.
///
/// The kind follows the first attachment when attachments are present,
/// text otherwise. Messages with no textual body get a bracketed marker
/// as their display content so the inbox preview is never empty.
pub fn normalize(message: &MetaMessage) -> CanonicalMessage {
    let attachments: Vec<Attachment> = message.attachments.iter().map(attachment).collect();

    let kind = attachments
        .first()
        .map(|a| a.kind)
        .unwrap_or(MessageKind::Text);

    let plain_content = message
        .text
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let content = match &plain_content {
        Some(text) => text.clone(),
        None => synthesize_content(kind, message),
    };

    CanonicalMessage {
        kind,
        content,
        plain_content,
        attachments,
    }
}

fn attachment(raw: &MetaAttachment) -> Attachment {
    let kind = match raw.kind.as_str() {
        "image" => MessageKind::Image,
        "video" => MessageKind::Video,
        "audio" => MessageKind::Audio,
        "file" => MessageKind::Document,
        "location" => MessageKind::Location,
        other => {
            // "fallback", "template" and future types degrade to a document.
            debug!("Unrecognized attachment type {other}, treating as document");
            MessageKind::Document
        }
    };

    let payload = raw.payload.as_ref();
    let reference = payload
        .and_then(|p| p.url.clone())
        .or_else(|| {
            payload
                .and_then(|p| p.coordinates.as_ref())
                .map(|c| format!("{},{}", c.lat, c.lng))
        })
        .unwrap_or_default();

    Attachment {
        kind,
        reference,
        mime: None,
        title: payload.and_then(|p| p.title.clone()),
    }
}

fn synthesize_content(kind: MessageKind, message: &MetaMessage) -> String {
    if kind == MessageKind::Location {
        if let Some(coords) = message
            .attachments
            .first()
            .and_then(|a| a.payload.as_ref())
            .and_then(|p| p.coordinates.as_ref())
        {
            return format!("📍 {}, {}", coords.lat, coords.lng);
        }
    }
    kind.marker()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: &str) -> MetaMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_plain_text() {
        let canonical = normalize(&message(r#"{"mid": "m_1", "text": "Hola, ¿está disponible?"}"#));
        assert_eq!(canonical.kind, MessageKind::Text);
        assert_eq!(canonical.content, "Hola, ¿está disponible?");
        assert_eq!(canonical.plain_content.as_deref(), Some("Hola, ¿está disponible?"));
        assert!(canonical.attachments.is_empty());
    }

    #[test]
    fn test_image_without_caption_gets_marker() {
        let canonical = normalize(&message(
            r#"{
                "mid": "m_2",
                "attachments": [
                    {"type": "image", "payload": {"url": "https://cdn.example.com/a.jpg"}}
                ]
            }"#,
        ));
        assert_eq!(canonical.kind, MessageKind::Image);
        assert_eq!(canonical.content, "[image]");
        assert!(canonical.plain_content.is_none());
        assert_eq!(canonical.attachments[0].reference, "https://cdn.example.com/a.jpg");
    }

    #[test]
    fn test_image_with_caption_keeps_text() {
        let canonical = normalize(&message(
            r#"{
                "mid": "m_3",
                "text": "mira esto",
                "attachments": [
                    {"type": "image", "payload": {"url": "https://cdn.example.com/b.jpg"}}
                ]
            }"#,
        ));
        assert_eq!(canonical.kind, MessageKind::Image);
        assert_eq!(canonical.content, "mira esto");
    }

    #[test]
    fn test_location_synthesizes_coordinates() {
        let canonical = normalize(&message(
            r#"{
                "mid": "m_4",
                "attachments": [
                    {"type": "location", "payload": {"coordinates": {"lat": 18.47, "long": -69.89}}}
                ]
            }"#,
        ));
        assert_eq!(canonical.kind, MessageKind::Location);
        assert_eq!(canonical.content, "📍 18.47, -69.89");
        assert_eq!(canonical.attachments[0].reference, "18.47,-69.89");
    }

    #[test]
    fn test_unknown_attachment_degrades_to_document() {
        let canonical = normalize(&message(
            r#"{"mid": "m_5", "attachments": [{"type": "fallback"}]}"#,
        ));
        assert_eq!(canonical.kind, MessageKind::Document);
        assert_eq!(canonical.content, "[document]");
    }
}
