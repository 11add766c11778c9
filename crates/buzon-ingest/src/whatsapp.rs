//! Ingestion pipeline for WhatsApp Cloud API entries.
//!
//! Entry ids are WhatsApp Business Account (WABA) ids; the phone number a
//! change belongs to arrives in the change's metadata. Credential lookup
//! keys on the phone number id first and falls back to the WABA id.

use crate::router::{preview, IngestReport, Router};
use buzon_channels::whatsapp::normalize;
use buzon_core::{
    error::BuzonError,
    model::{
        ChannelKind, ConversationPatch, ConversationSeed, MessageStatus, NewMessage,
        ResolvedCredential,
    },
    webhook::{WaChange, WaEntry, WaMessage, WaStatus},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

pub(crate) async fn process_entry(router: &Router, entry: WaEntry, report: &mut IngestReport) {
    for change in &entry.changes {
        if change.field != "messages" {
            debug!("Skipping whatsapp change field: {}", change.field);
            report.skipped += 1;
            continue;
        }
        process_change(router, &entry.id, change, report).await;
    }
}

async fn process_change(
    router: &Router,
    waba_id: &str,
    change: &WaChange,
    report: &mut IngestReport,
) {
    let event_count = (change.value.messages.len() + change.value.statuses.len()) as u64;

    let Some(metadata) = &change.value.metadata else {
        warn!("whatsapp change without metadata, skipping");
        report.failed += event_count.max(1);
        return;
    };

    let credential = match router
        .store
        .resolve_credential(ChannelKind::Whatsapp, &metadata.phone_number_id, Some(waba_id))
        .await
    {
        Ok(Some(credential)) => credential,
        Ok(None) => {
            warn!(
                "No credential for whatsapp number {} (waba {waba_id}), skipping change",
                metadata.phone_number_id
            );
            report.skipped += event_count;
            return;
        }
        Err(e) => {
            warn!("Credential resolution failed for whatsapp number {}: {e}", metadata.phone_number_id);
            report.failed += event_count;
            return;
        }
    };

    // Push names ride alongside the messages, keyed by wa_id.
    let push_names: HashMap<&str, &str> = change
        .value
        .contacts
        .iter()
        .filter_map(|c| {
            c.profile
                .as_ref()
                .and_then(|p| p.name.as_deref())
                .map(|name| (c.wa_id.as_str(), name))
        })
        .collect();

    for message in &change.value.messages {
        match process_message(router, &credential, message, &push_names).await {
            Ok(true) => report.handled += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                warn!("Failed to process whatsapp message {}: {e}", message.id);
                report.failed += 1;
            }
        }
    }

    for status in &change.value.statuses {
        match process_status(router, &credential, status).await {
            Ok(true) => report.handled += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                warn!("Failed to process whatsapp status for {}: {e}", status.id);
                report.failed += 1;
            }
        }
    }
}

async fn process_message(
    router: &Router,
    credential: &ResolvedCredential,
    message: &WaMessage,
    push_names: &HashMap<&str, &str>,
) -> Result<bool, BuzonError> {
    let Some(canonical) = normalize(message) else {
        return Ok(false);
    };
    let participant_id = &message.from;
    let push_name = push_names.get(participant_id.as_str()).copied();

    let seed = ConversationSeed {
        participant_id: participant_id.clone(),
        contact_name: push_name
            .map(str::to_string)
            .or_else(|| Some(participant_id.clone())),
        contact_avatar: None,
        assigned_user_id: credential.user_id.clone(),
        metadata: None,
    };
    let (conversation, _created) = router
        .store
        .find_or_create_conversation(
            &credential.tenant_id,
            ChannelKind::Whatsapp,
            participant_id,
            &seed,
        )
        .await?;

    let content = canonical.content.clone();
    let mut fields = NewMessage::inbound(participant_id, canonical).with_external_id(&message.id);
    if let Some(name) = push_name {
        fields = fields.with_sender_name(name);
    }
    if let Some(reply_to) = message.context.as_ref().and_then(|c| c.id.as_deref()) {
        fields = fields.with_metadata(serde_json::json!({ "reply_to": reply_to }));
    }

    let Some(_stored) = router
        .store
        .record_external_message(&credential.tenant_id, &conversation.id, &fields)
        .await?
    else {
        debug!("Message {} already recorded, dropping redelivery", message.id);
        return Ok(false);
    };

    let patch = ConversationPatch {
        last_message_at: Some(event_time(&message.timestamp)),
        last_message_preview: Some(preview(&content)),
        increment_unread: true,
        ..Default::default()
    };
    router
        .store
        .update_conversation(&credential.tenant_id, &conversation.id, &patch)
        .await?;

    // Best-effort read receipt, addressed by message id on this channel.
    if let Some(sender) = router.sender(ChannelKind::Whatsapp) {
        if let Err(e) = sender
            .mark_read(
                &credential.access_token,
                &credential.external_account_id,
                &message.id,
            )
            .await
        {
            warn!("mark_read failed for whatsapp message {}: {e}", message.id);
        }
    }

    Ok(true)
}

async fn process_status(
    router: &Router,
    credential: &ResolvedCredential,
    status: &WaStatus,
) -> Result<bool, BuzonError> {
    let target = match status.status.as_str() {
        "sent" => MessageStatus::Sent,
        "delivered" => MessageStatus::Delivered,
        "read" => MessageStatus::Read,
        "failed" => MessageStatus::Failed,
        other => {
            debug!("Skipping unknown whatsapp status: {other}");
            return Ok(false);
        }
    };

    let detail = if target == MessageStatus::Failed {
        status.errors.first().map(|e| e.detail())
    } else {
        None
    };

    router
        .store
        .apply_status_receipt(&credential.tenant_id, &status.id, target, detail.as_deref())
        .await
}

/// WhatsApp timestamps are epoch seconds as a string.
fn event_time(timestamp: &str) -> DateTime<Utc> {
    timestamp
        .parse::<i64>()
        .ok()
        .filter(|secs| *secs > 0)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}
