//! Ingestion pipeline for Facebook Messenger and Instagram Direct entries.
//!
//! Entry ids are page ids (Messenger) or Instagram business account ids,
//! and each entry carries a batch of messaging events: inbound messages,
//! echoes of the page's own sends, delivery receipts, and read watermarks.

use crate::router::{preview, IngestReport, Router};
use buzon_channels::meta::normalize;
use buzon_core::{
    error::BuzonError,
    model::{
        ChannelKind, ConversationPatch, ConversationSeed, MessageStatus, NewMessage,
        ResolvedCredential,
    },
    traits::UserProfile,
    webhook::{MessagingEvent, MetaEntry},
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

enum Outcome {
    Handled,
    Skipped,
}

pub(crate) async fn process_entry(
    router: &Router,
    channel: ChannelKind,
    entry: MetaEntry,
    report: &mut IngestReport,
) {
    if entry.messaging.is_empty() {
        debug!("Entry {} for {channel} has no messaging events", entry.id);
        return;
    }

    let credential = match router.store.resolve_credential(channel, &entry.id, None).await {
        Ok(Some(credential)) => credential,
        Ok(None) => {
            warn!("No credential for {channel} account {}, skipping entry", entry.id);
            report.skipped += entry.messaging.len() as u64;
            return;
        }
        Err(e) => {
            warn!("Credential resolution failed for {channel} account {}: {e}", entry.id);
            report.failed += entry.messaging.len() as u64;
            return;
        }
    };

    for event in &entry.messaging {
        match process_event(router, channel, &credential, event).await {
            Ok(Outcome::Handled) => report.handled += 1,
            Ok(Outcome::Skipped) => report.skipped += 1,
            Err(e) => {
                warn!("Failed to process {channel} event for tenant {}: {e}", credential.tenant_id);
                report.failed += 1;
            }
        }
    }
}

async fn process_event(
    router: &Router,
    channel: ChannelKind,
    credential: &ResolvedCredential,
    event: &MessagingEvent,
) -> Result<Outcome, BuzonError> {
    if let Some(message) = &event.message {
        if message.is_echo {
            return process_echo(router, channel, credential, event).await;
        }
        return process_inbound(router, channel, credential, event).await;
    }

    if let Some(delivery) = &event.delivery {
        let mut applied = false;
        for mid in &delivery.mids {
            applied |= router
                .store
                .apply_status_receipt(&credential.tenant_id, mid, MessageStatus::Delivered, None)
                .await?;
        }
        return Ok(if applied { Outcome::Handled } else { Outcome::Skipped });
    }

    if event.read.is_some() {
        // Read watermarks come from the participant, so the sender id keys
        // the conversation.
        let Some(conversation) = router
            .store
            .find_conversation(&credential.tenant_id, channel, &event.sender.id)
            .await?
        else {
            debug!("Read watermark for unknown {channel} thread {}", event.sender.id);
            return Ok(Outcome::Skipped);
        };
        let advanced = router
            .store
            .apply_read_watermark(&credential.tenant_id, &conversation.id)
            .await?;
        return Ok(if advanced > 0 { Outcome::Handled } else { Outcome::Skipped });
    }

    if event.reaction.is_some() {
        debug!("Skipping {channel} reaction event");
        return Ok(Outcome::Skipped);
    }

    debug!("Skipping {channel} event with no recognized payload");
    Ok(Outcome::Skipped)
}

/// An echo mirrors a send from the page side: sender is the page, recipient
/// is the participant whose thread it belongs to.
async fn process_echo(
    router: &Router,
    channel: ChannelKind,
    credential: &ResolvedCredential,
    event: &MessagingEvent,
) -> Result<Outcome, BuzonError> {
    let message = event.message.as_ref().ok_or_else(|| {
        BuzonError::Payload("echo event without message".to_string())
    })?;
    let participant_id = &event.recipient.id;

    // Echoes never open threads. An echo for a participant we have never
    // tracked (e.g. a reply typed in the provider's own inbox before any
    // inbound message) is dropped.
    let Some(conversation) = router
        .store
        .find_conversation(&credential.tenant_id, channel, participant_id)
        .await?
    else {
        debug!("Echo for untracked {channel} thread {participant_id}, dropping");
        return Ok(Outcome::Skipped);
    };

    let canonical = normalize(message);
    let content = canonical.content.clone();
    let fields = NewMessage::outbound(&event.sender.id, canonical).with_external_id(&message.mid);

    let Some(_recorded) = router
        .store
        .record_external_message(&credential.tenant_id, &conversation.id, &fields)
        .await?
    else {
        debug!("Echo {} already recorded, dropping", message.mid);
        return Ok(Outcome::Skipped);
    };

    let patch = ConversationPatch {
        last_message_at: Some(event_time(event.timestamp)),
        last_message_preview: Some(preview(&content)),
        ..Default::default()
    };
    router
        .store
        .update_conversation(&credential.tenant_id, &conversation.id, &patch)
        .await?;

    Ok(Outcome::Handled)
}

async fn process_inbound(
    router: &Router,
    channel: ChannelKind,
    credential: &ResolvedCredential,
    event: &MessagingEvent,
) -> Result<Outcome, BuzonError> {
    let message = event.message.as_ref().ok_or_else(|| {
        BuzonError::Payload("inbound event without message".to_string())
    })?;
    let participant_id = &event.sender.id;

    // Best-effort profile enrichment. A slow or broken lookup degrades to
    // the raw external id; a later event upgrades the display fields.
    let profile = match router.sender(channel) {
        Some(sender) => sender
            .get_user_profile(&credential.access_token, participant_id)
            .await
            .unwrap_or_else(|e| {
                warn!("Profile lookup failed for {channel} contact {participant_id}: {e}");
                UserProfile::default()
            }),
        None => UserProfile::default(),
    };

    let seed = ConversationSeed {
        participant_id: participant_id.clone(),
        contact_name: profile.name.clone().or_else(|| Some(participant_id.clone())),
        contact_avatar: profile.avatar_url.clone(),
        assigned_user_id: credential.user_id.clone(),
        metadata: None,
    };
    let (conversation, _created) = router
        .store
        .find_or_create_conversation(&credential.tenant_id, channel, participant_id, &seed)
        .await?;

    let canonical = normalize(message);
    let content = canonical.content.clone();
    let mut fields = NewMessage::inbound(participant_id, canonical).with_external_id(&message.mid);
    if let Some(name) = &profile.name {
        fields = fields.with_sender_name(name);
    }
    if let Some(reply_to) = &message.reply_to {
        fields = fields.with_metadata(serde_json::json!({ "reply_to": reply_to.mid }));
    }

    let Some(_stored) = router
        .store
        .record_external_message(&credential.tenant_id, &conversation.id, &fields)
        .await?
    else {
        debug!("Message {} already recorded, dropping redelivery", message.mid);
        return Ok(Outcome::Skipped);
    };

    let patch = ConversationPatch {
        last_message_at: Some(event_time(event.timestamp)),
        last_message_preview: Some(preview(&content)),
        increment_unread: true,
        ..Default::default()
    };
    router
        .store
        .update_conversation(&credential.tenant_id, &conversation.id, &patch)
        .await?;

    // Best-effort read receipt back to the provider.
    if let Some(sender) = router.sender(channel) {
        if let Err(e) = sender
            .mark_read(
                &credential.access_token,
                &credential.external_account_id,
                participant_id,
            )
            .await
        {
            warn!("mark_read failed for {channel} thread {participant_id}: {e}");
        }
    }

    Ok(Outcome::Handled)
}

/// Meta timestamps are epoch milliseconds; zero or garbage falls back to now.
fn event_time(timestamp_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(timestamp_ms)
        .filter(|_| timestamp_ms > 0)
        .unwrap_or_else(Utc::now)
}
