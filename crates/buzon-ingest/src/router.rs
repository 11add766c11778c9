//! Webhook body dispatch.
//!
//! One failing entry or event must never poison the rest of a batch, and
//! the caller has already acknowledged the delivery to the provider, so
//! dispatch never fails: every per-event error is logged, counted, and
//! swallowed at the event boundary.

use crate::{meta, whatsapp};
use buzon_core::{
    model::ChannelKind,
    traits::ChannelSender,
    webhook::{MetaEntry, WaEntry, WebhookBody, WebhookObject},
};
use buzon_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome counters for one dispatched webhook body.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Events that changed the store.
    pub handled: u64,
    /// Events intentionally ignored (echo with no thread, reactions,
    /// unknown objects, unresolvable accounts).
    pub skipped: u64,
    /// Events that errored inside the pipeline.
    pub failed: u64,
}

/// Routes webhook bodies to the per-channel pipelines.
pub struct Router {
    pub(crate) store: Store,
    pub(crate) senders: HashMap<ChannelKind, Arc<dyn ChannelSender>>,
}

impl Router {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            senders: HashMap::new(),
        }
    }

    /// Register the sender used for a channel's side effects.
    pub fn register(&mut self, channel: ChannelKind, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(channel, sender);
    }

    pub(crate) fn sender(&self, channel: ChannelKind) -> Option<&Arc<dyn ChannelSender>> {
        self.senders.get(&channel)
    }

    /// Process one authenticated webhook body.
    pub async fn dispatch(&self, body: &WebhookBody) -> IngestReport {
        let mut report = IngestReport::default();

        let channel = match body.classify() {
            WebhookObject::Page => ChannelKind::FacebookDm,
            WebhookObject::Instagram => ChannelKind::InstagramDm,
            WebhookObject::WhatsAppBusiness => {
                for raw in &body.entry {
                    match serde_json::from_value::<WaEntry>(raw.clone()) {
                        Ok(entry) => whatsapp::process_entry(self, entry, &mut report).await,
                        Err(e) => {
                            warn!("Malformed whatsapp entry, skipping: {e}");
                            report.failed += 1;
                        }
                    }
                }
                return report;
            }
            WebhookObject::Unknown => {
                debug!("Ignoring webhook object type: {}", body.object);
                report.skipped += 1;
                return report;
            }
        };

        for raw in &body.entry {
            match serde_json::from_value::<MetaEntry>(raw.clone()) {
                Ok(entry) => meta::process_entry(self, channel, entry, &mut report).await,
                Err(e) => {
                    warn!("Malformed {channel} entry, skipping: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

/// Truncate a message body to an inbox preview.
pub(crate) fn preview(content: &str) -> String {
    const MAX: usize = 140;
    if content.chars().count() <= MAX {
        return content.to_string();
    }
    let cut: String = content.chars().take(MAX).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncation() {
        assert_eq!(preview("hola"), "hola");
        let long = "x".repeat(200);
        let short = preview(&long);
        assert_eq!(short.chars().count(), 141);
        assert!(short.ends_with('…'));
    }
}
