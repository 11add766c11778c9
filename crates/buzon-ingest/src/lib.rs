//! # buzon-ingest
//!
//! The ingestion core: takes authenticated webhook bodies, resolves the
//! owning tenant, and drives the per-event pipelines that normalize and
//! persist messages, echoes, and delivery receipts.

mod meta;
mod router;
mod whatsapp;

pub use router::{IngestReport, Router};
