//! # buzon-channels
//!
//! Provider-specific pieces of the inbox: payload normalizers that turn
//! Meta and WhatsApp webhook messages into the canonical shape, and Graph
//! API clients for profile lookups and read receipts.

pub mod graph;
pub mod meta;
pub mod whatsapp;
