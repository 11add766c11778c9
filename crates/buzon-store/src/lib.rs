//! # buzon-store
//!
//! Persistent inbox store for Buzón (SQLite-backed): conversations, messages,
//! and encrypted channel credentials.

pub mod crypto;
pub mod store;

pub use crypto::Encryptor;
pub use store::{NewCredential, Store, StoreStats};
