//! # buzon-core
//!
//! Core types, canonical message model, wire payloads, configuration, and
//! error handling for the Buzón inbox core.

pub mod config;
pub mod error;
pub mod model;
pub mod traits;
pub mod webhook;
