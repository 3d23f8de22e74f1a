//! # Shared Types Crate
//!
//! Message envelope, payload entities and the per-topic schema registry
//! shared by the bus and every editor component.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every well-known topic name and payload
//!   shape is declared here, once.
//! - **Envelope Identity**: payloads do not repeat the sender; the
//!   envelope's `sender` field carries it.

pub mod entities;
pub mod envelope;
pub mod topics;

pub use entities::*;
pub use envelope::{Envelope, ReplyTo};
pub use topics::{BroadcastTopic, RequestTopic};
