//! Wire protocol for tapgate readers.
//!
//! This crate defines:
//! - The message envelope exchanged with the backend
//! - Typed payloads for every routed message type
//! - Key and UID hex codecs shared by the core and the agent

#![forbid(unsafe_code)]

pub mod codec;
pub mod envelope;
pub mod payloads;

pub use envelope::{Envelope, EnvelopeError, EventKind, MessageData};
