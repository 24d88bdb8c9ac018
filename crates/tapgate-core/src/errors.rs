//! Error types for tapgate core.
//!
//! Per-concern enums live next to the code that raises them; this module
//! provides the umbrella error for callers that cross module boundaries.

use thiserror::Error;

pub use crate::store::StoreError;
pub use crate::transport::TransportError;
pub use tapgate_proto::EnvelopeError;

/// Umbrella error for operations that span transport, storage, and wire
/// decoding. Steady-state tick processing never surfaces these to the
/// scheduling loop; they appear only on explicit operations such as boot.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}
