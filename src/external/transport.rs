//! Outbound messaging transport: "the transport is responsible for its own
//! retry/backoff. The Emitter never blocks the Reconstructor" (spec §4.7).

use async_trait::async_trait;

use crate::model::DetectMessage;

/// Receives finished [`DetectMessage`]s from the Event Emitter's outbox.
/// Implementations own whatever WebSocket/HTTP client actually ships the
/// JSON; this crate only guarantees delivery into the bounded outbox.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, message: DetectMessage);
}
