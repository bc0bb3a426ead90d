//! Ingest side: "a channel of decoded RGB frames per video configuration
//! index. No back-signalling from controller to ingester."
//!
//! The real RTSP/HTTP/file decoder lives outside this crate; the Dispatcher
//! only needs something it can poll for the next decoded frame.

use async_trait::async_trait;

use crate::error::DetectResult;

/// A decoded RGB8 frame as handed off by the ingest side, before the
/// Dispatcher has assigned it a `frame_index` (spec §4.1: indices are
/// assigned by the Dispatcher, not the ingester).
pub struct DecodedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// A source of already-decoded RGB frames, handed to the Tile Dispatcher.
/// `next_frame` returning `Ok(None)` signals a clean end of stream (e.g. an
/// offline file finished decoding); the Dispatcher treats that the same as
/// an idle timeout except it does not retry.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn next_frame(&mut self) -> DetectResult<Option<DecodedFrame>>;
}
