//! # Event Emitter
//!
//! Formats `detect`/`detect_empty` messages and hands them to the external
//! [`MessageTransport`] (spec §4.7). The Reconstructor only ever pushes
//! into this task's bounded inbox; the transport's own latency never
//! back-pressures detection.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::external::MessageTransport;
use crate::lifecycle::ShutdownToken;
use crate::model::DetectMessage;

pub struct EventEmitter {
    channel: usize,
    transport: Arc<dyn MessageTransport>,
}

impl EventEmitter {
    pub fn new(channel: usize, transport: Arc<dyn MessageTransport>) -> Self {
        Self { channel, transport }
    }

    /// Drains `inbox` until it closes or shutdown fires; on shutdown it
    /// keeps draining whatever is already queued before exiting, since a
    /// message already enqueued represents a detection the Reconstructor
    /// considers final (spec §4.8's "best effort" grace period applied to
    /// the Emitter's own outbox).
    pub async fn run(self, mut inbox: mpsc::Receiver<DetectMessage>, mut shutdown: ShutdownToken) {
        crate::log_line!(self.channel, "emitter", "starting");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    inbox.close();
                    while let Some(msg) = inbox.recv().await {
                        self.transport.send(msg).await;
                    }
                    break;
                }
                maybe = inbox.recv() => {
                    match maybe {
                        Some(msg) => self.transport.send(msg).await,
                        None => break,
                    }
                }
            }
        }
        crate::log_line!(self.channel, "emitter", "drained, exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rectangle;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingTransport {
        received: Mutex<Vec<DetectMessage>>,
    }

    #[async_trait]
    impl MessageTransport for RecordingTransport {
        async fn send(&self, message: DetectMessage) {
            self.received.lock().unwrap().push(message);
        }
    }

    #[tokio::test]
    async fn drains_queued_messages_then_exits_when_channel_closes() {
        let transport = Arc::new(RecordingTransport { received: Mutex::new(Vec::new()) });
        let emitter = EventEmitter::new(0, transport.clone());
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_handle, shutdown) = crate::lifecycle::test_support::new_shutdown();

        tx.send(DetectMessage::Detect {
            video_stream: "rtsp://cam/1".into(),
            channel: 0,
            timestamp: 1,
            rects: vec![Rectangle::new(0, 0, 1, 1)],
            dol_id: 10000,
        })
        .await
        .unwrap();
        drop(tx);

        emitter.run(rx, shutdown).await;
        assert_eq!(transport.received.lock().unwrap().len(), 1);
    }
}
