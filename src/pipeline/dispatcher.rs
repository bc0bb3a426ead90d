//! # Tile Dispatcher
//!
//! Frame ingestion, cache writes, the pre-cache warm-up / sample-rate
//! cursor, and tile fan-out to the Motion Workers (spec §4.1). Also the
//! only component allowed to drop work under backpressure: a per-tile send
//! deadline turns a stalled Motion Worker into a dropped tile-set instead
//! of a stalled ingest loop (spec §5, §7.1).
//!
//! SSD mode (spec §4.3 "Alternate gate mode") skips tiling entirely — the
//! Dispatcher hands the whole preprocessed frame straight to the
//! Reconstructor instead of fanning out to Motion Workers.

use std::time::Duration;

use cap_scale::grid::split_grid;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::cache::FrameCache;
use crate::config::ChannelConfig;
use crate::external::FrameSource;
use crate::lifecycle::ShutdownToken;
use crate::model::{DetectMode, Frame, Tile};

/// Resizes to `(w, h)` and optionally blurs, mirroring the preprocessing
/// step every Motion Worker / SSD detector then runs on (spec §4.1).
fn preprocess(frame: &Frame, w: u32, h: u32, blur_radius: f32) -> image::RgbImage {
    let resized = image::imageops::resize(&frame.to_rgb_image(), w, h, image::imageops::FilterType::Triangle);
    if blur_radius > 0.0 {
        image::imageops::blur(&resized, blur_radius)
    } else {
        resized
    }
}

pub struct TileDispatcher {
    cfg: ChannelConfig,
    cache: FrameCache,
    /// Row-major `(row, col)` Motion Worker inboxes, length `rows * cols`.
    /// Unused in SSD mode.
    tile_txs: Vec<mpsc::Sender<Tile>>,
    ssd_tx: mpsc::Sender<(u64, image::RgbImage)>,
}

impl TileDispatcher {
    pub fn new(
        cfg: ChannelConfig,
        cache: FrameCache,
        tile_txs: Vec<mpsc::Sender<Tile>>,
        ssd_tx: mpsc::Sender<(u64, image::RgbImage)>,
    ) -> Self {
        if cfg.detect_mode == DetectMode::Classify {
            assert_eq!(tile_txs.len(), cfg.tile_count() as usize);
        }
        Self { cfg, cache, tile_txs, ssd_tx }
    }

    /// Runs until `source` ends, its channel closes, or shutdown fires.
    /// `restream_tx`, when `push_stream` is enabled, receives every
    /// accepted raw frame (not just the sampled subset detection runs on)
    /// — the Annotated Re-streamer re-encodes at full rate (spec §4.6).
    pub async fn run(
        self,
        mut source: Box<dyn FrameSource>,
        restream_tx: Option<mpsc::Sender<Frame>>,
        mut shutdown: ShutdownToken,
    ) {
        let mut frame_cnt: u64 = 0;
        let mut processed_cnt: u64 = 0;
        let idle_timeout = Duration::from_millis(self.cfg.ingest_idle_timeout_ms);
        let tile_deadline = Duration::from_millis(self.cfg.tile_send_deadline_ms);

        loop {
            if shutdown.is_triggered() {
                break;
            }
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = timeout(idle_timeout, source.next_frame()) => result,
            };
            let decoded = match next {
                Ok(Ok(Some(decoded))) => decoded,
                Ok(Ok(None)) => {
                    crate::log_line!(self.cfg.channel, "dispatcher", "ingest source ended");
                    break;
                }
                Ok(Err(e)) => {
                    crate::log_line!(self.cfg.channel, "dispatcher", "ingest error: {e}");
                    continue;
                }
                Err(_) => {
                    crate::log_line!(self.cfg.channel, "dispatcher", "ingest idle beyond {idle_timeout:?}, continuing");
                    continue;
                }
            };

            frame_cnt += 1;
            let frame = Frame::new(decoded.data, decoded.width, decoded.height, frame_cnt);

            if let Some(tx) = &restream_tx {
                // Blocking send by design — the Dispatcher is only
                // permitted to drop on the per-tile deadline below, not here
                // (spec §5).
                let _ = tx.send(frame.clone()).await;
            }
            self.cache.insert(frame);

            if self.cache.needs_eviction() {
                let cache = self.cache.clone();
                tokio::spawn(async move {
                    cache.evict_oldest_half();
                });
            }

            if frame_cnt <= self.cfg.pre_cache {
                continue; // warm-up: cache fills, nothing dispatched yet
            }

            processed_cnt += 1;
            if processed_cnt % self.cfg.sample_rate != 0 {
                continue;
            }

            let Some(frame) = self.cache.get(processed_cnt) else {
                continue; // evicted before its sampled turn came up
            };

            match self.cfg.detect_mode {
                DetectMode::Classify => {
                    if let Err(reason) = self.dispatch_tiles(&frame, tile_deadline).await {
                        crate::log_line!(
                            self.cfg.channel,
                            "dispatcher",
                            "dropped tile-set for frame {} ({reason})",
                            frame.frame_index
                        );
                        self.cache.record_drop();
                    }
                }
                DetectMode::Ssd => {
                    let (w, h) = self.cfg.shape;
                    let preprocessed = preprocess(&frame, w, h, self.cfg.blur_radius);
                    if self.ssd_tx.send((frame.frame_index, preprocessed)).await.is_err() {
                        crate::log_line!(self.cfg.channel, "dispatcher", "reconstructor channel closed");
                        break;
                    }
                }
            }
        }
    }

    /// Preprocesses the frame, splits it into the configured grid, and
    /// hands one tile to each Motion Worker — atomically, all-or-none: a
    /// channel permit is reserved on every worker before any tile is sent,
    /// so a deadline miss on tile N never leaves tiles `0..N-1` already
    /// delivered (spec §4.1, §7.1).
    async fn dispatch_tiles(&self, frame: &Frame, deadline: Duration) -> Result<(), &'static str> {
        let (shape_w, shape_h) = self.cfg.shape;
        let preprocessed = preprocess(frame, shape_w, shape_h, self.cfg.blur_radius);
        let grid = split_grid(shape_w, shape_h, self.cfg.rows, self.cfg.cols);

        let mut permits = Vec::with_capacity(grid.len());
        for (row, col, _) in &grid {
            let idx = (*row * self.cfg.cols + *col) as usize;
            match timeout(deadline, self.tile_txs[idx].reserve()).await {
                Ok(Ok(permit)) => permits.push(permit),
                Ok(Err(_)) => return Err("motion worker channel closed"),
                Err(_) => return Err("per-tile send deadline exceeded"),
            }
        }

        for ((row, col, rect), permit) in grid.into_iter().zip(permits) {
            let cropped = image::imageops::crop_imm(&preprocessed, rect.x, rect.y, rect.w, rect.h).to_image();
            let tile = Tile::from_frame(frame, row, col, rect.x, rect.y, rect.w, rect.h).with_image(cropped);
            permit.send(tile);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::DecodedFrame;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        total: u64,
        emitted: Arc<AtomicU64>,
    }

    #[async_trait]
    impl FrameSource for CountingSource {
        async fn next_frame(&mut self) -> crate::error::DetectResult<Option<DecodedFrame>> {
            let n = self.emitted.fetch_add(1, Ordering::SeqCst);
            if n >= self.total {
                return Ok(None);
            }
            Ok(Some(DecodedFrame {
                data: vec![20u8; 16 * 16 * 3],
                width: 16,
                height: 16,
            }))
        }
    }

    fn test_cfg() -> ChannelConfig {
        let mut cfg = ChannelConfig::default();
        cfg.shape = (16, 16);
        cfg.rows = 2;
        cfg.cols = 2;
        cfg.sample_rate = 1;
        cfg.pre_cache = 0;
        cfg.max_cache = 100;
        cfg.pre_frames = 1;
        cfg.future_frames = 1;
        cfg
    }

    #[tokio::test]
    async fn dispatches_one_tile_per_grid_cell_per_sampled_frame() {
        let cfg = test_cfg();
        let cache = FrameCache::new(cfg.max_cache);
        let mut tile_txs = Vec::new();
        let mut tile_rxs = Vec::new();
        for _ in 0..4 {
            let (tx, rx) = mpsc::channel(8);
            tile_txs.push(tx);
            tile_rxs.push(rx);
        }
        let (ssd_tx, _ssd_rx) = mpsc::channel(1);
        let dispatcher = TileDispatcher::new(cfg, cache, tile_txs, ssd_tx);
        let source: Box<dyn FrameSource> = Box::new(CountingSource {
            total: 3,
            emitted: Arc::new(AtomicU64::new(0)),
        });
        let (_shutdown_handle, shutdown) = crate::lifecycle::test_support::new_shutdown();
        dispatcher.run(source, None, shutdown).await;

        for mut rx in tile_rxs {
            assert_eq!(rx.recv().await.unwrap().frame_index, 1);
            assert_eq!(rx.recv().await.unwrap().frame_index, 2);
            assert_eq!(rx.recv().await.unwrap().frame_index, 3);
        }
    }
}
