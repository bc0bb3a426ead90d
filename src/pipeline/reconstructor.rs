//! # Reconstructor
//!
//! Joins tile results (or takes an already-preprocessed full frame in SSD
//! mode) back into one classifier/SSD call per sampled frame index, applies
//! the noise-discard and de-duplication rules, advances the
//! [`TrackSession`], and fans the decision out to the Event Recorder, the
//! Event Emitter, the Annotated Re-streamer, and the Render Cache (spec
//! §4.3). The only piece of cross-frame state here — `TrackSession` and
//! `last_detection` — lives on this task alone (spec §9).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use cap_rtsp::BgraFrame;

use crate::cache::{FrameCache, RenderCache};
use crate::config::ChannelConfig;
use crate::external::DetectFullFrame;
use crate::lifecycle::ShutdownToken;
use crate::model::{DetectMessage, DetectionResult, Frame, Rectangle, TileResult, TrackSession};

use super::dedup::Deduplicator;
use super::motion::MotionConfig;
use super::recorder::RecorderNotice;
use super::restreamer::draw_rect_bgra;

/// Cache-miss retry budget for fetching a sampled frame back out of the
/// Frame Cache (spec §7.2, §4.1).
const CACHE_MISS_RETRIES: u32 = 24;
const CACHE_MISS_RETRY_DELAY: Duration = Duration::from_millis(100);

fn is_noisy(tiles: &[TileResult], cfg: &ChannelConfig) -> bool {
    tiles.iter().any(|t| t.rects.len() >= cfg.max_rects_per_frame)
}

fn epoch_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

pub struct Reconstructor {
    cfg: ChannelConfig,
    frame_cache: FrameCache,
    render_cache: Option<RenderCache>,
    gate: Arc<dyn DetectFullFrame>,
    target_class: String,
    motion_cfg: MotionConfig,
    recorder_tx: mpsc::Sender<RecorderNotice>,
    emitter_tx: mpsc::Sender<DetectMessage>,
    restream_detect_tx: Option<mpsc::Sender<DetectionResult>>,
    dedup: Deduplicator,
    last_detection: i64,
}

impl Reconstructor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: ChannelConfig,
        frame_cache: FrameCache,
        render_cache: Option<RenderCache>,
        gate: Arc<dyn DetectFullFrame>,
        target_class: String,
        motion_cfg: MotionConfig,
        recorder_tx: mpsc::Sender<RecorderNotice>,
        emitter_tx: mpsc::Sender<DetectMessage>,
        restream_detect_tx: Option<mpsc::Sender<DetectionResult>>,
    ) -> Self {
        let dedup = Deduplicator::new(&cfg);
        Self {
            cfg,
            frame_cache,
            render_cache,
            gate,
            target_class,
            motion_cfg,
            recorder_tx,
            emitter_tx,
            restream_detect_tx,
            dedup,
            last_detection: -1,
        }
    }

    /// `CLASSIFY` mode: joins `TileResult`s per `frame_index` until
    /// `R * C` have arrived, then decides the frame (spec §4.3 steps 1-2).
    pub async fn run_tiled(mut self, mut tile_rx: mpsc::Receiver<TileResult>, mut shutdown: ShutdownToken) {
        let mut session = TrackSession::new(self.cfg.initial_dol_id);
        let tile_count = self.cfg.tile_count() as usize;
        let mut pending: HashMap<u64, Vec<TileResult>> = HashMap::new();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                maybe = tile_rx.recv() => {
                    match maybe {
                        Some(result) => {
                            let frame_index = result.frame_index;
                            let bucket = pending.entry(frame_index).or_default();
                            bucket.push(result);
                            if bucket.len() == tile_count {
                                let tiles = pending.remove(&frame_index).unwrap();
                                if is_noisy(&tiles, &self.cfg) {
                                    // Discarded before ever touching the Frame Cache
                                    // (spec §4.3 step 2).
                                    self.finalize(&mut session, frame_index, None, DetectionResult::empty(frame_index)).await;
                                } else {
                                    let candidates: Vec<Rectangle> =
                                        tiles.iter().flat_map(|t| t.rects.iter().copied()).collect();
                                    self.gate_and_decide_classify(&mut session, frame_index, candidates).await;
                                }
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    }

    /// `SSD` mode: one already-preprocessed full frame per message, no
    /// tile-joining (spec §4.3 "Alternate gate mode").
    pub async fn run_full_frame(
        mut self,
        mut ssd_rx: mpsc::Receiver<(u64, image::RgbImage)>,
        mut shutdown: ShutdownToken,
    ) {
        let mut session = TrackSession::new(self.cfg.initial_dol_id);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                maybe = ssd_rx.recv() => {
                    match maybe {
                        Some((frame_index, preprocessed)) => {
                            self.gate_and_decide_ssd(&mut session, frame_index, preprocessed).await;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    async fn gate_and_decide_classify(&mut self, session: &mut TrackSession, frame_index: u64, candidates: Vec<Rectangle>) {
        if candidates.is_empty() {
            // No motion anywhere in the frame: nothing to classify.
            self.finalize(session, frame_index, None, DetectionResult::empty(frame_index)).await;
            return;
        }
        let Some(frame) = self.fetch_with_retry(frame_index).await else {
            self.finalize(session, frame_index, None, DetectionResult::empty(frame_index)).await;
            return;
        };
        let rgb = frame.to_rgb_image();
        let result = match self.gate.detect_full_frame(&rgb, &candidates, &self.target_class).await {
            Ok(pairs) if !pairs.is_empty() => {
                let (rects, scores) = pairs.into_iter().unzip();
                DetectionResult { frame_index, rects, scores, detect_flag: true }
            }
            Ok(_) => DetectionResult::empty(frame_index),
            Err(e) => {
                crate::log_line!(self.cfg.channel, "reconstructor", "classifier gate failed: {e}");
                DetectionResult::empty(frame_index)
            }
        };
        self.finalize(session, frame_index, Some(frame), result).await;
    }

    async fn gate_and_decide_ssd(&mut self, session: &mut TrackSession, frame_index: u64, preprocessed: image::RgbImage) {
        let result = match self.gate.detect_full_frame(&preprocessed, &[], &self.target_class).await {
            Ok(pairs) if !pairs.is_empty() => {
                let (rects, scores) = pairs.into_iter().unzip();
                DetectionResult { frame_index, rects, scores, detect_flag: true }
            }
            Ok(_) => DetectionResult::empty(frame_index),
            Err(e) => {
                crate::log_line!(self.cfg.channel, "reconstructor", "SSD gate failed: {e}");
                DetectionResult::empty(frame_index)
            }
        };
        let frame = self.fetch_with_retry(frame_index).await;
        self.finalize(session, frame_index, frame, result).await;
    }

    /// Applies de-duplication, advances the track session, and notifies
    /// every downstream consumer. `frame` is `None` when the frame was
    /// discarded as noise or evicted before its sampled turn came up — in
    /// that case rendering/dedup are skipped but the Recorder still learns
    /// the frame index was decided.
    async fn finalize(&mut self, session: &mut TrackSession, frame_index: u64, frame: Option<Frame>, mut result: DetectionResult) {
        let was_positive_before_suppression = result.is_positive();
        if was_positive_before_suppression {
            if let (Some(frame), Some(&primary)) = (&frame, result.rects.first()) {
                if self.dedup.in_suppression_window(frame_index, self.last_detection) {
                    let clamped = primary.clamped(frame.width, frame.height);
                    let crop = frame.crop_rgb(clamped.x, clamped.y, clamped.w, clamped.h);
                    if self.dedup.should_suppress(&self.frame_cache, frame_index, primary, &crop, &self.motion_cfg) {
                        result.detect_flag = false;
                    }
                }
            }
        }

        let timestamp = frame.as_ref().map(|f| epoch_ms(f.arrived_at)).unwrap_or(frame_index);

        // A suppressed positive is still a positive for `last_detection`
        // tracking purposes — only the reporting (Detect/Trigger) is muted.
        if was_positive_before_suppression {
            self.last_detection = frame_index as i64;
        }

        if result.is_positive() {
            session.mark_present();
            let _ = self
                .recorder_tx
                .send(RecorderNotice::Trigger { frame_index, rects: result.rects.clone() })
                .await;
            let _ = self
                .emitter_tx
                .send(DetectMessage::Detect {
                    video_stream: self.cfg.video_stream.clone(),
                    channel: self.cfg.channel,
                    timestamp,
                    rects: result.rects.clone(),
                    dol_id: session.dol_id(),
                })
                .await;
        } else if let Some(dol_id) = session.mark_absent() {
            let _ = self
                .emitter_tx
                .send(DetectMessage::DetectEmpty {
                    video_stream: self.cfg.video_stream.clone(),
                    channel: self.cfg.channel,
                    timestamp,
                    dol_id,
                })
                .await;
        }

        if let (Some(render_cache), Some(frame)) = (&self.render_cache, &frame) {
            let mut bgra = frame.to_bgra();
            if result.is_positive() {
                for r in &result.rects {
                    draw_rect_bgra(&mut bgra, frame.width, frame.height, *r, [0, 220, 0, 255]);
                }
            }
            render_cache.insert(
                frame_index,
                BgraFrame {
                    data: Arc::new(bgra),
                    width: frame.width,
                    height: frame.height,
                    stride: frame.width as usize * 4,
                    pts_ns: None,
                },
            );
        }

        if let Some(tx) = &self.restream_detect_tx {
            let _ = tx.send(result.clone()).await;
        }

        let _ = self.recorder_tx.send(RecorderNotice::FrameCompleted { frame_index }).await;
    }

    async fn fetch_with_retry(&self, frame_index: u64) -> Option<Frame> {
        for attempt in 0..=CACHE_MISS_RETRIES {
            if let Some(frame) = self.frame_cache.get(frame_index) {
                return Some(frame);
            }
            if attempt == CACHE_MISS_RETRIES {
                break;
            }
            tokio::time::sleep(CACHE_MISS_RETRY_DELAY).await;
        }
        crate::log_line!(
            self.cfg.channel,
            "reconstructor",
            "cache miss for frame {frame_index} after {CACHE_MISS_RETRIES} retries"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeGate {
        calls: AtomicUsize,
        positive: bool,
    }

    #[async_trait]
    impl DetectFullFrame for FakeGate {
        async fn detect_full_frame(
            &self,
            _frame: &image::RgbImage,
            candidates: &[Rectangle],
            _target_class: &str,
        ) -> crate::error::DetectResult<Vec<(Rectangle, f32)>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.positive {
                let rect = candidates.first().copied().unwrap_or(Rectangle::new(0, 0, 4, 4));
                Ok(vec![(rect, 0.9)])
            } else {
                Ok(vec![])
            }
        }
    }

    fn test_cfg() -> ChannelConfig {
        let mut cfg = ChannelConfig::default();
        cfg.shape = (8, 8);
        cfg.rows = 1;
        cfg.cols = 1;
        cfg.max_cache = 500;
        cfg.pre_frames = 1;
        cfg.future_frames = 1;
        cfg.max_rects_per_frame = 3;
        cfg
    }

    fn tile_result(frame_index: u64, rects: Vec<Rectangle>) -> TileResult {
        TileResult { frame_index, row: 0, col: 0, rects, mask: image::GrayImage::new(1, 1) }
    }

    fn reconstructor(
        cfg: ChannelConfig,
        gate: Arc<FakeGate>,
    ) -> (Reconstructor, mpsc::Receiver<RecorderNotice>, mpsc::Receiver<DetectMessage>, FrameCache) {
        let frame_cache = FrameCache::new(cfg.max_cache);
        let (recorder_tx, recorder_rx) = mpsc::channel(32);
        let (emitter_tx, emitter_rx) = mpsc::channel(32);
        let reconstructor = Reconstructor::new(
            cfg,
            frame_cache.clone(),
            None,
            gate,
            "dolphin".to_string(),
            MotionConfig::default(),
            recorder_tx,
            emitter_tx,
            None,
        );
        (reconstructor, recorder_rx, emitter_rx, frame_cache)
    }

    #[tokio::test]
    async fn noisy_tile_set_is_discarded_without_calling_the_gate() {
        let cfg = test_cfg();
        let gate = Arc::new(FakeGate { calls: AtomicUsize::new(0), positive: true });
        let (reconstructor, mut recorder_rx, mut emitter_rx, _cache) = reconstructor(cfg, gate.clone());

        let (tile_tx, tile_rx) = mpsc::channel(4);
        let noisy_rects = vec![Rectangle::new(0, 0, 1, 1); 5]; // >= max_rects_per_frame
        tile_tx.send(tile_result(1, noisy_rects)).await.unwrap();
        drop(tile_tx);

        let (_h, shutdown) = crate::lifecycle::test_support::new_shutdown();
        reconstructor.run_tiled(tile_rx, shutdown).await;

        assert_eq!(gate.calls.load(Ordering::SeqCst), 0);
        assert!(emitter_rx.try_recv().is_err());
        match recorder_rx.try_recv() {
            Ok(RecorderNotice::FrameCompleted { frame_index }) => assert_eq!(frame_index, 1),
            other => panic!("expected FrameCompleted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn positive_frame_assigns_dol_id_and_triggers_recorder() {
        let cfg = test_cfg();
        let gate = Arc::new(FakeGate { calls: AtomicUsize::new(0), positive: true });
        let (reconstructor, mut recorder_rx, mut emitter_rx, cache) = reconstructor(cfg, gate.clone());
        cache.insert(Frame::new(vec![30u8; 8 * 8 * 3], 8, 8, 1));

        let (tile_tx, tile_rx) = mpsc::channel(4);
        tile_tx.send(tile_result(1, vec![Rectangle::new(1, 1, 2, 2)])).await.unwrap();
        drop(tile_tx);

        let (_h, shutdown) = crate::lifecycle::test_support::new_shutdown();
        reconstructor.run_tiled(tile_rx, shutdown).await;

        assert_eq!(gate.calls.load(Ordering::SeqCst), 1);
        let mut saw_trigger = false;
        while let Ok(notice) = recorder_rx.try_recv() {
            if let RecorderNotice::Trigger { frame_index, .. } = notice {
                assert_eq!(frame_index, 1);
                saw_trigger = true;
            }
        }
        assert!(saw_trigger);
        match emitter_rx.try_recv() {
            Ok(DetectMessage::Detect { dol_id, .. }) => assert_eq!(dol_id, 10_000),
            other => panic!("expected Detect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_candidates_skip_the_gate_entirely() {
        let cfg = test_cfg();
        let gate = Arc::new(FakeGate { calls: AtomicUsize::new(0), positive: true });
        let (reconstructor, _recorder_rx, mut emitter_rx, _cache) = reconstructor(cfg, gate.clone());

        let (tile_tx, tile_rx) = mpsc::channel(4);
        tile_tx.send(tile_result(1, vec![])).await.unwrap();
        drop(tile_tx);

        let (_h, shutdown) = crate::lifecycle::test_support::new_shutdown();
        reconstructor.run_tiled(tile_rx, shutdown).await;

        assert_eq!(gate.calls.load(Ordering::SeqCst), 0);
        assert!(emitter_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cache_miss_exhausts_retries_and_treats_the_frame_as_negative() {
        let cfg = test_cfg();
        let gate = Arc::new(FakeGate { calls: AtomicUsize::new(0), positive: true });
        let (reconstructor, mut recorder_rx, mut emitter_rx, _cache) = reconstructor(cfg, gate.clone());
        // Never insert frame 1 into the cache: every retry misses.

        let (tile_tx, tile_rx) = mpsc::channel(4);
        tile_tx.send(tile_result(1, vec![Rectangle::new(0, 0, 2, 2)])).await.unwrap();
        drop(tile_tx);

        let (_h, shutdown) = crate::lifecycle::test_support::new_shutdown();
        // With the clock paused, every 100ms retry sleep resolves instantly
        // since this is the only runnable task left between them.
        reconstructor.run_tiled(tile_rx, shutdown).await;

        assert_eq!(gate.calls.load(Ordering::SeqCst), 0);
        assert!(emitter_rx.try_recv().is_err());
        assert!(matches!(recorder_rx.try_recv(), Ok(RecorderNotice::FrameCompleted { frame_index: 1 })));
    }

    #[tokio::test]
    async fn second_consecutive_positive_does_not_bump_dol_id() {
        let cfg = test_cfg();
        let gate = Arc::new(FakeGate { calls: AtomicUsize::new(0), positive: true });
        let (reconstructor, _recorder_rx, mut emitter_rx, cache) = reconstructor(cfg, gate);
        cache.insert(Frame::new(vec![30u8; 8 * 8 * 3], 8, 8, 1));
        cache.insert(Frame::new(vec![30u8; 8 * 8 * 3], 8, 8, 2));

        let (tile_tx, tile_rx) = mpsc::channel(4);
        tile_tx.send(tile_result(1, vec![Rectangle::new(1, 1, 2, 2)])).await.unwrap();
        tile_tx.send(tile_result(2, vec![Rectangle::new(1, 1, 2, 2)])).await.unwrap();
        drop(tile_tx);

        let (_h, shutdown) = crate::lifecycle::test_support::new_shutdown();
        reconstructor.run_tiled(tile_rx, shutdown).await;

        let ids: Vec<u64> = std::iter::from_fn(|| emitter_rx.try_recv().ok())
            .map(|m| m.dol_id())
            .collect();
        assert_eq!(ids, vec![10_000, 10_000]);
    }

    fn contrast_frame(w: u32, h: u32, frame_index: u64) -> Frame {
        let mut img = image::RgbImage::new(w, h);
        for p in img.pixels_mut() {
            *p = image::Rgb([200, 50, 50]);
        }
        for y in 5..15 {
            for x in 5..15 {
                img.put_pixel(x, y, image::Rgb([10, 10, 10]));
            }
        }
        let mut data = vec![0u8; (w * h * 3) as usize];
        for (i, px) in img.pixels().enumerate() {
            data[i * 3] = px.0[0];
            data[i * 3 + 1] = px.0[1];
            data[i * 3 + 2] = px.0[2];
        }
        Frame::new(data, w, h, frame_index)
    }

    #[tokio::test]
    async fn suppressed_positive_still_advances_last_detection() {
        let mut cfg = test_cfg();
        cfg.shape = (20, 20);
        cfg.detect_internal = 10;
        cfg.search_window_size = 3;
        cfg.similarity_thresh = 0.2;
        let gate = Arc::new(FakeGate { calls: AtomicUsize::new(0), positive: true });
        let (mut reconstructor, _recorder_rx, mut emitter_rx, cache) = reconstructor(cfg, gate);
        let mut session = TrackSession::new(reconstructor.cfg.initial_dol_id);

        // The frames fed into the suppression search window (3, 4, 5) are
        // identical to the frame at the second positive (2), which drives
        // `should_suppress`'s SSIM std-dev to ~0, well under the 0.2 ceiling.
        for idx in 3..=5u64 {
            cache.insert(contrast_frame(20, 20, idx));
        }
        let rect = Rectangle::new(5, 5, 10, 10);

        let frame1 = contrast_frame(20, 20, 1);
        let positive = |frame_index: u64| DetectionResult {
            frame_index,
            rects: vec![rect],
            scores: vec![0.9],
            detect_flag: true,
        };
        reconstructor.finalize(&mut session, 1, Some(frame1), positive(1)).await;
        assert_eq!(reconstructor.last_detection, 1);

        let frame2 = contrast_frame(20, 20, 2);
        reconstructor.finalize(&mut session, 2, Some(frame2), positive(2)).await;

        // Suppressed: no second `Detect` message, but `last_detection` still
        // advances to the suppressed frame's index (spec §4.4 step 4).
        assert_eq!(reconstructor.last_detection, 2);
        let detects = std::iter::from_fn(|| emitter_rx.try_recv().ok())
            .filter(|m| matches!(m, DetectMessage::Detect { .. }))
            .count();
        assert_eq!(detects, 1);
    }
}
