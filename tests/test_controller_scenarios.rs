//! End-to-end tests wiring a real [`Controller`] against fake external
//! collaborators. Runs in `SSD` detect mode throughout so the scenarios
//! below depend only on dispatcher/reconstructor/recorder/emitter
//! sequencing, not on the Motion Worker's blob extraction — that path, and
//! the noise-discard / cache-miss-retry rules, are exercised directly in
//! `src/pipeline/reconstructor.rs`'s own unit tests, and the shutdown-mid-
//! recording guarantee (scenario S6) is exercised directly in
//! `src/pipeline/recorder.rs`'s own unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use dolphin_watch::config::ChannelConfig;
use dolphin_watch::error::DetectResult;
use dolphin_watch::external::{DecodedFrame, DetectFullFrame, FrameSource, MessageTransport};
use dolphin_watch::lifecycle::{Controller, ControllerDeps};
use dolphin_watch::model::{DetectMessage, DetectMode, Rectangle};
use dolphin_watch::pipeline::recorder::{ClipWriter, ClipWriterFactory};

/// Emits one solid-color frame per entry in `brightness`, then ends the
/// stream cleanly (`Ok(None)`), mirroring an offline file source reaching
/// EOF (spec §4.1).
struct ScriptedFrameSource {
    brightness: Vec<u8>,
    shape: (u32, u32),
    next: usize,
}

#[async_trait]
impl FrameSource for ScriptedFrameSource {
    async fn next_frame(&mut self) -> DetectResult<Option<DecodedFrame>> {
        if self.next >= self.brightness.len() {
            return Ok(None);
        }
        let value = self.brightness[self.next];
        self.next += 1;
        let (w, h) = self.shape;
        Ok(Some(DecodedFrame { data: vec![value; (w * h * 3) as usize], width: w, height: h }))
    }
}

/// A stand-in full-frame detector with no notion of model weights: treats
/// mean brightness above `threshold` as a positive detection of one
/// fixed-size box. Good enough to drive the Reconstructor's track/dedup
/// state machine deterministically from frame content, the same way the
/// real classifier/SSD gate would from real pixels.
struct BrightnessGate {
    threshold: f64,
}

#[async_trait]
impl DetectFullFrame for BrightnessGate {
    async fn detect_full_frame(
        &self,
        frame: &image::RgbImage,
        _candidates: &[Rectangle],
        _target_class: &str,
    ) -> DetectResult<Vec<(Rectangle, f32)>> {
        let mean = frame.pixels().map(|p| f64::from(p.0[0])).sum::<f64>() / frame.pixels().len().max(1) as f64;
        if mean > self.threshold {
            let (w, h) = frame.dimensions();
            Ok(vec![(Rectangle::new(0, 0, w.min(2), h.min(2)), 0.95)])
        } else {
            Ok(vec![])
        }
    }
}

struct RecordingTransport {
    received: Mutex<Vec<DetectMessage>>,
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, message: DetectMessage) {
        self.received.lock().unwrap().push(message);
    }
}

struct CountingWriter {
    frames_written: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
}

impl ClipWriter for CountingWriter {
    fn write_frame(&mut self, _bgra: &[u8], _width: u32, _height: u32) -> DetectResult<()> {
        self.frames_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn finish(self: Box<Self>) -> DetectResult<()> {
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct CountingWriterFactory {
    clips_opened: Arc<AtomicU64>,
    frames_written: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
}

impl ClipWriterFactory for CountingWriterFactory {
    fn create(&self, _output_path: &Path, _shape: (u32, u32), _fps: u32) -> DetectResult<Box<dyn ClipWriter>> {
        self.clips_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingWriter { frames_written: self.frames_written.clone(), finished: self.finished.clone() }))
    }
}

fn temp_workspace(tag: &str) -> String {
    std::env::temp_dir()
        .join(format!("dolphin_watch_itest_{tag}_{}_{}", std::process::id(), rand::random::<u64>()))
        .display()
        .to_string()
}

struct Harness {
    transport: Arc<RecordingTransport>,
    clips_opened: Arc<AtomicU64>,
    frames_written: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
}

/// Starts a channel in `SSD` mode against `brightness`, lets the scripted
/// source run to completion, then shuts the controller down. No RTSP
/// push, no render cache — only the parts these scenarios need.
async fn run_channel(mut cfg: ChannelConfig, brightness: Vec<u8>) -> Harness {
    cfg.detect_mode = DetectMode::Ssd;
    cfg.push_stream = false;
    cfg.render = false;
    cfg.workspace_root = temp_workspace("scenario");

    let transport = Arc::new(RecordingTransport { received: Mutex::new(Vec::new()) });
    let clips_opened = Arc::new(AtomicU64::new(0));
    let frames_written = Arc::new(AtomicU64::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let writer_factory = Arc::new(CountingWriterFactory {
        clips_opened: clips_opened.clone(),
        frames_written: frames_written.clone(),
        finished: finished.clone(),
    });

    let shape = cfg.shape;
    let deps = ControllerDeps {
        frame_source: Box::new(ScriptedFrameSource { brightness, shape, next: 0 }),
        gate: Arc::new(BrightnessGate { threshold: 100.0 }),
        transport: transport.clone(),
        clip_writer_factory: writer_factory,
        rtsp_publisher: None,
        target_class: "dolphin".to_string(),
    };

    let controller = Controller::start(cfg, deps).expect("valid config");
    // The scripted source reaches EOF on its own, which cascades a clean
    // shutdown down every channel in the pipeline (no component needs the
    // shutdown token for this). Give that in-memory cascade time to settle
    // before asking the Controller to join every task.
    tokio::time::sleep(Duration::from_millis(300)).await;
    controller.shutdown().await;

    Harness { transport, clips_opened, frames_written, finished }
}

fn base_cfg() -> ChannelConfig {
    let mut cfg = ChannelConfig::default();
    cfg.channel = 0;
    cfg.video_stream = "rtsp://cam/test".to_string();
    cfg.shape = (4, 4);
    cfg.rows = 1;
    cfg.cols = 1;
    cfg.sample_rate = 1;
    cfg.pre_cache = 0;
    cfg.max_cache = 200;
    cfg.pre_frames = 2;
    cfg.future_frames = 2;
    cfg
}

/// S1: a routine run with no positives ever produces no messages and opens
/// no clip.
#[tokio::test]
async fn s1_all_negative_frames_produce_nothing() {
    let cfg = base_cfg();
    let harness = run_channel(cfg, vec![10u8; 5]).await;

    assert!(harness.transport.received.lock().unwrap().is_empty());
    assert_eq!(harness.clips_opened.load(Ordering::SeqCst), 0);
}

/// S2: two consecutive positives keep the same `dol_id`; the first
/// negative afterward emits exactly one `detect_empty` for that id; a
/// later, separate positive run gets the next id.
#[tokio::test]
async fn s2_dol_id_assignment_across_a_presence_run() {
    let cfg = base_cfg();
    // neg, neg, pos, pos, neg, neg, neg, pos, pos
    let brightness = vec![10, 10, 200, 200, 10, 10, 10, 200, 200];
    let harness = run_channel(cfg, brightness).await;

    let received = harness.transport.received.lock().unwrap();
    let shapes: Vec<(&str, u64)> = received
        .iter()
        .map(|m| match m {
            DetectMessage::Detect { dol_id, .. } => ("detect", *dol_id),
            DetectMessage::DetectEmpty { dol_id, .. } => ("detect_empty", *dol_id),
        })
        .collect();

    assert_eq!(
        shapes,
        vec![
            ("detect", 10_000),
            ("detect", 10_000),
            ("detect_empty", 10_000),
            ("detect", 10_001),
            ("detect", 10_001),
        ]
    );
}

/// S3: a single trigger in the middle of a run opens exactly one clip
/// covering `[frame - pre_frames, frame + future_frames]`.
#[tokio::test]
async fn s3_clip_covers_exactly_the_pre_and_future_roll() {
    let mut cfg = base_cfg();
    cfg.pre_frames = 2;
    cfg.future_frames = 2;

    // positive only at frame 7 (1-indexed); 14 frames total so the full
    // post-roll (up to frame 9) definitely arrives.
    let mut brightness = vec![10u8; 14];
    brightness[6] = 200;
    let harness = run_channel(cfg, brightness).await;

    assert_eq!(harness.clips_opened.load(Ordering::SeqCst), 1);
    assert_eq!(harness.frames_written.load(Ordering::SeqCst), 5); // frames 5..=9
    assert!(harness.finished.load(Ordering::SeqCst));
}
