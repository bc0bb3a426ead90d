//! # Event Recorder
//!
//! The pre/post-roll clip state machine from spec §4.5: `Idle ->
//! Recording -> Flushing -> Idle`. `Arming` collapses into the `Idle ->
//! Recording` transition here — nothing observable happens between
//! "trigger received" and "writer opened", so there is no separate state
//! to represent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cache::{FrameCache, PinGuard, RenderCache, RenderPinGuard};
use crate::config::ChannelConfig;
use crate::error::DetectResult;
use crate::lifecycle::ShutdownToken;
use crate::model::{Frame, Rectangle};
use crate::workspace::Workspace;

use super::restreamer::draw_rect_bgra;

/// One already-opened clip output. [`GstClipWriter`] adapts `cap_rtsp`'s
/// BGRA appsrc pattern to a `filesink`+`mp4mux` pipeline instead of an RTSP
/// mount — the teacher crate only ever streams, so this is new plumbing
/// built in its idiom rather than reused verbatim.
pub trait ClipWriter: Send {
    fn write_frame(&mut self, bgra: &[u8], width: u32, height: u32) -> DetectResult<()>;
    fn finish(self: Box<Self>) -> DetectResult<()>;
}

pub trait ClipWriterFactory: Send + Sync {
    fn create(&self, output_path: &std::path::Path, shape: (u32, u32), fps: u32) -> DetectResult<Box<dyn ClipWriter>>;
}

pub enum RecorderNotice {
    /// A positive, non-suppressed detection at `frame_index` (spec §4.3
    /// step 5/6): arms a new clip or extends/coalesces the active one.
    Trigger { frame_index: u64, rects: Vec<Rectangle> },
    /// The Reconstructor has finished deciding `frame_index` (positive or
    /// not) — drives the write loop forward once it reaches `start`.
    FrameCompleted { frame_index: u64 },
}

struct ActiveClip {
    start: u64,
    end: u64,
    next_to_write: u64,
    last_completed: u64,
    writer: Box<dyn ClipWriter>,
    output_path: PathBuf,
    boxes: HashMap<u64, Vec<Rectangle>>,
    _frame_pins: Vec<PinGuard>,
    _render_pins: Vec<RenderPinGuard>,
}

enum State {
    Idle,
    Recording(ActiveClip),
}

pub struct EventRecorder {
    cfg: ChannelConfig,
    frame_cache: FrameCache,
    render_cache: Option<RenderCache>,
    writer_factory: Arc<dyn ClipWriterFactory>,
    workspace: Arc<Workspace>,
}

impl EventRecorder {
    pub fn new(
        cfg: ChannelConfig,
        frame_cache: FrameCache,
        render_cache: Option<RenderCache>,
        writer_factory: Arc<dyn ClipWriterFactory>,
        workspace: Arc<Workspace>,
    ) -> Self {
        Self { cfg, frame_cache, render_cache, writer_factory, workspace }
    }

    pub async fn run(mut self, mut notices: mpsc::Receiver<RecorderNotice>, mut shutdown: ShutdownToken) {
        let mut state = State::Idle;
        let mut clip_counter: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.finish_active(&mut state).await;
                    break;
                }
                maybe = notices.recv() => {
                    match maybe {
                        Some(RecorderNotice::Trigger { frame_index, rects }) => {
                            self.handle_trigger(&mut state, frame_index, rects, &mut clip_counter);
                        }
                        Some(RecorderNotice::FrameCompleted { frame_index }) => {
                            self.handle_completed(&mut state, frame_index).await;
                        }
                        None => {
                            self.finish_active(&mut state).await;
                            break;
                        }
                    }
                }
            }
        }
    }

    fn handle_trigger(&mut self, state: &mut State, frame_index: u64, rects: Vec<Rectangle>, clip_counter: &mut u64) {
        match state {
            State::Idle => {
                let start = frame_index.saturating_sub(self.cfg.pre_frames);
                let end = frame_index + self.cfg.future_frames;
                let frame_pin = self.frame_cache.pin_range(start, end);
                let render_pin = self.render_cache.as_ref().map(|rc| rc.pin_range(start, end));
                let output_path = self.next_clip_path(start, clip_counter);
                let writer = match self.writer_factory.create(&output_path, self.cfg.shape, 24) {
                    Ok(w) => w,
                    Err(e) => {
                        crate::log_line!(self.cfg.channel, "recorder", "failed to open clip writer: {e}");
                        return;
                    }
                };
                let mut boxes = HashMap::new();
                boxes.insert(frame_index, rects);
                *state = State::Recording(ActiveClip {
                    start,
                    end,
                    next_to_write: start,
                    last_completed: 0,
                    writer,
                    output_path,
                    boxes,
                    _frame_pins: vec![frame_pin],
                    _render_pins: render_pin.into_iter().collect(),
                });
            }
            State::Recording(clip) => {
                // Overlapping trigger: coalesce into the active clip rather
                // than starting a second one (spec §4.5 "overlapping
                // triggers coalesce into a single extended clip").
                clip.boxes.insert(frame_index, rects);
                let new_end = frame_index + self.cfg.future_frames;
                if new_end > clip.end {
                    let extra_pin = self.frame_cache.pin_range(clip.end + 1, new_end);
                    clip._frame_pins.push(extra_pin);
                    if let Some(rc) = &self.render_cache {
                        clip._render_pins.push(rc.pin_range(clip.end + 1, new_end));
                    }
                    clip.end = new_end;
                }
            }
        }
    }

    async fn handle_completed(&mut self, state: &mut State, frame_index: u64) {
        let State::Recording(clip) = state else { return };
        clip.last_completed = clip.last_completed.max(frame_index);
        self.drain(clip).await;
        if clip.next_to_write > clip.end {
            self.flush(state);
        }
    }

    async fn finish_active(&mut self, state: &mut State) {
        if let State::Recording(clip) = state {
            clip.last_completed = clip.end;
            self.drain(clip).await;
        }
        self.flush(state);
    }

    async fn drain(&self, clip: &mut ActiveClip) {
        while clip.next_to_write <= clip.end.min(clip.last_completed) {
            let idx = clip.next_to_write;
            let rendered = self.render_cache.as_ref().and_then(|rc| rc.get(idx));
            let (bgra, width, height) = if let Some(rendered) = rendered {
                (rendered.data.as_ref().clone(), rendered.width, rendered.height)
            } else if let Some(frame) = self.fetch_for_write(idx) {
                let mut bgra = frame.to_bgra();
                if let Some(rects) = clip.boxes.get(&idx) {
                    for r in rects {
                        draw_rect_bgra(&mut bgra, frame.width, frame.height, *r, [0, 0, 220, 255]);
                    }
                    if self.cfg.save_box {
                        self.persist_positive_frame(idx, &frame, rects);
                    }
                }
                (bgra, frame.width, frame.height)
            } else {
                crate::log_line!(self.cfg.channel, "recorder", "no cached frame near {idx}, clip will be short");
                clip.next_to_write += 1;
                continue;
            };
            if let Err(e) = clip.writer.write_frame(&bgra, width, height) {
                crate::log_line!(self.cfg.channel, "recorder", "write failed at frame {idx}: {e}");
            }
            clip.next_to_write += 1;
        }
    }

    /// Raw-frame fallback when the Render Cache has nothing for `idx` (e.g.
    /// `render` disabled). Falls back further to the nearest prior cached
    /// frame so a clip's frame count stays exact across sampling/eviction
    /// gaps (spec §4.5 ordering guarantee).
    fn fetch_for_write(&self, idx: u64) -> Option<Frame> {
        self.frame_cache.get(idx).or_else(|| self.frame_cache.get_nearest_prior(idx))
    }

    fn flush(&mut self, state: &mut State) {
        if let State::Recording(clip) = std::mem::replace(state, State::Idle) {
            let path = clip.output_path.clone();
            match clip.writer.finish() {
                Ok(()) => crate::log_line!(self.cfg.channel, "recorder", "clip flushed to {}", path.display()),
                Err(e) => crate::log_line!(self.cfg.channel, "recorder", "clip abandoned: {e}"),
            }
        }
    }

    fn next_clip_path(&mut self, start: u64, clip_counter: &mut u64) -> PathBuf {
        *clip_counter += 1;
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.workspace.render_streams_dir().join(format!("{ts}_{start}_{clip_counter}.mp4"))
    }

    /// `save_box`: persist the positive frame, each matched crop, and append
    /// to `bbox.json` (grounded in the original's `save_bbox`/`label_crop`,
    /// see SPEC_FULL.md §C.2).
    fn persist_positive_frame(&self, idx: u64, frame: &Frame, rects: &[Rectangle]) {
        let frame_name = format!("frame_{idx}.png");
        let frame_path = self.workspace.frames_dir().join(&frame_name);
        if let Err(e) = frame.to_rgb_image().save(&frame_path) {
            crate::log_line!(self.cfg.channel, "recorder", "failed to save positive frame: {e}");
            return;
        }
        for (i, rect) in rects.iter().enumerate() {
            let clamped = rect.clamped(frame.width, frame.height);
            let crop = frame.crop_rgb(clamped.x, clamped.y, clamped.w, clamped.h);
            let crop_path = self.workspace.crops_dir().join(format!("frame_{idx}_{i}.png"));
            let _ = crop.save(crop_path);
        }
        self.append_bbox_json(&frame_name, rects);
    }

    fn append_bbox_json(&self, frame_name: &str, rects: &[Rectangle]) {
        let path = self.workspace.bbox_json_path();
        let mut map: HashMap<String, Vec<Rectangle>> = std::fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        map.insert(frame_name.to_string(), rects.to_vec());
        if let Ok(bytes) = serde_json::to_vec_pretty(&map) {
            let _ = std::fs::write(&path, bytes);
        }
    }
}

/// GStreamer-backed clip writer: `appsrc ! videoconvert ! x264enc ! mp4mux
/// ! filesink`, adapted from `cap_rtsp`'s appsrc/caps pattern but ending in
/// a file instead of an RTSP mount.
pub struct GstClipWriterFactory;

impl ClipWriterFactory for GstClipWriterFactory {
    fn create(&self, output_path: &std::path::Path, shape: (u32, u32), fps: u32) -> DetectResult<Box<dyn ClipWriter>> {
        GstClipWriter::open(output_path, shape, fps).map(|w| Box::new(w) as Box<dyn ClipWriter>)
    }
}

struct GstClipWriter {
    appsrc: gstreamer_app::AppSrc,
    pipeline: gstreamer::Pipeline,
    frame_duration: gstreamer::ClockTime,
    next_pts: u64,
}

impl GstClipWriter {
    fn open(output_path: &std::path::Path, shape: (u32, u32), fps: u32) -> DetectResult<Self> {
        use gstreamer::prelude::*;
        use crate::error::DetectError;

        gstreamer::init().map_err(|e| DetectError::gstreamer(None, e.to_string()))?;
        let (w, h) = shape;
        let launch = format!(
            "appsrc name=src is-live=false format=time caps=video/x-raw,format=BGRA,width={w},height={h},framerate={fps}/1 \
             ! videoconvert ! x264enc tune=zerolatency speed-preset=veryfast ! mp4mux ! filesink location={}",
            output_path.display()
        );
        let pipeline = gstreamer::parse::launch(&launch)
            .map_err(|e| DetectError::gstreamer(None, e.to_string()))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| DetectError::gstreamer(None, "launch did not produce a Pipeline".to_string()))?;
        let appsrc = pipeline
            .by_name("src")
            .and_then(|e| e.downcast::<gstreamer_app::AppSrc>().ok())
            .ok_or_else(|| DetectError::gstreamer(Some("src".to_string()), "appsrc not found".to_string()))?;
        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| DetectError::gstreamer(None, e.to_string()))?;
        Ok(Self {
            appsrc,
            pipeline,
            frame_duration: gstreamer::ClockTime::from_nseconds(1_000_000_000 / fps.max(1) as u64),
            next_pts: 0,
        })
    }
}

impl ClipWriter for GstClipWriter {
    fn write_frame(&mut self, bgra: &[u8], _width: u32, _height: u32) -> DetectResult<()> {
        use gstreamer::prelude::*;
        use crate::error::DetectError;

        let mut buffer =
            gstreamer::Buffer::with_size(bgra.len()).map_err(|e| DetectError::gstreamer(None, e.to_string()))?;
        {
            let bufref = buffer.get_mut().expect("sole owner of freshly allocated buffer");
            bufref.set_pts(gstreamer::ClockTime::from_nseconds(self.next_pts));
            bufref.set_duration(self.frame_duration);
            if let Ok(mut map) = bufref.map_writable() {
                map.as_mut_slice().copy_from_slice(bgra);
            }
        }
        self.next_pts += self.frame_duration.nseconds();
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| DetectError::gstreamer(Some("src".to_string()), e.to_string()))?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> DetectResult<()> {
        use gstreamer::prelude::*;
        use crate::error::DetectError;

        let _ = self.appsrc.end_of_stream();
        if let Some(bus) = self.pipeline.bus() {
            let _ = bus.timed_pop_filtered(
                gstreamer::ClockTime::from_seconds(5),
                &[gstreamer::MessageType::Eos, gstreamer::MessageType::Error],
            );
        }
        self.pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| DetectError::gstreamer(None, e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory stand-in so the state machine can be tested without a real
    /// GStreamer pipeline.
    struct FakeWriter {
        frames: Arc<Mutex<Vec<(u32, u32)>>>,
        finished: Arc<std::sync::atomic::AtomicBool>,
    }

    impl ClipWriter for FakeWriter {
        fn write_frame(&mut self, _bgra: &[u8], width: u32, height: u32) -> DetectResult<()> {
            self.frames.lock().unwrap().push((width, height));
            Ok(())
        }
        fn finish(self: Box<Self>) -> DetectResult<()> {
            self.finished.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeWriterFactory {
        frames: Arc<Mutex<Vec<(u32, u32)>>>,
        finished: Arc<std::sync::atomic::AtomicBool>,
    }

    impl ClipWriterFactory for FakeWriterFactory {
        fn create(&self, _output_path: &std::path::Path, _shape: (u32, u32), _fps: u32) -> DetectResult<Box<dyn ClipWriter>> {
            Ok(Box::new(FakeWriter {
                frames: self.frames.clone(),
                finished: self.finished.clone(),
            }))
        }
    }

    fn test_recorder(cfg: ChannelConfig) -> (EventRecorder, Arc<Mutex<Vec<(u32, u32)>>>, Arc<std::sync::atomic::AtomicBool>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let factory = Arc::new(FakeWriterFactory { frames: frames.clone(), finished: finished.clone() });
        let tmp = std::env::temp_dir().join(format!("dolphin_watch_rec_test_{}_{}", std::process::id(), rand::random::<u64>()));
        let workspace = Arc::new(Workspace::create(&tmp).unwrap());
        let recorder = EventRecorder::new(cfg.clone(), FrameCache::new(cfg.max_cache), None, factory, workspace);
        (recorder, frames, finished)
    }

    fn fill_cache(cache: &FrameCache, from: u64, to: u64) {
        for i in from..=to {
            cache.insert(Frame::new(vec![10u8; 4 * 4 * 3], 4, 4, i));
        }
    }

    #[tokio::test]
    async fn clip_covers_exactly_pre_and_future_frames() {
        let mut cfg = ChannelConfig::default();
        cfg.pre_frames = 2;
        cfg.future_frames = 2;
        cfg.shape = (4, 4);
        let (recorder, frames, finished) = test_recorder(cfg.clone());
        fill_cache(&recorder.frame_cache, 1, 20);

        let (tx, rx) = mpsc::channel(16);
        tx.send(RecorderNotice::Trigger { frame_index: 10, rects: vec![Rectangle::new(0, 0, 1, 1)] })
            .await
            .unwrap();
        for i in 8..=12u64 {
            tx.send(RecorderNotice::FrameCompleted { frame_index: i }).await.unwrap();
        }
        drop(tx);

        let (_h, shutdown) = crate::lifecycle::test_support::new_shutdown();
        recorder.run(rx, shutdown).await;

        assert_eq!(frames.lock().unwrap().len(), 5); // 8..=12
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn overlapping_triggers_coalesce_into_one_clip() {
        let mut cfg = ChannelConfig::default();
        cfg.pre_frames = 2;
        cfg.future_frames = 2;
        cfg.shape = (4, 4);
        let (recorder, frames, finished) = test_recorder(cfg.clone());
        fill_cache(&recorder.frame_cache, 1, 30);

        let (tx, rx) = mpsc::channel(32);
        tx.send(RecorderNotice::Trigger { frame_index: 10, rects: vec![] }).await.unwrap();
        tx.send(RecorderNotice::Trigger { frame_index: 13, rects: vec![] }).await.unwrap(); // overlaps, extends end
        for i in 8..=15u64 {
            tx.send(RecorderNotice::FrameCompleted { frame_index: i }).await.unwrap();
        }
        drop(tx);

        let (_h, shutdown) = crate::lifecycle::test_support::new_shutdown();
        recorder.run(rx, shutdown).await;

        // single clip covering 8..=15 (extended end from the second trigger)
        assert_eq!(frames.lock().unwrap().len(), 8);
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_finishes_active_clip_from_cache_without_waiting_for_notices() {
        let mut cfg = ChannelConfig::default();
        cfg.pre_frames = 0;
        cfg.future_frames = 10;
        cfg.shape = (4, 4);
        let (recorder, frames, finished) = test_recorder(cfg.clone());
        fill_cache(&recorder.frame_cache, 1, 100);

        let (tx, rx) = mpsc::channel(16);
        tx.send(RecorderNotice::Trigger { frame_index: 50, rects: vec![] }).await.unwrap();
        // only frame 50 itself is ever reported completed before shutdown
        tx.send(RecorderNotice::FrameCompleted { frame_index: 50 }).await.unwrap();

        let (handle, shutdown) = crate::lifecycle::test_support::new_shutdown();
        let run = tokio::spawn(recorder.run(rx, shutdown));
        tokio::task::yield_now().await;
        handle.trigger();
        run.await.unwrap();

        // start=50, end=60: the full range must be written even though
        // only frame 50 was ever marked completed (spec scenario S6).
        assert_eq!(frames.lock().unwrap().len(), 11);
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
        let _ = tx;
    }
}
