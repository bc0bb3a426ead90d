//! # Lifecycle / Control
//!
//! Owns the shared shutdown signal and the channel wiring between every
//! pipeline task (spec §4.8). The current design's answer to "the source
//! spawns ad-hoc threads for stream_render.reset/notify" is that all of
//! that is just messages on the bounded channels constructed here — no
//! component reaches into another's state directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::cache::{FrameCache, RenderCache};
use crate::config::ChannelConfig;
use crate::error::DetectResult;
use crate::external::{DetectFullFrame, FrameSource, MessageTransport};
use crate::model::{DetectMessage, DetectMode, DetectionResult, Frame, Tile, TileResult};
use crate::pipeline::dispatcher::TileDispatcher;
use crate::pipeline::emitter::EventEmitter;
use crate::pipeline::motion::{spawn_motion_worker, MotionConfig};
use crate::pipeline::recorder::{ClipWriterFactory, EventRecorder, RecorderNotice};
use crate::pipeline::reconstructor::Reconstructor;
use crate::pipeline::restreamer::AnnotatedRestreamer;
use crate::workspace::Workspace;

/// Components are given this long to drain after shutdown is signalled
/// before the Controller forces termination (spec §4.8).
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Formats every worker's stderr line as `[channel N] component: message`,
/// the convention every pipeline task already used ad hoc, centralized
/// here so it's consistent and grep-able without pulling in a logging
/// crate the teacher never reached for.
#[macro_export]
macro_rules! log_line {
    ($channel:expr, $component:literal, $($arg:tt)*) => {
        eprintln!("[channel {}] {}: {}", $channel, $component, format!($($arg)*))
    };
}

/// Cheap, cloneable handle every task polls at its blocking points.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered. Safe to use repeatedly
    /// inside a `tokio::select!` loop — it returns immediately if already
    /// triggered.
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    fn new() -> (Self, ShutdownToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownToken { rx })
    }

    fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Test-only constructors for the parts of shutdown wiring other pipeline
/// modules' unit tests need but that are otherwise private to this module.
#[cfg(test)]
pub mod test_support {
    use super::{ShutdownHandle, ShutdownToken};

    pub struct TestShutdown(ShutdownHandle);

    impl TestShutdown {
        pub fn trigger(&self) {
            self.0.trigger();
        }
    }

    pub fn new_shutdown() -> (TestShutdown, ShutdownToken) {
        let (handle, token) = ShutdownHandle::new();
        (TestShutdown(handle), token)
    }
}

/// External collaborators a channel needs handed in — everything spec §6
/// treats as out of scope for this crate (ingest decoding, model
/// inference, outbound transport).
pub struct ControllerDeps {
    pub frame_source: Box<dyn FrameSource>,
    pub gate: Arc<dyn DetectFullFrame>,
    pub transport: Arc<dyn MessageTransport>,
    pub clip_writer_factory: Arc<dyn ClipWriterFactory>,
    pub rtsp_publisher: Option<cap_rtsp::RtspPublisher>,
    /// Target class the classifier/SSD gate reports on (e.g. `"dolphin"`).
    pub target_class: String,
}

/// One running channel's Detection Controller. Dropping this leaks the
/// spawned tasks — call [`Controller::shutdown`] for an orderly stop.
pub struct Controller {
    channel: usize,
    shutdown: ShutdownHandle,
    tasks: JoinSet<()>,
}

impl Controller {
    pub fn start(cfg: ChannelConfig, deps: ControllerDeps) -> DetectResult<Self> {
        cfg.validate()?;
        let workspace = Arc::new(Workspace::create(&cfg.workspace_root)?);
        let (shutdown_handle, shutdown) = ShutdownHandle::new();

        let frame_cache = FrameCache::new(cfg.max_cache);
        let render_cache = cfg.render.then(RenderCache::new);

        let (emitter_tx, emitter_rx) = mpsc::channel::<DetectMessage>(1000);
        let (recorder_tx, recorder_rx) = mpsc::channel::<RecorderNotice>(256);

        let (restream_frame_tx, restream_frame_rx) = if cfg.push_stream {
            let (tx, rx) = mpsc::channel::<Frame>(1000);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let (restream_detect_tx, restream_detect_rx) = if cfg.push_stream {
            let (tx, rx) = mpsc::channel::<DetectionResult>(1000);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let mut tasks = JoinSet::new();

        let tile_count = cfg.tile_count() as usize;
        let mut tile_txs = Vec::with_capacity(tile_count);
        let (reconstructor_tile_tx, reconstructor_tile_rx) = mpsc::channel::<TileResult>(64 * tile_count.max(1));
        if cfg.detect_mode == DetectMode::Classify {
            for _ in 0..tile_count {
                let (tx, rx) = mpsc::channel::<Tile>(64);
                tile_txs.push(tx);
                tasks.spawn(async move {
                    let handle = spawn_motion_worker(rx, reconstructor_tile_tx.clone(), MotionConfig::default());
                    let _ = handle.await;
                });
            }
        }
        drop(reconstructor_tile_tx);

        let (ssd_tx, ssd_rx) = mpsc::channel::<(u64, image::RgbImage)>(64);

        {
            let dispatcher = TileDispatcher::new(cfg.clone(), frame_cache.clone(), tile_txs, ssd_tx);
            let source = deps.frame_source;
            let shutdown = shutdown.clone();
            let restream_frame_tx = restream_frame_tx.clone();
            tasks.spawn(async move {
                dispatcher.run(source, restream_frame_tx, shutdown).await;
            });
        }

        {
            let reconstructor = Reconstructor::new(
                cfg.clone(),
                frame_cache.clone(),
                render_cache.clone(),
                deps.gate,
                deps.target_class,
                MotionConfig::default(),
                recorder_tx.clone(),
                emitter_tx.clone(),
                restream_detect_tx,
            );
            let shutdown = shutdown.clone();
            match cfg.detect_mode {
                DetectMode::Classify => {
                    tasks.spawn(async move {
                        reconstructor.run_tiled(reconstructor_tile_rx, shutdown).await;
                    });
                }
                DetectMode::Ssd => {
                    tasks.spawn(async move {
                        reconstructor.run_full_frame(ssd_rx, shutdown).await;
                    });
                }
            }
        }

        {
            let recorder = EventRecorder::new(
                cfg.clone(),
                frame_cache.clone(),
                render_cache.clone(),
                deps.clip_writer_factory,
                workspace.clone(),
            );
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                recorder.run(recorder_rx, shutdown).await;
            });
        }

        {
            let emitter = EventEmitter::new(cfg.channel, deps.transport);
            let shutdown = shutdown.clone();
            tasks.spawn(async move {
                emitter.run(emitter_rx, shutdown).await;
            });
        }

        if cfg.push_stream {
            match (deps.rtsp_publisher, restream_frame_rx, restream_detect_rx) {
                (Some(publisher), Some(frame_rx), Some(detect_rx)) => {
                    let restreamer = AnnotatedRestreamer::new(cfg.channel, cfg.hold_frames, publisher, 24);
                    let shutdown = shutdown.clone();
                    tasks.spawn(async move {
                        restreamer.run(frame_rx, detect_rx, shutdown).await;
                    });
                }
                _ => {
                    log_line!(cfg.channel, "lifecycle", "push_stream enabled but no publisher supplied, skipping restreamer");
                }
            }
        }

        Ok(Self {
            channel: cfg.channel,
            shutdown: shutdown_handle,
            tasks,
        })
    }

    /// Signals shutdown and waits up to [`SHUTDOWN_GRACE`] for every task to
    /// finish on its own; anything still running past that is aborted.
    pub async fn shutdown(mut self) {
        self.shutdown.trigger();
        let deadline = tokio::time::sleep(SHUTDOWN_GRACE);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => {
                    log_line!(self.channel, "lifecycle", "grace period elapsed, forcing termination");
                    self.tasks.abort_all();
                    while self.tasks.join_next().await.is_some() {}
                    break;
                }
                next = self.tasks.join_next() => {
                    if next.is_none() {
                        break;
                    }
                }
            }
        }
    }
}
