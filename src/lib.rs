//! # Dolphin Watch — Multi-Channel Detection Controller
//!
//! A real-time video analytics pipeline: one long-lived channel per camera
//! feed, each decomposed into the Tile Dispatcher, Motion Workers, the
//! Reconstructor, the Continuous-Detection De-duplicator, the Event
//! Recorder, the Event Emitter, and the optional Annotated Re-streamer
//! (spec §2, §4). Every stage is a `tokio` task talking to its neighbours
//! over bounded `mpsc` channels — there is no central event loop, and no
//! component reaches into another's state directly.
//!
//! ## Architecture
//!
//! [`lifecycle::Controller`] is the entry point: it validates a
//! [`config::ChannelConfig`], creates the channel's on-disk
//! [`workspace::Workspace`], wires up the caches and channels described in
//! [`cache`] and [`model`], and spawns every [`pipeline`] stage. Ingest
//! decoding, model inference, and outbound messaging are deliberately left
//! out of scope — [`external`] defines the narrow trait seams a caller
//! plugs real implementations into.
//!
//! ## Crates
//!
//! - `cap-scale`: tile grid splitting and CPU image scaling, shared with
//!   the Tile Dispatcher's preprocessing step.
//! - `cap-rtsp`: the GStreamer-backed RTSP publisher the Annotated
//!   Re-streamer pushes annotated frames through.
//!
//! ## Error Handling
//!
//! See [`error`] for the channel-wide error taxonomy. Only
//! [`error::DetectError`] instances at [`error::ErrorSeverity::Fatal`] are
//! expected to propagate past a component and trigger the channel's
//! shutdown token (spec §7).

pub mod cache;
pub mod config;
pub mod error;
pub mod external;
pub mod lifecycle;
pub mod model;
pub mod pipeline;
pub mod workspace;
