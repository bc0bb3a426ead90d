//! # Pipeline Data Model
//!
//! Types shared by every stage of a channel's Detection Controller: the raw
//! [`Frame`] produced by ingest, the [`Tile`] views the Dispatcher hands to
//! Motion Workers, the [`Rectangle`]s and [`DetectionResult`]s that flow out
//! of the Reconstructor, and the [`TrackSession`] state machine that groups a
//! contiguous run of positive frames under one `dol_id`.
//!
//! None of these types know about channels, threads, or queues — that's
//! [`crate::pipeline`]'s job. This module is the vocabulary everything else
//! is written in.

mod detection;
mod frame;
mod message;
mod rectangle;
mod track;

pub use detection::{DetectMode, DetectionResult, TileResult};
pub use frame::{Frame, Tile};
pub use message::DetectMessage;
pub use rectangle::Rectangle;
pub use track::{TrackSession, TrackState};
