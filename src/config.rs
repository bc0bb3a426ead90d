//! # Channel Configuration
//!
//! This module provides the configuration structure and validation for a
//! single video channel's Detection Controller. It serves as the common
//! interface between the (external, out-of-scope) process supervisor that
//! loads config files and the in-process [`crate::lifecycle::Controller`].
//!
//! ## Overview
//!
//! Every field here corresponds 1:1 to a recognised option in spec §6.
//! `ChannelConfig` derives `serde::Deserialize` so a supervisor can decode
//! one from a JSON/YAML document, but loading that document from disk is
//! explicitly out of scope (spec §1) — this module only owns the in-memory
//! shape and its validation rules.
//!
//! ## Validation Rules
//!
//! | Field | Range | Description |
//! |-------|-------|-------------|
//! | `shape` | non-zero `(w, h)` | target full-frame resolution |
//! | `rows`, `cols` | `>= 1` | tile grid dimensions |
//! | `sample_rate` | `>= 1` | every Nth frame is detected on |
//! | `max_cache` | `> pre_frames + future_frames` | Frame Cache high-watermark |
//! | `similarity_thresh` | `>= 0.0` | de-duplication std-dev ceiling |

use serde::{Deserialize, Serialize};

use crate::error::DetectError;
use crate::model::DetectMode;

/// Full configuration for one channel's Detection Controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Index identifying this channel, used in log lines and messages.
    pub channel: usize,
    /// Upstream identifier echoed back in every emitted message
    /// (spec §6 `video_stream`).
    pub video_stream: String,
    /// Target full-frame resolution frames are preprocessed to before
    /// tiling/detection.
    pub shape: (u32, u32),
    /// Tile grid rows (`routine.row`).
    pub rows: u32,
    /// Tile grid columns (`routine.col`).
    pub cols: u32,
    /// Every Nth frame is detected on.
    pub sample_rate: u64,
    /// Warm-up frames before dispatch starts.
    pub pre_cache: u64,
    /// Ingest channel bound (`max_streams_cache`).
    pub max_streams_cache: usize,
    /// Frame Cache high-watermark; eviction sweeps when exceeded.
    pub max_cache: usize,
    /// Pre-roll length for the Event Recorder.
    pub pre_frames: u64,
    /// Post-roll length for the Event Recorder.
    pub future_frames: u64,
    /// Window within which a new positive is subject to de-duplication.
    pub detect_internal: i64,
    /// Number of next frames sampled during de-duplication.
    pub search_window_size: u64,
    /// Std-deviation ceiling for de-duplication suppression.
    pub similarity_thresh: f64,
    /// Noise threshold: a tile returning at least this many candidates
    /// discards the whole frame (spec §4.3 step 2, default 3).
    pub max_rects_per_frame: usize,
    /// Enable annotated re-streaming and Render Cache writes.
    pub render: bool,
    /// Enable the Annotated Re-streamer.
    pub push_stream: bool,
    /// Target URL for the Annotated Re-streamer, when `push_stream` is set.
    pub push_to: Option<String>,
    /// `CLASSIFY` (tile + classifier) or `SSD` (full-frame detector).
    pub detect_mode: DetectMode,
    /// Enable writing positive frames + crops + `bbox.json`.
    pub save_box: bool,
    /// Frames an overlay box is held on the re-stream after its triggering
    /// detection (spec §4.6, default 36).
    pub hold_frames: u64,
    /// Idle timeout (ms) before the Dispatcher logs an ingest gap.
    pub ingest_idle_timeout_ms: u64,
    /// Per-tile send deadline (ms) before the Dispatcher drops a tile-set.
    pub tile_send_deadline_ms: u64,
    /// Root directory for this channel's workspace (`blocks/`, `frames/`, …).
    pub workspace_root: String,
    /// Starting `dol_id` for the first track session (spec scenario S2 uses
    /// `10000`).
    pub initial_dol_id: u64,
    /// Optional Gaussian blur radius applied after resizing to `shape`, as a
    /// cheap noise-floor reduction ahead of background subtraction. `0.0`
    /// disables it.
    pub blur_radius: f32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            video_stream: String::new(),
            shape: (1280, 720),
            rows: 3,
            cols: 3,
            sample_rate: 1,
            pre_cache: 0,
            max_streams_cache: 500,
            max_cache: 600,
            pre_frames: 50,
            future_frames: 50,
            detect_internal: 10,
            search_window_size: 5,
            similarity_thresh: 0.05,
            max_rects_per_frame: 3,
            render: true,
            push_stream: false,
            push_to: None,
            detect_mode: DetectMode::Classify,
            save_box: false,
            hold_frames: 36,
            ingest_idle_timeout_ms: 5_000,
            tile_send_deadline_ms: 200,
            workspace_root: "workspace".to_string(),
            initial_dol_id: 10_000,
            blur_radius: 0.0,
        }
    }
}

impl ChannelConfig {
    /// Validates every field spec §6 documents an effect for.
    pub fn validate(&self) -> Result<(), DetectError> {
        if self.shape.0 == 0 || self.shape.1 == 0 {
            return Err(DetectError::validation("shape", "must be non-zero", format!("{:?}", self.shape)));
        }
        if self.rows == 0 || self.cols == 0 {
            return Err(DetectError::validation(
                "routine.row/col",
                "must each be >= 1",
                format!("{}x{}", self.rows, self.cols),
            ));
        }
        if self.sample_rate == 0 {
            return Err(DetectError::validation("sample_rate", "must be >= 1", self.sample_rate.to_string()));
        }
        if self.max_cache as u64 <= self.pre_frames + self.future_frames {
            return Err(DetectError::validation(
                "max_cache",
                "must exceed pre_frames + future_frames so a clip's range always fits",
                self.max_cache.to_string(),
            ));
        }
        if self.similarity_thresh < 0.0 {
            return Err(DetectError::validation(
                "similarity_thresh",
                "must be >= 0.0",
                self.similarity_thresh.to_string(),
            ));
        }
        if self.max_rects_per_frame == 0 {
            return Err(DetectError::validation(
                "max_rects_per_frame",
                "must be >= 1",
                self.max_rects_per_frame.to_string(),
            ));
        }
        if self.push_stream && self.push_to.is_none() {
            return Err(DetectError::validation(
                "push_to",
                "required when push_stream is enabled",
                "None".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tile_count(&self) -> u32 {
        self.rows * self.cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ChannelConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_sample_rate_is_invalid() {
        let mut cfg = ChannelConfig::default();
        cfg.sample_rate = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn max_cache_must_exceed_roll_window() {
        let mut cfg = ChannelConfig::default();
        cfg.max_cache = 10;
        cfg.pre_frames = 50;
        cfg.future_frames = 50;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn push_stream_requires_push_to() {
        let mut cfg = ChannelConfig::default();
        cfg.push_stream = true;
        cfg.push_to = None;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn deserializes_from_json_with_defaults_for_missing_fields() {
        let json = r#"{"channel": 2, "video_stream": "rtsp://cam/2"}"#;
        let cfg: ChannelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.channel, 2);
        assert_eq!(cfg.sample_rate, 1); // default
    }
}
