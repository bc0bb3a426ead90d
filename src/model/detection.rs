//! Per-tile and per-frame detection results.

use super::Rectangle;

/// Output of one Motion Worker for one tile of one frame (spec §4.2).
///
/// Exactly one `TileResult` is emitted per input tile, possibly with an
/// empty `rects` list — the Reconstructor counts arrivals against `R*C` to
/// know when a frame index is complete, so a worker must never silently
/// drop a tile it was handed.
#[derive(Debug, Clone)]
pub struct TileResult {
    pub frame_index: u64,
    pub row: u32,
    pub col: u32,
    /// Candidate rectangles, already remapped to full-frame coordinates.
    pub rects: Vec<Rectangle>,
    /// Binary foreground mask, tile-local, kept only for diagnostic
    /// reconstruction (e.g. `save_box` crop debugging).
    pub mask: image::GrayImage,
}

/// Detection decision for a full frame index, produced by the Reconstructor
/// after gating candidate rectangles through the classifier.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub frame_index: u64,
    /// Rectangles that passed the classifier/SSD gate, target class only.
    pub rects: Vec<Rectangle>,
    /// Per-rectangle classifier confidence, same length/order as `rects`.
    pub scores: Vec<f32>,
    /// Whether `rects` is non-empty *and* not suppressed by the
    /// De-duplicator — this is the flag the Annotated Re-streamer and Event
    /// Recorder act on, distinct from "something was classified positive".
    pub detect_flag: bool,
}

impl DetectionResult {
    pub fn empty(frame_index: u64) -> Self {
        Self {
            frame_index,
            rects: Vec::new(),
            scores: Vec::new(),
            detect_flag: false,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.detect_flag && !self.rects.is_empty()
    }
}

/// Selects which full-frame detection strategy the Reconstructor/Gate uses
/// (spec §4.3 "Alternate gate mode"). Both variants implement the same
/// "detect full frame -> rectangles" contract (see
/// [`crate::external::classifier`]) so the rest of the pipeline — dedup,
/// recorder, emitter, restreamer — is mode-agnostic (spec §9 design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DetectMode {
    /// Tile + classifier path: motion detection narrows candidates, then a
    /// classifier gates each crop.
    Classify,
    /// Full-frame SSD detector path, confidence threshold applied inline.
    Ssd,
}
