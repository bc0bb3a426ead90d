//! Raw frame and tile views.

use std::sync::Arc;
use std::time::SystemTime;

/// An immutable raw RGB frame, shape `(height, width, 3)`.
///
/// Mirrors `cap_rtsp::BgraFrame`'s zero-copy shape (`Arc<Vec<u8>>` pixel data,
/// explicit stride) rather than re-deriving a buffer layout from scratch:
/// cloning a `Frame` is an `Arc` bump, never a pixel copy.
#[derive(Clone)]
pub struct Frame {
    /// Tightly- or loosely-packed RGB8 pixel data, `stride * height` bytes.
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    /// Bytes per row; may exceed `width * 3` if the ingest source pads rows.
    pub stride: usize,
    /// Monotonic per-channel frame index, starting at 1. Strictly increasing
    /// on the write side (see `crate::cache::FrameCache` invariants).
    pub frame_index: u64,
    /// Wall-clock arrival time, used only for diagnostics/overlay text.
    pub arrived_at: SystemTime,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, frame_index: u64) -> Self {
        let stride = width as usize * 3;
        debug_assert_eq!(data.len(), stride * height as usize);
        Self {
            data: Arc::new(data),
            width,
            height,
            stride,
            frame_index,
            arrived_at: SystemTime::now(),
        }
    }

    /// Pixel bytes for one row, honoring `stride`.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * 3]
    }

    /// Copy a sub-rectangle out as a standalone `image::RgbImage`. Tiling and
    /// cropping both go through this — it's the one place stride padding
    /// gets compacted away before per-pixel analysis.
    pub fn crop_rgb(&self, x: u32, y: u32, w: u32, h: u32) -> image::RgbImage {
        let mut out = image::RgbImage::new(w, h);
        for row in 0..h {
            let src = self.row(y + row);
            let src_px = &src[(x as usize * 3)..((x + w) as usize * 3)];
            let dst_row_start = row as usize * w as usize * 3;
            out.as_mut()[dst_row_start..dst_row_start + src_px.len()].copy_from_slice(src_px);
        }
        out
    }

    /// The whole frame as an owned `image::RgbImage` (compacts stride).
    pub fn to_rgb_image(&self) -> image::RgbImage {
        self.crop_rgb(0, 0, self.width, self.height)
    }

    /// Convert to a tightly-packed BGRA buffer for handing to `cap_rtsp`'s
    /// BGRA-only appsrc pipeline (re-streamer and clip writer both need this).
    pub fn to_bgra(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.width as usize * self.height as usize * 4];
        for y in 0..self.height {
            let row = self.row(y);
            for x in 0..self.width as usize {
                let si = x * 3;
                let di = (y as usize * self.width as usize + x) * 4;
                out[di] = row[si + 2];
                out[di + 1] = row[si + 1];
                out[di + 2] = row[si];
                out[di + 3] = 255;
            }
        }
        out
    }
}

/// A view of a [`Frame`] restricted to one grid cell, plus the coordinates
/// the Reconstructor needs to rejoin it with its siblings.
#[derive(Clone)]
pub struct Tile {
    pub frame_index: u64,
    pub row: u32,
    pub col: u32,
    /// Tile origin in full-frame coordinates; used to remap candidate
    /// rectangles back to full-frame space (spec §4.2).
    pub origin_x: u32,
    pub origin_y: u32,
    pub image: image::RgbImage,
    /// Full frame shape this tile was cut from, forwarded so the Motion
    /// Worker can compute frame-global mean color without holding the frame.
    pub full_shape: (u32, u32),
}

impl Tile {
    pub fn from_frame(frame: &Frame, row: u32, col: u32, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            frame_index: frame.frame_index,
            row,
            col,
            origin_x: x,
            origin_y: y,
            image: frame.crop_rgb(x, y, w, h),
            full_shape: (frame.width, frame.height),
        }
    }

    /// Overrides the tile's image after construction — used by tests and by
    /// the de-duplicator, which builds a whole-frame "tile" purely to reuse
    /// [`crate::pipeline::motion::run_motion_detection`] without re-deriving
    /// its own copy of the motion pipeline.
    pub fn with_image(mut self, image: image::RgbImage) -> Self {
        self.image = image;
        self
    }
}
