//! # Continuous-Detection De-duplicator
//!
//! Suppresses bursts of near-identical detections within `detect_internal`
//! frames of a prior positive, voting on SSIM similarity over the next
//! `search_window_size` cached frames (spec §4.4). Invoked inline from the
//! Reconstructor rather than as its own task — spec §9 keeps `TrackSession`
//! single-threaded, and this has no state of its own to protect.

use crate::cache::FrameCache;
use crate::config::ChannelConfig;
use crate::model::{Rectangle, Tile};

use super::motion::{run_motion_detection, MotionConfig};

pub struct Deduplicator {
    similarity_thresh: f64,
    search_window_size: u64,
    detect_internal: i64,
}

impl Deduplicator {
    pub fn new(cfg: &ChannelConfig) -> Self {
        Self {
            similarity_thresh: cfg.similarity_thresh,
            search_window_size: cfg.search_window_size,
            detect_internal: cfg.detect_internal,
        }
    }

    /// Whether a positive at `current_index` even enters the suppression
    /// check (spec §4.4 trigger condition: a prior positive within
    /// `detect_internal` frames).
    pub fn in_suppression_window(&self, current_index: u64, last_detection: i64) -> bool {
        if last_detection < 0 {
            return false;
        }
        let delta = current_index as i64 - last_detection;
        (0..=self.detect_internal).contains(&delta)
    }

    /// Runs the SSIM-voting procedure against the next `search_window_size`
    /// cached frames. `current_crop` is the crop of `current_rect` at
    /// `current_index`; `motion_cfg` is reused so the re-run motion stage
    /// matches the live pipeline.
    pub fn should_suppress(
        &self,
        cache: &FrameCache,
        current_index: u64,
        current_rect: Rectangle,
        current_crop: &image::RgbImage,
        motion_cfg: &MotionConfig,
    ) -> bool {
        let mut scores = Vec::new();
        for offset in 1..=self.search_window_size {
            let Some(frame) = cache.get(current_index + offset) else { continue };
            let tile = Tile::from_frame(&frame, 0, 0, 0, 0, frame.width, frame.height);
            let result = run_motion_detection(&tile, motion_cfg);
            let Some(matched) = closest_rect(&result.rects, current_rect) else { continue };
            let clamped = matched.clamped(frame.width, frame.height);
            let candidate_crop = frame.crop_rgb(clamped.x, clamped.y, clamped.w, clamped.h);
            scores.push(ssim_gray(current_crop, &candidate_crop));
        }
        if scores.is_empty() {
            return false;
        }
        std_dev(&scores) <= self.similarity_thresh
    }
}

fn closest_rect(rects: &[Rectangle], reference: Rectangle) -> Option<Rectangle> {
    rects.iter().copied().min_by_key(|r| center_distance_sq(*r, reference))
}

fn center_distance_sq(a: Rectangle, b: Rectangle) -> i64 {
    let (ax, ay) = (a.x as i64 + a.w as i64 / 2, a.y as i64 + a.h as i64 / 2);
    let (bx, by) = (b.x as i64 + b.w as i64 / 2, b.y as i64 + b.h as i64 / 2);
    (ax - bx).pow(2) + (ay - by).pow(2)
}

fn std_dev(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Global (whole-crop) grayscale SSIM, resizing the candidate to the
/// reference's dimensions first so the comparison is always well-defined
/// even when the re-run motion stage finds a slightly different bbox.
fn ssim_gray(reference: &image::RgbImage, candidate: &image::RgbImage) -> f64 {
    let (w, h) = reference.dimensions();
    let candidate_owned;
    let candidate = if candidate.dimensions() == (w, h) {
        candidate
    } else {
        candidate_owned = image::imageops::resize(candidate, w.max(1), h.max(1), image::imageops::FilterType::Triangle);
        &candidate_owned
    };

    let to_gray = |img: &image::RgbImage| -> Vec<f64> {
        img.pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)
            })
            .collect()
    };
    let a = to_gray(reference);
    let b = to_gray(candidate);
    let n = a.len().max(1) as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let var_a = a.iter().map(|v| (v - mean_a).powi(2)).sum::<f64>() / n;
    let var_b = b.iter().map(|v| (v - mean_b).powi(2)).sum::<f64>() / n;
    let covar = a.iter().zip(&b).map(|(x, y)| (x - mean_a) * (y - mean_b)).sum::<f64>() / n;

    let c1 = (0.01 * 255.0) * (0.01 * 255.0);
    let c2 = (0.03 * 255.0) * (0.03 * 255.0);
    ((2.0 * mean_a * mean_b + c1) * (2.0 * covar + c2)) / ((mean_a * mean_a + mean_b * mean_b + c1) * (var_a + var_b + c2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Frame;
    use image::GenericImageView;

    fn cfg(detect_internal: i64, search_window_size: u64, similarity_thresh: f64) -> ChannelConfig {
        let mut c = ChannelConfig::default();
        c.detect_internal = detect_internal;
        c.search_window_size = search_window_size;
        c.similarity_thresh = similarity_thresh;
        c
    }

    #[test]
    fn outside_window_never_triggers_suppression_check() {
        let dedup = Deduplicator::new(&cfg(10, 5, 0.05));
        assert!(!dedup.in_suppression_window(25, 10)); // delta 15 > detect_internal 10
    }

    #[test]
    fn first_ever_positive_is_never_suppressed() {
        let dedup = Deduplicator::new(&cfg(10, 5, 0.05));
        assert!(!dedup.in_suppression_window(3, -1));
    }

    #[test]
    fn inside_window_with_identical_frames_is_suppressed() {
        let dedup = Deduplicator::new(&cfg(10, 3, 0.2));
        let cache = FrameCache::new(50);
        let w = 20u32;
        let h = 20u32;
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
        for idx in 1..=5u64 {
            cache.insert(Frame::new(data.clone(), w, h, idx));
        }
        let rect = Rectangle::new(5, 5, 10, 10);
        let crop = img.view(5, 5, 10, 10).to_image();
        assert!(dedup.should_suppress(&cache, 1, rect, &crop, &MotionConfig::default()));
    }
}
