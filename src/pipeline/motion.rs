//! # Motion Worker
//!
//! One long-lived task per tile coordinate (spec §4.2, §9: "R·C long-lived
//! workers consuming from dedicated bounded channels, not ad-hoc task
//! submission per frame"). Reads `(tile, frame_index, full_shape)` off its
//! input channel, runs background-subtraction-style foreground extraction,
//! and emits exactly one [`TileResult`] per tile, remapped to full-frame
//! coordinates.

use tokio::sync::mpsc;

use crate::model::{Rectangle, Tile, TileResult};

/// Tunable motion-detection parameters (spec §4.2).
#[derive(Debug, Clone, Copy)]
pub struct MotionConfig {
    /// Adaptive-mean threshold block size (must be odd, >= 3).
    pub block_size: u32,
    /// Constant subtracted from the local mean before thresholding.
    pub threshold_c: i16,
    /// Morphological open kernel radius.
    pub morph_radius: u32,
    /// Components smaller than this are discarded as noise.
    pub min_area: u64,
    /// Components larger than this are discarded (covers the whole tile —
    /// usually a lighting flash, not an object).
    pub max_area: u64,
    /// Maximum allowed per-channel deviation of a component's mean color
    /// from the frame-global mean color.
    pub max_color_deviation: f32,
    /// Gaussian-blur radius used as a mean-shift-filter approximation
    /// (`cv2.pyrMeanShiftFiltering`) before grayscale conversion and the
    /// frame-global mean. Zero disables smoothing.
    pub smoothing_radius: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            block_size: 11,
            threshold_c: 5,
            morph_radius: 1,
            min_area: 16,
            max_area: 200_000,
            max_color_deviation: 80.0,
            smoothing_radius: 2.0,
        }
    }
}

/// One candidate component before full-frame remapping.
struct Component {
    bbox: (u32, u32, u32, u32), // x, y, w, h, tile-local
    area: u64,
    mean_color: [f32; 3],
}

fn to_grayscale(img: &image::RgbImage) -> Vec<u16> {
    img.pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            (u16::from(r) * 299 + u16::from(g) * 587 + u16::from(b) * 114) / 1000
        })
        .collect()
}

/// Adaptive mean threshold: a pixel is foreground if it exceeds the mean of
/// its `block_size x block_size` neighbourhood by more than `threshold_c`.
/// Implemented with a running row-sum integral image so cost stays O(wh).
fn adaptive_threshold(gray: &[u16], w: u32, h: u32, cfg: &MotionConfig) -> Vec<bool> {
    let (w, h) = (w as i64, h as i64);
    let radius = (cfg.block_size as i64 / 2).max(1);
    let mut integral = vec![0i64; ((w + 1) * (h + 1)) as usize];
    let stride = (w + 1) as usize;
    for y in 0..h {
        let mut row_sum = 0i64;
        for x in 0..w {
            row_sum += i64::from(gray[(y * w + x) as usize]);
            integral[((y + 1) as usize) * stride + (x + 1) as usize] =
                integral[(y as usize) * stride + (x + 1) as usize] + row_sum;
        }
    }
    let sum_rect = |x0: i64, y0: i64, x1: i64, y1: i64| -> i64 {
        let x0 = x0.clamp(0, w);
        let y0 = y0.clamp(0, h);
        let x1 = x1.clamp(0, w);
        let y1 = y1.clamp(0, h);
        integral[(y1 as usize) * stride + x1 as usize]
            - integral[(y0 as usize) * stride + x1 as usize]
            - integral[(y1 as usize) * stride + x0 as usize]
            + integral[(y0 as usize) * stride + x0 as usize]
    };
    let mut out = vec![false; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let x0 = x - radius;
            let y0 = y - radius;
            let x1 = x + radius + 1;
            let y1 = y + radius + 1;
            let count = ((x1.min(w) - x0.max(0)) * (y1.min(h) - y0.max(0))).max(1);
            let local_mean = sum_rect(x0, y0, x1, y1) / count;
            let px = i64::from(gray[(y * w + x) as usize]);
            out[(y * w + x) as usize] = px > local_mean + i64::from(cfg.threshold_c);
        }
    }
    out
}

/// Morphological open: erode then dilate, both with a square structuring
/// element of side `2 * radius + 1`. Removes isolated foreground speckle
/// without eating into larger components.
fn morphological_open(mask: &[bool], w: u32, h: u32, radius: u32) -> Vec<bool> {
    if radius == 0 {
        return mask.to_vec();
    }
    let erode = |m: &[bool]| -> Vec<bool> {
        let mut out = vec![false; m.len()];
        let r = radius as i64;
        for y in 0..h as i64 {
            for x in 0..w as i64 {
                let mut all_set = true;
                'k: for dy in -r..=r {
                    for dx in -r..=r {
                        let (nx, ny) = (x + dx, y + dy);
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            all_set = false;
                            break 'k;
                        }
                        if !m[(ny * w as i64 + nx) as usize] {
                            all_set = false;
                            break 'k;
                        }
                    }
                }
                out[(y * w as i64 + x) as usize] = all_set;
            }
        }
        out
    };
    let dilate = |m: &[bool]| -> Vec<bool> {
        let mut out = vec![false; m.len()];
        let r = radius as i64;
        for y in 0..h as i64 {
            for x in 0..w as i64 {
                let mut any_set = false;
                'k: for dy in -r..=r {
                    for dx in -r..=r {
                        let (nx, ny) = (x + dx, y + dy);
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            continue;
                        }
                        if m[(ny * w as i64 + nx) as usize] {
                            any_set = true;
                            break 'k;
                        }
                    }
                }
                out[(y * w as i64 + x) as usize] = any_set;
            }
        }
        out
    };
    dilate(&erode(mask))
}

/// 4-connectivity union-find labeling. Returns one [`Component`] per label.
fn connected_components(mask: &[bool], img: &image::RgbImage, w: u32, h: u32) -> Vec<Component> {
    let (w, h) = (w as usize, h as usize);
    let mut labels = vec![0usize; w * h];
    let mut next_label = 1usize;
    let mut parent: Vec<usize> = vec![0];

    fn find(parent: &mut Vec<usize>, mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }
    fn union(parent: &mut Vec<usize>, a: usize, b: usize) {
        let (ra, rb) = (find(parent, a), find(parent, b));
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
    }

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            if !mask[idx] {
                continue;
            }
            let up = if y > 0 && mask[idx - w] { labels[idx - w] } else { 0 };
            let left = if x > 0 && mask[idx - 1] { labels[idx - 1] } else { 0 };
            let label = match (up, left) {
                (0, 0) => {
                    let l = next_label;
                    next_label += 1;
                    parent.push(l);
                    l
                }
                (0, l) | (l, 0) => l,
                (a, b) => {
                    union(&mut parent, a, b);
                    a.min(b)
                }
            };
            labels[idx] = label;
        }
    }

    let mut components: std::collections::HashMap<usize, Component> = std::collections::HashMap::new();
    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            if labels[idx] == 0 {
                continue;
            }
            let root = find(&mut parent, labels[idx]);
            let px = img.get_pixel(x as u32, y as u32).0;
            let entry = components.entry(root).or_insert_with(|| Component {
                bbox: (x as u32, y as u32, x as u32, y as u32),
                area: 0,
                mean_color: [0.0; 3],
            });
            entry.bbox.0 = entry.bbox.0.min(x as u32);
            entry.bbox.1 = entry.bbox.1.min(y as u32);
            entry.bbox.2 = entry.bbox.2.max(x as u32);
            entry.bbox.3 = entry.bbox.3.max(y as u32);
            entry.area += 1;
            for c in 0..3 {
                entry.mean_color[c] += f32::from(px[c]);
            }
        }
    }

    components
        .into_values()
        .map(|mut c| {
            for v in &mut c.mean_color {
                *v /= c.area.max(1) as f32;
            }
            let (x0, y0, x1, y1) = c.bbox;
            c.bbox = (x0, y0, x1 - x0 + 1, y1 - y0 + 1);
            c
        })
        .collect()
}

fn frame_mean_color(img: &image::RgbImage) -> [f32; 3] {
    let mut sum = [0f64; 3];
    let n = img.pixels().len().max(1) as f64;
    for p in img.pixels() {
        for c in 0..3 {
            sum[c] += f64::from(p.0[c]);
        }
    }
    [
        (sum[0] / n) as f32,
        (sum[1] / n) as f32,
        (sum[2] / n) as f32,
    ]
}

/// Run the full motion-detection algorithm on one tile, producing
/// full-frame-remapped candidate rectangles plus the tile-local mask.
pub fn run_motion_detection(tile: &Tile, cfg: &MotionConfig) -> TileResult {
    let (w, h) = tile.image.dimensions();
    // Approximates `cv2.pyrMeanShiftFiltering`: a smoothed copy feeds the
    // grayscale conversion and the frame-global mean, while per-component
    // color below is still sampled from the raw tile (see
    // `test_bgsubstractor.py`'s `mog2`, which bitwise-ands the mask against
    // the un-smoothed resized frame, not the filtered one).
    let smoothed = if cfg.smoothing_radius > 0.0 {
        image::imageops::blur(&tile.image, cfg.smoothing_radius)
    } else {
        tile.image.clone()
    };
    let gray = to_grayscale(&smoothed);
    let thresholded = adaptive_threshold(&gray, w, h, cfg);
    let opened = morphological_open(&thresholded, w, h, cfg.morph_radius);
    let frame_mean = frame_mean_color(&smoothed);

    let components = connected_components(&opened, &tile.image, w, h);
    let mut rects = Vec::new();
    for comp in &components {
        if comp.area < cfg.min_area || comp.area > cfg.max_area {
            continue;
        }
        let deviation = (0..3)
            .map(|c| (comp.mean_color[c] - frame_mean[c]).abs())
            .fold(0.0f32, f32::max);
        if deviation > cfg.max_color_deviation {
            continue;
        }
        let (x, y, bw, bh) = comp.bbox;
        let local = Rectangle::new(x, y, bw, bh);
        rects.push(Rectangle::remap(local, tile.origin_x, tile.origin_y));
    }

    let mut mask_img = image::GrayImage::new(w, h);
    for (idx, set) in opened.iter().enumerate() {
        if *set {
            mask_img.put_pixel((idx as u32) % w, (idx as u32) / w, image::Luma([255]));
        }
    }

    TileResult {
        frame_index: tile.frame_index,
        row: tile.row,
        col: tile.col,
        rects,
        mask: mask_img,
    }
}

/// Spawns the long-lived worker task for one tile coordinate. Forwards
/// every [`TileResult`] to the Reconstructor's `reconstructor_tx` channel;
/// exits once `input` closes (i.e. the Dispatcher has shut down).
pub fn spawn_motion_worker(
    mut input: mpsc::Receiver<Tile>,
    reconstructor_tx: mpsc::Sender<TileResult>,
    cfg: MotionConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(tile) = input.recv().await {
            let result = run_motion_detection(&tile, &cfg);
            if reconstructor_tx.send(result).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Frame;

    fn solid_tile(color: [u8; 3], w: u32, h: u32) -> Tile {
        let mut img = image::RgbImage::new(w, h);
        for p in img.pixels_mut() {
            *p = image::Rgb(color);
        }
        let frame = Frame::new(vec![0u8; (w * h * 3) as usize], w, h, 1);
        Tile::from_frame(&frame, 0, 0, 0, 0, w, h).with_image(img)
    }

    #[test]
    fn uniform_tile_produces_no_candidates() {
        let tile = solid_tile([128, 128, 128], 32, 32);
        let result = run_motion_detection(&tile, &MotionConfig::default());
        assert!(result.rects.is_empty());
    }

    #[test]
    fn bright_square_on_dark_background_is_detected() {
        let w = 40;
        let h = 40;
        let mut img = image::RgbImage::new(w, h);
        for p in img.pixels_mut() {
            *p = image::Rgb([10, 10, 10]);
        }
        for y in 15..25 {
            for x in 15..25 {
                img.put_pixel(x, y, image::Rgb([250, 250, 250]));
            }
        }
        let frame = Frame::new(vec![0u8; (w * h * 3) as usize], w, h, 1);
        let tile = Tile::from_frame(&frame, 0, 0, 0, 0, w, h).with_image(img);
        let result = run_motion_detection(&tile, &MotionConfig::default());
        assert!(!result.rects.is_empty());
    }
}
