//! Classifier and SSD detector: "consumed" model-inference collaborators
//! (spec §6). Both variants are unified behind [`DetectFullFrame`] so the
//! Reconstructor/Gate can run either mode through the same call site (spec
//! §9 design note: "keep them as two implementations of a common 'detect
//! full frame -> list of rectangles' interface").

use async_trait::async_trait;
use image::RgbImage;

use crate::error::DetectResult;
use crate::model::Rectangle;

/// A classifier's verdict for one cropped candidate rectangle.
#[derive(Debug, Clone)]
pub struct ClassifiedCrop {
    pub rect: Rectangle,
    pub class_id: String,
    pub score: f32,
}

/// "a pure function `(image) -> (class_id, score)`" (spec §6).
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, crop: &RgbImage) -> DetectResult<(String, f32)>;
}

/// One SSD detection on the full frame, already scoped to a rectangle.
#[derive(Debug, Clone)]
pub struct SsdDetection {
    pub rect: Rectangle,
    pub class_id: String,
    pub score: f32,
}

/// "a function `([image]) -> [[rect_with_score]]`" (spec §6), called here
/// one frame at a time by the Reconstructor.
#[async_trait]
pub trait SsdDetector: Send + Sync {
    async fn detect(&self, frame: &RgbImage) -> DetectResult<Vec<SsdDetection>>;
}

/// Common contract both detection modes satisfy: given a full frame and a
/// set of motion-derived candidate crops (empty for the SSD path, which
/// ignores its argument and runs on the whole frame), return the
/// classifier-gated rectangles with scores, restricted to the target class.
///
/// [`crate::pipeline::reconstructor::Reconstructor`] calls exactly one
/// implementation of this trait per frame, so the rest of the pipeline
/// (dedup, recorder, emitter, restreamer) never branches on `detect_mode`.
#[async_trait]
pub trait DetectFullFrame: Send + Sync {
    async fn detect_full_frame(
        &self,
        frame: &RgbImage,
        candidates: &[Rectangle],
        target_class: &str,
    ) -> DetectResult<Vec<(Rectangle, f32)>>;
}

/// Adapts a per-crop [`Classifier`] plus the tile stage's candidate
/// rectangles into a [`DetectFullFrame`] implementation (the `CLASSIFY`
/// path, spec §4.3 step 3).
pub struct ClassifyGate<C> {
    pub classifier: C,
}

#[async_trait]
impl<C: Classifier> DetectFullFrame for ClassifyGate<C> {
    async fn detect_full_frame(
        &self,
        frame: &RgbImage,
        candidates: &[Rectangle],
        target_class: &str,
    ) -> DetectResult<Vec<(Rectangle, f32)>> {
        let mut out = Vec::with_capacity(candidates.len());
        for &rect in candidates {
            let clamped = rect.clamped(frame.width(), frame.height());
            let crop = image::imageops::crop_imm(frame, clamped.x, clamped.y, clamped.w, clamped.h)
                .to_image();
            let (class_id, score) = self.classifier.classify(&crop).await?;
            if class_id == target_class {
                out.push((rect, score));
            }
        }
        Ok(out)
    }
}

/// Adapts a full-frame [`SsdDetector`] into a [`DetectFullFrame`]
/// implementation (the `SSD` path, spec §4.3 "Alternate gate mode",
/// confidence threshold 0.7).
pub struct SsdGate<D> {
    pub detector: D,
    pub confidence_threshold: f32,
}

#[async_trait]
impl<D: SsdDetector> DetectFullFrame for SsdGate<D> {
    async fn detect_full_frame(
        &self,
        frame: &RgbImage,
        _candidates: &[Rectangle],
        target_class: &str,
    ) -> DetectResult<Vec<(Rectangle, f32)>> {
        let detections = self.detector.detect(frame).await?;
        Ok(detections
            .into_iter()
            .filter(|d| d.class_id == target_class && d.score >= self.confidence_threshold)
            .map(|d| (d.rect, d.score))
            .collect())
    }
}
