use std::time::Duration;

use crate::shared::face_rect::FaceRect;

/// A padded face crop, encoded as a standalone PNG.
#[derive(Debug, Clone, PartialEq)]
pub struct CroppedFace {
    /// Padded and clamped region of the source image the crop was taken from.
    pub region: FaceRect,
    pub png: Vec<u8>,
}

/// Outcome of one engine's successful detection run.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    faces: Vec<FaceRect>,
    cropped_faces: Vec<CroppedFace>,
    processing_time: Duration,
}

impl DetectionResult {
    pub fn new(
        faces: Vec<FaceRect>,
        cropped_faces: Vec<CroppedFace>,
        processing_time: Duration,
    ) -> Self {
        Self {
            faces,
            cropped_faces,
            processing_time,
        }
    }

    pub fn faces(&self) -> &[FaceRect] {
        &self.faces
    }

    pub fn cropped_faces(&self) -> &[CroppedFace] {
        &self.cropped_faces
    }

    /// Wall-clock time of the detect call, excluding engine load and cropping.
    pub fn processing_time_ms(&self) -> f64 {
        self.processing_time.as_secs_f64() * 1000.0
    }
}
