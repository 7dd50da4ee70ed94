use std::path::Path;

use image::imageops;
use imageproc::contrast::equalize_histogram;

use crate::detection::domain::detection_params::CascadeParams;
use crate::detection::domain::face_detector::{DetectorError, FaceDetector};
use crate::detection::infrastructure::haar_cascade::{CascadeError, HaarCascade, MultiScaleOptions};
use crate::shared::face_rect::FaceRect;
use crate::shared::frame::Frame;

/// Classical face detector: histogram-equalized grayscale into a Haar cascade.
pub struct CascadeFaceDetector {
    cascade: HaarCascade,
}

impl CascadeFaceDetector {
    pub fn new(cascade: HaarCascade) -> Self {
        Self { cascade }
    }

    /// Load the cascade definition from an OpenCV XML file.
    pub fn from_file(path: &Path) -> Result<Self, CascadeError> {
        let cascade = HaarCascade::from_file(path)?;
        let (w, h) = cascade.window_size();
        log::info!(
            "Loaded Haar cascade {} ({} stages, {w}x{h} window)",
            path.display(),
            cascade.stage_count()
        );
        Ok(Self::new(cascade))
    }
}

impl FaceDetector for CascadeFaceDetector {
    type Params = CascadeParams;

    fn detect(
        &mut self,
        frame: &Frame,
        params: &CascadeParams,
    ) -> Result<Vec<FaceRect>, DetectorError> {
        // Full resolution; the grayscale buffer lives only for this call.
        let gray = imageops::grayscale(&frame.as_image());
        let equalized = equalize_histogram(&gray);

        let options = MultiScaleOptions {
            scale_factor: params.scale_factor,
            min_neighbors: params.min_neighbors,
            min_size: params.min_size,
            max_size: None,
        };
        Ok(self.cascade.detect_multi_scale(&equalized, &options)?)
    }
}
