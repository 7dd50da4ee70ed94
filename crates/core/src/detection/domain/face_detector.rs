use std::time::{Duration, Instant};

use crate::detection::domain::detection_params::DetectorParams;
use crate::shared::face_rect::FaceRect;
use crate::shared::frame::Frame;

/// Error type engines return across the detector seam.
pub type DetectorError = Box<dyn std::error::Error + Send + Sync>;

/// Domain interface for a face detection engine adapter.
///
/// Each adapter converts its own parameter set into the engine's native call
/// and normalizes the engine output into [`FaceRect`]s in source-image pixels.
/// Adapters may keep native sessions between calls, hence `&mut self`.
pub trait FaceDetector: Send {
    type Params: DetectorParams + Send + Sync;

    fn detect(
        &mut self,
        frame: &Frame,
        params: &Self::Params,
    ) -> Result<Vec<FaceRect>, DetectorError>;

    /// Runs [`detect`](Self::detect) and measures its wall-clock time only.
    fn detect_timed(
        &mut self,
        frame: &Frame,
        params: &Self::Params,
    ) -> Result<TimedDetection, DetectorError> {
        let start = Instant::now();
        let faces = self.detect(frame, params)?;
        Ok(TimedDetection {
            faces,
            elapsed: start.elapsed(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedDetection {
    pub faces: Vec<FaceRect>,
    pub elapsed: Duration,
}
