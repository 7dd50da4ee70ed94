/// YOLO face detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, score filtering, NMS and the
/// mapping of boxes back into source-image pixels.
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::detection::domain::detection_params::NeuralParams;
use crate::detection::domain::face_detector::{DetectorError, FaceDetector};
use crate::detection::infrastructure::math::bbox_iou;
use crate::detection::infrastructure::onnx_session;
use crate::shared::face_rect::FaceRect;
use crate::shared::frame::Frame;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Letterbox fill value (YOLO convention).
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Leading values per prediction row: `cx, cy, w, h, score`.
const MIN_ROW_LEN: usize = 5;

#[derive(Error, Debug)]
pub enum OnnxError {
    #[error("failed to load ONNX model {path}: {message}")]
    Load { path: PathBuf, message: String },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model produced no outputs")]
    NoOutputs,
    #[error("unexpected YOLO output shape: {0:?}")]
    OutputShape(Vec<usize>),
}

/// YOLO face detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    fixed_input_size: Option<u32>,
    warned_size_override: bool,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// Models exported with a fixed input shape (NCHW) always run at that
    /// size; dynamic models run at the requested `input_size`.
    pub fn new(model_path: &Path) -> Result<Self, OnnxError> {
        let session = onnx_session::open_session(model_path).map_err(|e| OnnxError::Load {
            path: model_path.to_path_buf(),
            message: e.to_string(),
        })?;
        let fixed_input_size = onnx_session::fixed_input_size(&session);
        match fixed_input_size {
            Some(size) => log::info!("Loaded YOLO model {} ({size}x{size})", model_path.display()),
            None => log::info!("Loaded YOLO model {} (dynamic input)", model_path.display()),
        }
        Ok(Self {
            session,
            fixed_input_size,
            warned_size_override: false,
        })
    }

    fn inference_size(&mut self, requested: u32) -> u32 {
        match self.fixed_input_size {
            Some(fixed) => {
                if fixed != requested && !self.warned_size_override {
                    log::warn!(
                        "YOLO model has a fixed {fixed}x{fixed} input; ignoring requested input size {requested}"
                    );
                    self.warned_size_override = true;
                }
                fixed
            }
            None => requested,
        }
    }

    fn infer(&mut self, input: ndarray::Array4<f32>) -> Result<(Vec<f32>, Vec<usize>), OnnxError> {
        let input_value = ort::value::Tensor::from_array(input)
            .map_err(|e| OnnxError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| OnnxError::Inference(e.to_string()))?;
        if outputs.len() == 0 {
            return Err(OnnxError::NoOutputs);
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| OnnxError::Inference(e.to_string()))?;
        // Logical-order copy; the output view may not be contiguous.
        let data: Vec<f32> = tensor.iter().copied().collect();
        let shape = tensor.shape().to_vec();
        Ok((data, shape))
    }
}

impl FaceDetector for OnnxYoloDetector {
    type Params = NeuralParams;

    fn detect(
        &mut self,
        frame: &Frame,
        params: &NeuralParams,
    ) -> Result<Vec<FaceRect>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let size = self.inference_size(params.input_size);
        let (input, letterbox) = letterbox(frame, size);
        let (data, shape) = self.infer(input)?;

        let mut raw = decode(&data, &shape, params.score_threshold, &letterbox)?;
        let kept = nms(&mut raw, NMS_IOU_THRESH);

        Ok(kept
            .iter()
            .map(|d| d.to_face_rect(frame.width(), frame.height()))
            .filter(|r| !r.is_empty())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Geometry of a letterbox resize, needed to map boxes back.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn to_source(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Letterbox-resize a frame to `target_size` x `target_size` as an NCHW
/// float tensor in `[0, 1]`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = ndarray::Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        PAD_VALUE,
    );

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbour resize into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

/// A scored box in source-image coordinates (corner form).
#[derive(Clone, Debug, PartialEq)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    score: f64,
}

impl RawDetection {
    fn bbox(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Round to whole pixels and clamp to the frame.
    fn to_face_rect(&self, width: u32, height: u32) -> FaceRect {
        let clamp = |v: f64, max: u32| v.round().clamp(0.0, max as f64) as u32;
        let x1 = clamp(self.x1, width);
        let y1 = clamp(self.y1, height);
        let x2 = clamp(self.x2, width).max(x1);
        let y2 = clamp(self.y2, height).max(y1);
        FaceRect::new(x1, y1, x2 - x1, y2 - y1)
    }
}

/// Parse YOLO output rows `[cx, cy, w, h, score, ...]` above the threshold.
///
/// Accepts `[1, detections, features]` as well as the transposed
/// `[1, features, detections]` layout most exports produce.
fn decode(
    data: &[f32],
    shape: &[usize],
    score_threshold: f32,
    letterbox: &Letterbox,
) -> Result<Vec<RawDetection>, OnnxError> {
    let &[_, a, b] = shape else {
        return Err(OnnxError::OutputShape(shape.to_vec()));
    };
    let transposed = a < b;
    let (num_dets, num_feats) = if transposed { (b, a) } else { (a, b) };
    if num_feats < MIN_ROW_LEN || data.len() < num_dets * num_feats {
        return Err(OnnxError::OutputShape(shape.to_vec()));
    }

    let value = |det: usize, feat: usize| {
        if transposed {
            data[feat * num_dets + det]
        } else {
            data[det * num_feats + feat]
        }
    };

    let mut dets = Vec::new();
    for i in 0..num_dets {
        let score = value(i, 4);
        if score < score_threshold {
            continue;
        }
        let (cx, cy, w, h) = (
            value(i, 0) as f64,
            value(i, 1) as f64,
            value(i, 2) as f64,
            value(i, 3) as f64,
        );
        let (x1, y1) = letterbox.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_source(cx + w / 2.0, cy + h / 2.0);
        dets.push(RawDetection {
            x1,
            y1,
            x2,
            y2,
            score: score as f64,
        });
    }
    Ok(dets)
}

/// Greedy NMS: sort by score descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && bbox_iou(&dets[i].bbox(), &dets[j].bbox()) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
