use std::any::Any;
use std::thread::{self, ScopedJoinHandle};

use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::detection_params::{CascadeParams, DetectorParams, NeuralParams};
use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::face_detector::FaceDetector;
use crate::engine::domain::engine_slot::EngineSlot;
use crate::pipeline::comparison::{Comparison, EngineOutcome};
use crate::pipeline::comparison_settings::ComparisonSettings;
use crate::rendering::crop::crop_faces;
use crate::shared::engine_kind::EngineKind;
use crate::shared::frame::Frame;

/// Runs the classical and neural detectors side by side on one image.
///
/// Each engine runs on its own scoped thread against the shared frame. A
/// failure or panic in one branch becomes that engine's error and never
/// affects the other.
pub struct CompareDetectorsUseCase<C, N> {
    classical: EngineSlot<C>,
    neural: EngineSlot<N>,
}

impl<C, N> CompareDetectorsUseCase<C, N>
where
    C: FaceDetector<Params = CascadeParams>,
    N: FaceDetector<Params = NeuralParams>,
{
    pub fn new(classical: EngineSlot<C>, neural: EngineSlot<N>) -> Self {
        Self { classical, neural }
    }

    pub fn execute(&mut self, frame: &Frame, settings: &ComparisonSettings) -> Comparison {
        let classical_slot = &mut self.classical;
        let neural_slot = &mut self.neural;

        thread::scope(|scope| {
            let classical =
                scope.spawn(move || run_branch(classical_slot, frame, &settings.classical));
            let neural = scope.spawn(move || run_branch(neural_slot, frame, &settings.neural));
            Comparison {
                classical: join_branch(EngineKind::Classical, classical),
                neural: join_branch(EngineKind::Neural, neural),
            }
        })
    }
}

/// Not ready -> validate -> timed detect -> crop.
fn run_branch<D: FaceDetector>(
    slot: &mut EngineSlot<D>,
    frame: &Frame,
    params: &D::Params,
) -> EngineOutcome {
    let engine = slot.kind();
    let detector = slot.ready_detector()?;
    params
        .validate()
        .map_err(|source| DetectionError::InvalidParams { engine, source })?;

    let timed = detector
        .detect_timed(frame, params)
        .map_err(|e| DetectionError::Engine {
            engine,
            message: e.to_string(),
        })?;
    let cropped = crop_faces(frame, &timed.faces)
        .map_err(|source| DetectionError::Render { engine, source })?;

    let result = DetectionResult::new(timed.faces, cropped, timed.elapsed);
    log::info!(
        "{}: {} face(s) in {:.1} ms",
        engine.label(),
        result.faces().len(),
        result.processing_time_ms()
    );
    Ok(result)
}

fn join_branch(engine: EngineKind, handle: ScopedJoinHandle<'_, EngineOutcome>) -> EngineOutcome {
    let outcome = handle.join().unwrap_or_else(|payload| {
        Err(DetectionError::Panicked {
            engine,
            message: panic_message(payload.as_ref()),
        })
    });
    if let Err(e) = &outcome {
        log::warn!("{e}");
    }
    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
