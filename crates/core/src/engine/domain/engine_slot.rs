use crate::detection::domain::detection_error::DetectionError;
use crate::engine::domain::engine_status::{EngineStatus, StatusTransitionError};
use crate::shared::engine_kind::EngineKind;

/// Holds one engine's load status and, once ready, its detector.
///
/// The detector is only reachable through [`EngineSlot::ready_detector`],
/// which refuses while the engine is loading or failed.
pub struct EngineSlot<D> {
    kind: EngineKind,
    status: EngineStatus,
    detector: Option<D>,
    load_error: Option<String>,
}

impl<D> EngineSlot<D> {
    pub fn loading(kind: EngineKind) -> Self {
        Self {
            kind,
            status: EngineStatus::Loading,
            detector: None,
            load_error: None,
        }
    }

    pub fn mark_ready(&mut self, detector: D) -> Result<(), StatusTransitionError> {
        self.status = self.status.transition(EngineStatus::Ready)?;
        self.detector = Some(detector);
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), StatusTransitionError> {
        self.status = self.status.transition(EngineStatus::Error)?;
        self.load_error = Some(reason.into());
        Ok(())
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn ready_detector(&mut self) -> Result<&mut D, DetectionError> {
        match (self.status, self.detector.as_mut()) {
            (EngineStatus::Ready, Some(detector)) => Ok(detector),
            (status, _) => Err(DetectionError::NotReady {
                engine: self.kind,
                status,
                reason: self
                    .load_error
                    .clone()
                    .unwrap_or_else(|| "engine is still loading".to_string()),
            }),
        }
    }
}
