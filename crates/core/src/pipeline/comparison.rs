use std::fmt;

use serde::Serialize;

use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::detection_result::DetectionResult;
use crate::shared::engine_kind::EngineKind;
use crate::shared::face_rect::FaceRect;

/// One engine's outcome: a result or an error, never both.
pub type EngineOutcome = Result<DetectionResult, DetectionError>;

/// Both engines' outcomes for the same input image.
#[derive(Debug)]
pub struct Comparison {
    pub classical: EngineOutcome,
    pub neural: EngineOutcome,
}

impl Comparison {
    pub fn outcome(&self, engine: EngineKind) -> &EngineOutcome {
        match engine {
            EngineKind::Classical => &self.classical,
            EngineKind::Neural => &self.neural,
        }
    }

    pub fn all_failed(&self) -> bool {
        self.classical.is_err() && self.neural.is_err()
    }

    pub fn report(&self) -> ComparisonReport {
        ComparisonReport {
            engines: EngineKind::ALL
                .iter()
                .map(|&engine| EngineReport::new(engine, self.outcome(engine)))
                .collect(),
        }
    }
}

/// Printable and serializable summary of a [`Comparison`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub engines: Vec<EngineReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineReport {
    pub engine: EngineKind,
    pub label: &'static str,
    pub faces: Vec<FaceRect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EngineReport {
    fn new(engine: EngineKind, outcome: &EngineOutcome) -> Self {
        match outcome {
            Ok(result) => Self {
                engine,
                label: engine.label(),
                faces: result.faces().to_vec(),
                processing_time_ms: Some(result.processing_time_ms()),
                error: None,
            },
            Err(e) => Self {
                engine,
                label: engine.label(),
                faces: Vec::new(),
                processing_time_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, engine) in self.engines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{engine}")?;
        }
        Ok(())
    }
}

impl fmt::Display for EngineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]", self.label, self.engine)?;
        if let Some(error) = &self.error {
            return writeln!(f, "  Error: {error}");
        }
        let ms = self.processing_time_ms.unwrap_or_default();
        if self.faces.is_empty() {
            return writeln!(f, "  No faces detected ({ms:.1} ms)");
        }
        writeln!(f, "  {} face(s) in {ms:.1} ms", self.faces.len())?;
        for (i, face) in self.faces.iter().enumerate() {
            writeln!(
                f,
                "  #{}: x={} y={} w={} h={}",
                i + 1,
                face.x,
                face.y,
                face.width,
                face.height
            )?;
        }
        Ok(())
    }
}
