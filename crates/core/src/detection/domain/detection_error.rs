use thiserror::Error;

use crate::detection::domain::detection_params::ParamsError;
use crate::engine::domain::engine_status::EngineStatus;
use crate::rendering::crop::RenderError;
use crate::shared::engine_kind::EngineKind;

/// Why one engine's branch of a comparison produced no result.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("{engine} engine is not ready ({status}): {reason}")]
    NotReady {
        engine: EngineKind,
        status: EngineStatus,
        reason: String,
    },
    #[error("{engine} parameters rejected: {source}")]
    InvalidParams {
        engine: EngineKind,
        #[source]
        source: ParamsError,
    },
    #[error("{engine} detection failed: {message}")]
    Engine { engine: EngineKind, message: String },
    #[error("{engine} detector panicked: {message}")]
    Panicked { engine: EngineKind, message: String },
    #[error("{engine} face cropping failed: {source}")]
    Render {
        engine: EngineKind,
        #[source]
        source: RenderError,
    },
}
