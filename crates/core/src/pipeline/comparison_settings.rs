use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::detection_params::{
    CascadeParams, DetectorParams, NeuralParams, ParamsError,
};
use crate::shared::engine_kind::EngineKind;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {engine} settings: {source}")]
    Invalid {
        engine: EngineKind,
        #[source]
        source: ParamsError,
    },
}

/// Parameters for both engines, as read from a JSON settings file.
///
/// Missing sections and fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonSettings {
    pub classical: CascadeParams,
    pub neural: NeuralParams,
}

impl ComparisonSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validates both sections up front, for callers that want to reject bad
    /// input before running anything.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.classical
            .validate()
            .map_err(|source| SettingsError::Invalid {
                engine: EngineKind::Classical,
                source,
            })?;
        self.neural.validate().map_err(|source| SettingsError::Invalid {
            engine: EngineKind::Neural,
            source,
        })
    }
}
