use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Load state of a detection engine.
///
/// Starts at `Loading` and settles exactly once, to `Ready` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Loading,
    Ready,
    Error,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal engine status transition {from} -> {to}")]
pub struct StatusTransitionError {
    pub from: EngineStatus,
    pub to: EngineStatus,
}

impl EngineStatus {
    /// Returns the next status if `self -> next` is a legal transition.
    pub fn transition(self, next: EngineStatus) -> Result<EngineStatus, StatusTransitionError> {
        match (self, next) {
            (EngineStatus::Loading, EngineStatus::Ready | EngineStatus::Error) => Ok(next),
            _ => Err(StatusTransitionError {
                from: self,
                to: next,
            }),
        }
    }

    pub fn is_settled(self) -> bool {
        self != EngineStatus::Loading
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineStatus::Loading => write!(f, "loading"),
            EngineStatus::Ready => write!(f, "ready"),
            EngineStatus::Error => write!(f, "error"),
        }
    }
}
