use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;
pub const DEFAULT_MIN_NEIGHBORS: u32 = 3;
pub const DEFAULT_MIN_SIZE: u32 = 30;

pub const DEFAULT_INPUT_SIZE: u32 = 416;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// Neural input resolutions must be divisible by the network stride.
pub const INPUT_SIZE_STRIDE: u32 = 32;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("scale factor must be greater than 1.0, got {0}")]
    ScaleFactor(f64),
    #[error("input size must be a positive multiple of 32, got {0}")]
    InputSize(u32),
    #[error("score threshold must be strictly between 0 and 1, got {0}")]
    ScoreThreshold(f32),
}

/// Validation shared by every engine's parameter set.
pub trait DetectorParams {
    fn validate(&self) -> Result<(), ParamsError>;
}

/// Knobs for the Haar cascade multi-scale search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeParams {
    /// Pyramid step between search scales; must exceed 1.
    pub scale_factor: f64,
    /// Minimum grouped candidates for a detection to survive. 0 keeps raw hits.
    pub min_neighbors: u32,
    /// Smallest search window, in source pixels.
    pub min_size: u32,
}

impl Default for CascadeParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: DEFAULT_MIN_SIZE,
        }
    }
}

impl DetectorParams for CascadeParams {
    fn validate(&self) -> Result<(), ParamsError> {
        // Written negated so NaN is rejected too.
        if !(self.scale_factor > 1.0) || !self.scale_factor.is_finite() {
            return Err(ParamsError::ScaleFactor(self.scale_factor));
        }
        Ok(())
    }
}

/// Knobs for the neural detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralParams {
    /// Square inference resolution.
    pub input_size: u32,
    pub score_threshold: f32,
}

impl Default for NeuralParams {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

impl DetectorParams for NeuralParams {
    fn validate(&self) -> Result<(), ParamsError> {
        if self.input_size == 0 || self.input_size % INPUT_SIZE_STRIDE != 0 {
            return Err(ParamsError::InputSize(self.input_size));
        }
        if !(self.score_threshold > 0.0 && self.score_threshold < 1.0) {
            return Err(ParamsError::ScoreThreshold(self.score_threshold));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        assert!(CascadeParams::default().validate().is_ok());
        assert!(NeuralParams::default().validate().is_ok());
    }

    #[rstest]
    #[case(1.0)]
    #[case(0.9)]
    #[case(-2.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn test_cascade_rejects_bad_scale_factor(#[case] scale_factor: f64) {
        let params = CascadeParams {
            scale_factor,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParamsError::ScaleFactor(_))
        ));
    }

    #[test]
    fn test_cascade_accepts_zero_neighbors_and_size() {
        let params = CascadeParams {
            scale_factor: 1.05,
            min_neighbors: 0,
            min_size: 0,
        };
        assert!(params.validate().is_ok());
    }

    #[rstest]
    #[case(0)]
    #[case(100)]
    #[case(417)]
    fn test_neural_rejects_input_size(#[case] input_size: u32) {
        let params = NeuralParams {
            input_size,
            ..Default::default()
        };
        assert_eq!(params.validate(), Err(ParamsError::InputSize(input_size)));
    }

    #[rstest]
    #[case(128)]
    #[case(320)]
    #[case(608)]
    fn test_neural_accepts_stride_multiples(#[case] input_size: u32) {
        let params = NeuralParams {
            input_size,
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    #[case(-0.1)]
    #[case(f32::NAN)]
    fn test_neural_rejects_score_threshold(#[case] score_threshold: f32) {
        let params = NeuralParams {
            score_threshold,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParamsError::ScoreThreshold(_))
        ));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let params: CascadeParams = serde_json::from_str(r#"{"min_neighbors": 7}"#).unwrap();
        assert_eq!(params.min_neighbors, 7);
        assert_eq!(params.scale_factor, DEFAULT_SCALE_FACTOR);
        assert_eq!(params.min_size, DEFAULT_MIN_SIZE);
    }
}
