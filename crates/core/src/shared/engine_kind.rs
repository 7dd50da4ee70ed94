use std::fmt;

use image::Rgb;
use serde::{Deserialize, Serialize};

/// Identifies one of the two detection pipelines being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Classical,
    Neural,
}

impl EngineKind {
    pub const ALL: &[EngineKind] = &[EngineKind::Classical, EngineKind::Neural];

    /// Lowercase identifier used in file names and machine-readable output.
    pub fn slug(self) -> &'static str {
        match self {
            EngineKind::Classical => "classical",
            EngineKind::Neural => "neural",
        }
    }

    /// Human-readable engine description.
    pub fn label(self) -> &'static str {
        match self {
            EngineKind::Classical => "Haar cascade",
            EngineKind::Neural => "YOLO face (ONNX)",
        }
    }

    pub fn overlay_color(self) -> Rgb<u8> {
        match self {
            EngineKind::Classical => Rgb([34, 197, 94]),
            EngineKind::Neural => Rgb([59, 130, 246]),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_slug() {
        for kind in EngineKind::ALL {
            assert_eq!(kind.to_string(), kind.slug());
        }
    }

    #[test]
    fn test_overlay_colors_differ() {
        assert_ne!(
            EngineKind::Classical.overlay_color(),
            EngineKind::Neural.overlay_color()
        );
    }

    #[test]
    fn test_serializes_lowercase() {
        let json = serde_json::to_string(&EngineKind::Neural).unwrap();
        assert_eq!(json, "\"neural\"");
    }
}
