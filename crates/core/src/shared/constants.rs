pub const HAAR_CASCADE_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Optional: only used to draw `#n` label text on overlays.
pub const LABEL_FONT_URL: &str =
    "https://github.com/ultralytics/assets/releases/download/v0.0.0/Arial.ttf";

/// Directory name under the platform cache/data dir.
pub const APP_DIR_NAME: &str = "FaceCompare";
