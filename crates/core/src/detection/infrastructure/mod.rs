pub mod cascade_face_detector;
pub mod haar_cascade;
pub mod math;
pub mod onnx_session;
pub mod onnx_yolo_detector;
pub mod rect_grouping;
