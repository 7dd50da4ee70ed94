//! Runs a Haar cascade and a neural face detector against the same image
//! and compares their detections, crops and latency.

pub mod detection {
    pub mod domain {
        pub mod detection_error;
        pub mod detection_params;
        pub mod detection_result;
        pub mod face_detector;
    }
    pub mod infrastructure;
}

pub mod engine {
    pub mod domain {
        pub mod asset_fetcher;
        pub mod engine_slot;
        pub mod engine_status;
    }
    pub mod infrastructure;
}

pub mod media {
    pub mod image_file_reader;
    pub mod image_file_writer;
}

pub mod pipeline {
    pub mod compare_detectors_use_case;
    pub mod comparison;
    pub mod comparison_settings;
}

pub mod rendering {
    pub mod crop;
    pub mod overlay;
}

pub mod shared {
    pub mod constants;
    pub mod engine_kind;
    pub mod face_rect;
    pub mod frame;
}
