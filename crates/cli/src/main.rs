use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use ab_glyph::FontArc;
use clap::Parser;

use facecompare_core::detection::domain::face_detector::DetectorError;
use facecompare_core::detection::infrastructure::cascade_face_detector::CascadeFaceDetector;
use facecompare_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use facecompare_core::engine::infrastructure::asset_loader::AssetLoader;
use facecompare_core::engine::infrastructure::asset_resolver::CachedAssetFetcher;
use facecompare_core::engine::infrastructure::engine_bootstrap::{
    EngineBootstrap, EngineBuilder, EngineEvent, ProgressReporter,
};
use facecompare_core::media::image_file_reader::read_image;
use facecompare_core::media::image_file_writer::{ImageFileWriter, ImageWriteError};
use facecompare_core::pipeline::compare_detectors_use_case::CompareDetectorsUseCase;
use facecompare_core::pipeline::comparison::{Comparison, EngineOutcome};
use facecompare_core::pipeline::comparison_settings::ComparisonSettings;
use facecompare_core::rendering::overlay::{draw_detections, load_font};
use facecompare_core::shared::constants::{HAAR_CASCADE_URL, LABEL_FONT_URL, YOLO_MODEL_URL};
use facecompare_core::shared::engine_kind::EngineKind;
use facecompare_core::shared::frame::Frame;

/// Compare a Haar cascade and a neural face detector on one image.
#[derive(Parser, Debug)]
#[command(name = "facecompare")]
struct Cli {
    /// Input image file.
    image: PathBuf,

    /// Directory for face crops and overlays.
    #[arg(long, default_value = "facecompare-out")]
    out_dir: PathBuf,

    /// JSON settings file with `classical` and `neural` sections.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Haar pyramid scale step (> 1.0).
    #[arg(long)]
    scale_factor: Option<f64>,

    /// Neighbouring hits a Haar detection needs to survive.
    #[arg(long)]
    min_neighbors: Option<u32>,

    /// Smallest Haar search window in pixels.
    #[arg(long)]
    min_size: Option<u32>,

    /// Neural inference resolution (multiple of 32).
    #[arg(long)]
    input_size: Option<u32>,

    /// Neural score threshold (0.0-1.0, exclusive).
    #[arg(long)]
    score_threshold: Option<f32>,

    /// Use a local Haar cascade XML instead of downloading one.
    #[arg(long)]
    cascade: Option<PathBuf>,

    /// Use a local YOLO face ONNX model instead of downloading one.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// Skip writing overlay images.
    #[arg(long)]
    no_overlay: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;
    let settings = build_settings(&cli)?;
    let frame = read_image(&cli.image)?;

    let loader = Arc::new(AssetLoader::new(Box::new(
        CachedAssetFetcher::with_default_cache()?,
    )));
    let bootstrap = EngineBootstrap::start(
        Arc::clone(&loader),
        cascade_builder(cli.cascade.clone()),
        yolo_builder(cli.model.clone()),
    );
    // The font download overlaps with engine loading.
    let font = if cli.no_overlay {
        None
    } else {
        load_label_font(&loader)
    };
    let (classical, neural) = bootstrap.wait(report_event);

    let mut use_case = CompareDetectorsUseCase::new(classical, neural);
    let comparison = use_case.execute(&frame, &settings);

    finish(&cli, &frame, &comparison, font.as_ref())
}

/// Prints the report, then writes each engine's files. Output write failures
/// are logged per engine and never change the exit status.
fn finish(
    cli: &Cli,
    frame: &Frame,
    comparison: &Comparison,
    font: Option<&FontArc>,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = comparison.report();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    let written = write_outputs(cli, frame, comparison, font);
    log::debug!("Outputs written for {written} engine(s)");

    if comparison.all_failed() {
        return Err("both detection engines failed".into());
    }
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.image.exists() {
        return Err(format!("Input file not found: {}", cli.image.display()).into());
    }
    for (flag, path) in [("--cascade", &cli.cascade), ("--model", &cli.model)] {
        if let Some(path) = path {
            if !path.exists() {
                return Err(format!("{flag} file not found: {}", path.display()).into());
            }
        }
    }
    if let Some(config) = &cli.config {
        if !config.exists() {
            return Err(format!("Settings file not found: {}", config.display()).into());
        }
    }
    Ok(())
}

/// Settings file (if any), then individual flags on top.
fn build_settings(cli: &Cli) -> Result<ComparisonSettings, Box<dyn std::error::Error>> {
    let mut settings = match &cli.config {
        Some(path) => ComparisonSettings::load(path)?,
        None => ComparisonSettings::default(),
    };
    if let Some(v) = cli.scale_factor {
        settings.classical.scale_factor = v;
    }
    if let Some(v) = cli.min_neighbors {
        settings.classical.min_neighbors = v;
    }
    if let Some(v) = cli.min_size {
        settings.classical.min_size = v;
    }
    if let Some(v) = cli.input_size {
        settings.neural.input_size = v;
    }
    if let Some(v) = cli.score_threshold {
        settings.neural.score_threshold = v;
    }
    settings.validate()?;
    Ok(settings)
}

fn cascade_builder(local: Option<PathBuf>) -> EngineBuilder<CascadeFaceDetector> {
    Box::new(
        move |loader: &AssetLoader,
              reporter: ProgressReporter|
              -> Result<CascadeFaceDetector, DetectorError> {
            let path = match local {
                Some(path) => path,
                None => loader.load(HAAR_CASCADE_URL, Some(reporter.into_progress_fn()))?,
            };
            Ok(CascadeFaceDetector::from_file(&path)?)
        },
    )
}

fn yolo_builder(local: Option<PathBuf>) -> EngineBuilder<OnnxYoloDetector> {
    Box::new(
        move |loader: &AssetLoader,
              reporter: ProgressReporter|
              -> Result<OnnxYoloDetector, DetectorError> {
            let path = match local {
                Some(path) => path,
                None => loader.load(YOLO_MODEL_URL, Some(reporter.into_progress_fn()))?,
            };
            Ok(OnnxYoloDetector::new(&path)?)
        },
    )
}

/// Label text is optional: any failure only disables it.
fn load_label_font(loader: &AssetLoader) -> Option<FontArc> {
    let font = loader
        .load(LABEL_FONT_URL, None)
        .map_err(|e| e.to_string())
        .and_then(|path| load_font(&path).map_err(|e| e.to_string()));
    match font {
        Ok(font) => Some(font),
        Err(e) => {
            log::warn!("Overlay labels will have no text: {e}");
            None
        }
    }
}

/// Returns how many engines had all of their files written.
fn write_outputs(
    cli: &Cli,
    frame: &Frame,
    comparison: &Comparison,
    font: Option<&FontArc>,
) -> usize {
    let writer = ImageFileWriter::new(&cli.out_dir);
    let mut written = 0;

    for &engine in EngineKind::ALL {
        match write_engine_outputs(&writer, cli, frame, engine, comparison.outcome(engine), font) {
            Ok(true) => written += 1,
            Ok(false) => {}
            Err(e) => log::warn!("Skipping remaining {engine} outputs: {e}"),
        }
    }
    written
}

/// Clears this engine's crops from earlier runs, then writes the new ones.
/// Returns `false` when the engine has no result to write.
fn write_engine_outputs(
    writer: &ImageFileWriter,
    cli: &Cli,
    frame: &Frame,
    engine: EngineKind,
    outcome: &EngineOutcome,
    font: Option<&FontArc>,
) -> Result<bool, ImageWriteError> {
    let stale = writer.remove_matching(&crop_file_prefix(engine), ".png")?;
    if stale > 0 {
        log::debug!("Removed {stale} stale {engine} crop(s)");
    }
    let Ok(result) = outcome else {
        return Ok(false);
    };

    for (i, crop) in result.cropped_faces().iter().enumerate() {
        writer.write_bytes(&crop_file_name(engine, i), &crop.png)?;
    }
    if !cli.no_overlay {
        let overlay = draw_detections(frame, result.faces(), engine.overlay_color(), font);
        writer.write_image(&overlay_file_name(engine), &overlay)?;
    }
    log::info!(
        "Wrote {} {} crop(s) to {}",
        result.cropped_faces().len(),
        engine,
        writer.out_dir().display()
    );
    Ok(true)
}

fn crop_file_prefix(engine: EngineKind) -> String {
    format!("{}_face_", engine.slug())
}

/// `<engine>_face_<n>.png`, numbered from 1 like the overlay labels.
fn crop_file_name(engine: EngineKind, index: usize) -> String {
    format!("{}{}.png", crop_file_prefix(engine), index + 1)
}

fn overlay_file_name(engine: EngineKind) -> String {
    format!("{}_overlay.png", engine.slug())
}

fn report_event(event: &EngineEvent) {
    match event {
        EngineEvent::Progress {
            engine,
            downloaded,
            total,
        } => download_progress(*engine, *downloaded, *total),
        EngineEvent::Ready(engine) => eprintln!("\r{:<60}", format!("{} ready", engine.label())),
        EngineEvent::Failed { engine, reason } => {
            eprintln!("\r{:<60}", format!("{} failed: {reason}", engine.label()))
        }
    }
}

fn download_progress(engine: EngineKind, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {} assets... {pct}%", engine.label());
    } else {
        eprint!("\rDownloading {} assets... {downloaded} bytes", engine.label());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use facecompare_core::detection::domain::detection_error::DetectionError;
    use facecompare_core::detection::domain::detection_result::{CroppedFace, DetectionResult};
    use facecompare_core::shared::face_rect::FaceRect;
    use tempfile::TempDir;

    fn image_in(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("photo.png");
        fs::write(&path, b"png").unwrap();
        path
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("facecompare").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_without_flags() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let cli = parse(&[image.to_str().unwrap()]);

        assert!(validate(&cli).is_ok());
        assert_eq!(build_settings(&cli).unwrap(), ComparisonSettings::default());
        assert_eq!(cli.out_dir, PathBuf::from("facecompare-out"));
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let config = dir.path().join("settings.json");
        fs::write(
            &config,
            r#"{"classical": {"min_neighbors": 8, "min_size": 50}, "neural": {"input_size": 640}}"#,
        )
        .unwrap();

        let cli = parse(&[
            image.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "--min-size",
            "24",
            "--score-threshold",
            "0.3",
        ]);
        let settings = build_settings(&cli).unwrap();

        assert_eq!(settings.classical.min_neighbors, 8);
        assert_eq!(settings.classical.min_size, 24);
        assert_eq!(settings.neural.input_size, 640);
        assert_eq!(settings.neural.score_threshold, 0.3);
    }

    #[test]
    fn test_invalid_flag_values_rejected() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);

        let cli = parse(&[image.to_str().unwrap(), "--scale-factor", "1.0"]);
        assert!(build_settings(&cli).is_err());

        let cli = parse(&[image.to_str().unwrap(), "--input-size", "100"]);
        assert!(build_settings(&cli).is_err());
    }

    #[test]
    fn test_missing_input_rejected() {
        let cli = parse(&["/nonexistent/photo.jpg"]);
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn test_any_existing_file_passes_validation() {
        let dir = TempDir::new().unwrap();
        for name in ["face.tga", "scan.qoi", "upload"] {
            let path = dir.path().join(name);
            fs::write(&path, b"").unwrap();
            let cli = parse(&[path.to_str().unwrap()]);
            assert!(validate(&cli).is_ok(), "{name} rejected before decoding");
        }
    }

    #[test]
    fn test_missing_local_model_rejected() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let cli = parse(&[image.to_str().unwrap(), "--model", "/nonexistent/model.onnx"]);
        let err = validate(&cli).unwrap_err();
        assert!(err.to_string().contains("--model"));
    }

    #[test]
    fn test_output_file_names() {
        assert_eq!(crop_file_name(EngineKind::Classical, 0), "classical_face_1.png");
        assert_eq!(crop_file_name(EngineKind::Neural, 2), "neural_face_3.png");
        assert_eq!(overlay_file_name(EngineKind::Neural), "neural_overlay.png");
    }

    fn one_face_result() -> DetectionResult {
        let face = FaceRect::new(4, 4, 8, 8);
        DetectionResult::new(
            vec![face],
            vec![CroppedFace {
                region: FaceRect::new(2, 2, 12, 12),
                png: b"crop".to_vec(),
            }],
            Duration::from_millis(3),
        )
    }

    fn frame() -> Frame {
        Frame::new(vec![90u8; 20 * 20 * 3], 20, 20)
    }

    #[test]
    fn test_blocked_out_dir_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let out_dir = blocker.join("out");
        let cli = parse(&[
            image.to_str().unwrap(),
            "--out-dir",
            out_dir.to_str().unwrap(),
            "--no-overlay",
        ]);
        let comparison = Comparison {
            classical: Ok(one_face_result()),
            neural: Ok(one_face_result()),
        };

        assert_eq!(write_outputs(&cli, &frame(), &comparison, None), 0);
        assert!(finish(&cli, &frame(), &comparison, None).is_ok());
        assert!(!out_dir.exists());
    }

    #[test]
    fn test_both_engines_failing_is_an_error() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let out_dir = dir.path().join("out");
        let cli = parse(&[image.to_str().unwrap(), "--out-dir", out_dir.to_str().unwrap()]);
        let failed = |engine| DetectionError::Engine {
            engine,
            message: "boom".into(),
        };
        let comparison = Comparison {
            classical: Err(failed(EngineKind::Classical)),
            neural: Err(failed(EngineKind::Neural)),
        };

        assert!(finish(&cli, &frame(), &comparison, None).is_err());
    }

    #[test]
    fn test_stale_crops_are_replaced() {
        let dir = TempDir::new().unwrap();
        let image = image_in(&dir);
        let out_dir = dir.path().join("out");
        fs::create_dir(&out_dir).unwrap();
        for name in ["classical_face_3.png", "neural_face_2.png"] {
            fs::write(out_dir.join(name), b"old").unwrap();
        }
        let cli = parse(&[
            image.to_str().unwrap(),
            "--out-dir",
            out_dir.to_str().unwrap(),
            "--no-overlay",
        ]);
        let comparison = Comparison {
            classical: Ok(one_face_result()),
            neural: Err(DetectionError::Engine {
                engine: EngineKind::Neural,
                message: "boom".into(),
            }),
        };

        assert_eq!(write_outputs(&cli, &frame(), &comparison, None), 1);

        assert_eq!(fs::read(out_dir.join("classical_face_1.png")).unwrap(), b"crop");
        assert!(!out_dir.join("classical_face_3.png").exists());
        assert!(!out_dir.join("neural_face_2.png").exists());
    }
}
