//! Viola-Jones Haar cascade engine.
//!
//! Loads OpenCV's stage-based cascade XML (`opencv-cascade-classifier`
//! format) and evaluates it over an image pyramid with integral images.
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::GrayImage;
use roxmltree::{Document, Node};
use thiserror::Error;

use crate::detection::infrastructure::rect_grouping::{group_rectangles, GROUP_EPS};
use crate::shared::face_rect::FaceRect;

/// Most HAAR features combine two or three weighted rectangles.
const MAX_FEATURE_RECTS: usize = 3;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("missing <{0}> element in cascade")]
    MissingElement(&'static str),
    #[error("invalid value in <{element}>: {value:?}")]
    InvalidValue { element: &'static str, value: String },
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
    #[error("scale factor must be greater than 1.0, got {0}")]
    ScaleFactor(f64),
}

/// Multi-scale search settings, in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiScaleOptions {
    pub scale_factor: f64,
    pub min_neighbors: u32,
    pub min_size: u32,
    /// `None` searches up to the full image.
    pub max_size: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// A boosted decision tree. Node links `> 0` point at internal nodes, links
/// `<= 0` at leaf `-link`.
#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Debug, Clone)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone, Copy)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

impl HaarCascade {
    pub fn from_file(path: &Path) -> Result<Self, CascadeError> {
        let xml = std::fs::read_to_string(path).map_err(|source| CascadeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_xml(&xml)
    }

    pub fn from_xml(xml: &str) -> Result<Self, CascadeError> {
        let doc = Document::parse(xml)?;
        let cascade = doc
            .root_element()
            .children()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or(CascadeError::MissingElement("cascade"))?;

        if let Some(stage_type) = optional_text(cascade, "stageType") {
            if stage_type != "BOOST" {
                return Err(CascadeError::Unsupported(format!("stage type {stage_type}")));
            }
        }
        if let Some(feature_type) = optional_text(cascade, "featureType") {
            if feature_type != "HAAR" {
                return Err(CascadeError::Unsupported(format!(
                    "feature type {feature_type}"
                )));
            }
        }

        let window_width: u32 = parse_value(cascade, "width")?;
        let window_height: u32 = parse_value(cascade, "height")?;
        // The variance window is inset one pixel on every side.
        if window_width < 3 || window_height < 3 {
            return Err(CascadeError::Unsupported(format!(
                "window {window_width}x{window_height} is smaller than 3x3"
            )));
        }

        let stages = items(child(cascade, "stages")?)
            .map(parse_stage)
            .collect::<Result<Vec<_>, _>>()?;
        let features = items(child(cascade, "features")?)
            .map(parse_feature)
            .collect::<Result<Vec<_>, _>>()?;

        let cascade = Self {
            window_width,
            window_height,
            stages,
            features,
        };
        cascade.check_consistency()?;
        Ok(cascade)
    }

    /// Training window size `(width, height)`.
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Multi-scale sliding-window search followed by hit grouping.
    pub fn detect_multi_scale(
        &self,
        image: &GrayImage,
        options: &MultiScaleOptions,
    ) -> Result<Vec<FaceRect>, CascadeError> {
        if !(options.scale_factor > 1.0) || !options.scale_factor.is_finite() {
            return Err(CascadeError::ScaleFactor(options.scale_factor));
        }

        let (width, height) = image.dimensions();
        let mut candidates = Vec::new();
        let mut factor = 1.0f64;

        loop {
            let scaled_w = (width as f64 / factor).round() as u32;
            let scaled_h = (height as f64 / factor).round() as u32;
            if scaled_w < self.window_width || scaled_h < self.window_height {
                break;
            }
            let win_w = (self.window_width as f64 * factor).round() as u32;
            let win_h = (self.window_height as f64 * factor).round() as u32;
            if let Some(max) = options.max_size {
                if win_w > max || win_h > max {
                    break;
                }
            }
            if win_w < options.min_size || win_h < options.min_size {
                factor *= options.scale_factor;
                continue;
            }

            let scaled: Cow<'_, GrayImage> = if scaled_w == width && scaled_h == height {
                Cow::Borrowed(image)
            } else {
                Cow::Owned(imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle))
            };
            let integral = IntegralImage::new(&scaled);
            let step = if factor > 2.0 { 1 } else { 2 };
            let before = candidates.len();

            for y in (0..=scaled_h - self.window_height).step_by(step) {
                for x in (0..=scaled_w - self.window_width).step_by(step) {
                    if self.classify_window(&integral, x, y) {
                        candidates.push(FaceRect::new(
                            (x as f64 * factor).round() as u32,
                            (y as f64 * factor).round() as u32,
                            win_w,
                            win_h,
                        )
                        .clamp_to(width, height));
                    }
                }
            }

            log::debug!(
                "cascade scale {factor:.3}: {scaled_w}x{scaled_h}, {} hits",
                candidates.len() - before
            );
            factor *= options.scale_factor;
        }

        Ok(group_rectangles(&candidates, options.min_neighbors, GROUP_EPS))
    }

    /// Runs every stage on the window at `(x, y)`; rejects at the first miss.
    fn classify_window(&self, integral: &IntegralImage, x: u32, y: u32) -> bool {
        let inv_norm = integral.inverse_std_norm(
            x + 1,
            y + 1,
            self.window_width - 2,
            self.window_height - 2,
        );

        self.stages.iter().all(|stage| {
            let score: f64 = stage
                .classifiers
                .iter()
                .map(|classifier| {
                    classifier.evaluate(|feature| {
                        self.features[feature].value(integral, x, y) * inv_norm
                    })
                })
                .sum();
            score >= stage.threshold
        })
    }

    fn check_consistency(&self) -> Result<(), CascadeError> {
        if self.stages.is_empty() {
            return Err(CascadeError::Unsupported("cascade has no stages".into()));
        }
        for feature in &self.features {
            for r in &feature.rects {
                if r.x + r.width > self.window_width || r.y + r.height > self.window_height {
                    return Err(CascadeError::Unsupported(format!(
                        "feature rect {}x{} at ({}, {}) exceeds the window",
                        r.width, r.height, r.x, r.y
                    )));
                }
            }
        }
        for classifier in self.stages.iter().flat_map(|s| &s.classifiers) {
            for (index, node) in classifier.nodes.iter().enumerate() {
                if node.feature >= self.features.len() {
                    return Err(CascadeError::Unsupported(format!(
                        "node references feature {} of {}",
                        node.feature,
                        self.features.len()
                    )));
                }
                // Trees only link forward, so evaluation always reaches a leaf.
                for link in [node.left, node.right] {
                    let in_range = if link > 0 {
                        (link as usize) > index && (link as usize) < classifier.nodes.len()
                    } else {
                        (link.unsigned_abs() as usize) < classifier.leaves.len()
                    };
                    if !in_range {
                        return Err(CascadeError::Unsupported(format!(
                            "tree link {link} out of range"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl WeakClassifier {
    fn evaluate(&self, mut feature_value: impl FnMut(usize) -> f64) -> f64 {
        let mut idx = 0i32;
        loop {
            let node = &self.nodes[idx as usize];
            idx = if feature_value(node.feature) < node.threshold {
                node.left
            } else {
                node.right
            };
            if idx <= 0 {
                return self.leaves[idx.unsigned_abs() as usize];
            }
        }
    }
}

impl HaarFeature {
    fn value(&self, integral: &IntegralImage, ox: u32, oy: u32) -> f64 {
        self.rects
            .iter()
            .map(|r| integral.sum(ox + r.x, oy + r.y, r.width, r.height) as f64 * r.weight)
            .sum()
    }
}

/// Summed-area tables of pixel values and squared pixel values.
///
/// Both tables carry a leading zero row and column, so they are
/// `(w + 1) x (h + 1)`.
struct IntegralImage {
    stride: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq_sum = vec![0u64; stride * (h + 1)];
        let raw = image.as_raw();

        for y in 0..h {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = raw[y * w + x] as u64;
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + (x + 1);
                sum[idx] = sum[idx - stride] + row;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }

        Self {
            stride,
            sum,
            sq_sum,
        }
    }

    fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        rect_sum(&self.sum, self.stride, x, y, w, h)
    }

    /// `1 / (area * stddev)` of the given rect, the factor feature sums are
    /// normalized by. Flat regions fall back to 1.
    fn inverse_std_norm(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let area = (w as f64) * (h as f64);
        let s = self.sum(x, y, w, h) as f64;
        let sq = rect_sum(&self.sq_sum, self.stride, x, y, w, h) as f64;
        let norm = area * sq - s * s;
        if norm > 0.0 {
            1.0 / norm.sqrt()
        } else {
            1.0
        }
    }
}

fn rect_sum(table: &[u64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> u64 {
    let (x0, y0) = (x as usize, y as usize);
    let (x1, y1) = (x0 + w as usize, y0 + h as usize);
    table[y1 * stride + x1] + table[y0 * stride + x0] - table[y1 * stride + x0] - table[y0 * stride + x1]
}

// ---------------------------------------------------------------------------
// XML parsing
// ---------------------------------------------------------------------------

fn child<'a, 'input>(node: Node<'a, 'input>, name: &'static str) -> Result<Node<'a, 'input>, CascadeError> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or(CascadeError::MissingElement(name))
}

fn optional_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(str::trim)
}

/// Child elements of an OpenCV sequence node (`<_>` entries).
fn items<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn parse_value<T: FromStr>(node: Node<'_, '_>, name: &'static str) -> Result<T, CascadeError> {
    let raw = text(child(node, name)?);
    raw.parse().map_err(|_| CascadeError::InvalidValue {
        element: name,
        value: raw.to_string(),
    })
}

fn parse_numbers<T: FromStr>(node: Node<'_, '_>, name: &'static str) -> Result<Vec<T>, CascadeError> {
    let raw = text(child(node, name)?);
    raw.split_whitespace()
        .map(|token| {
            token.parse().map_err(|_| CascadeError::InvalidValue {
                element: name,
                value: token.to_string(),
            })
        })
        .collect()
}

fn parse_stage(node: Node<'_, '_>) -> Result<Stage, CascadeError> {
    let threshold = parse_value(node, "stageThreshold")?;
    let classifiers = items(child(node, "weakClassifiers")?)
        .map(parse_weak_classifier)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak_classifier(node: Node<'_, '_>) -> Result<WeakClassifier, CascadeError> {
    let raw_nodes: Vec<f64> = parse_numbers(node, "internalNodes")?;
    let leaves: Vec<f64> = parse_numbers(node, "leafValues")?;
    if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
        return Err(CascadeError::InvalidValue {
            element: "internalNodes",
            value: format!("{} values, expected groups of 4", raw_nodes.len()),
        });
    }

    let nodes = raw_nodes
        .chunks_exact(4)
        .map(|c| {
            if c[2] < 0.0 {
                return Err(CascadeError::InvalidValue {
                    element: "internalNodes",
                    value: format!("feature index {}", c[2]),
                });
            }
            Ok(TreeNode {
                left: c[0] as i32,
                right: c[1] as i32,
                feature: c[2] as usize,
                threshold: c[3],
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WeakClassifier { nodes, leaves })
}

fn parse_feature(node: Node<'_, '_>) -> Result<HaarFeature, CascadeError> {
    if let Some(tilted) = optional_text(node, "tilted") {
        if tilted != "0" {
            return Err(CascadeError::Unsupported("tilted HAAR features".into()));
        }
    }

    let rects = items(child(node, "rects")?)
        .map(|r| {
            let raw = text(r);
            let values: Vec<f64> = raw
                .split_whitespace()
                .map(|t| t.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| CascadeError::InvalidValue {
                    element: "rects",
                    value: raw.to_string(),
                })?;
            match values.as_slice() {
                &[x, y, w, h, weight] if x >= 0.0 && y >= 0.0 && w >= 0.0 && h >= 0.0 => {
                    Ok(WeightedRect {
                        x: x as u32,
                        y: y as u32,
                        width: w as u32,
                        height: h as u32,
                        weight,
                    })
                }
                _ => Err(CascadeError::InvalidValue {
                    element: "rects",
                    value: raw.to_string(),
                }),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    if rects.is_empty() || rects.len() > MAX_FEATURE_RECTS {
        return Err(CascadeError::Unsupported(format!(
            "feature with {} rects",
            rects.len()
        )));
    }
    Ok(HaarFeature { rects })
}
