pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::detect::backend::DetectorBackend;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Confidence floor applied when the caller passes no hint, matching the
/// usual YOLO export default.
pub const DEFAULT_BASE_CONFIDENCE: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Backends selectable from configuration.
///
/// The model backend is the default; the stub invents verdicts from pixel
/// hashes and must be asked for by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// ONNX model through tract (feature: backend-tract).
    #[default]
    Tract,
    /// Pixel-hash stub for dry runs; loads no model.
    Stub,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Stub => f.write_str("stub"),
            BackendKind::Tract => f.write_str("tract"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(BackendKind::Stub),
            "tract" | "onnx" => Ok(BackendKind::Tract),
            other => Err(format!(
                "unknown detector backend '{}'; expected stub or tract",
                other
            )),
        }
    }
}

/// Model settings handed to [`build_backend`].
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorOptions {
    pub model_path: PathBuf,
    /// Square model input edge in pixels.
    pub input_size: u32,
    /// Only report these class indices; `None` keeps every class.
    pub classes: Option<Vec<usize>>,
    /// Floor used when the sampler passes no threshold hint.
    pub base_confidence: f32,
    pub iou_threshold: f32,
}

impl DetectorOptions {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: DEFAULT_INPUT_SIZE,
            classes: None,
            base_confidence: DEFAULT_BASE_CONFIDENCE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

/// Construct a backend.
pub fn build_backend(kind: BackendKind, options: &DetectorOptions) -> Result<Box<dyn DetectorBackend>> {
    match kind {
        BackendKind::Stub => {
            log::warn!(
                "detector: stub backend selected; verdicts are synthetic and model {} is not loaded",
                options.model_path.display()
            );
            Ok(Box::new(StubBackend::new()))
        }
        BackendKind::Tract => build_tract(options),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(options: &DetectorOptions) -> Result<Box<dyn DetectorBackend>> {
    log::info!(
        "detector: tract backend, model {} at {}x{}",
        options.model_path.display(),
        options.input_size,
        options.input_size
    );
    let mut backend = TractBackend::new(&options.model_path, options.input_size, options.input_size)?
        .with_base_confidence(options.base_confidence)
        .with_iou_threshold(options.iou_threshold);
    if let Some(classes) = &options.classes {
        backend = backend.with_classes(classes.clone());
    }
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(options: &DetectorOptions) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow::anyhow!(
        "cannot load model {}: the tract backend requires the backend-tract feature \
         (use --backend stub for a synthetic dry run)",
        options.model_path.display()
    ))
}
