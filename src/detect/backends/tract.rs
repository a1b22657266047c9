#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use super::{DEFAULT_BASE_CONFIDENCE, DEFAULT_IOU_THRESHOLD};
use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// Expects a single `[1, 3, H, W]` float input in 0..1 and a
/// `[1, 4 + classes, anchors]` output of centre-format boxes followed by
/// per-class scores (anchors-major `[1, anchors, 4 + classes]` is accepted
/// too). Frames are stretched to the model input size, so normalized boxes
/// map straight back onto the original frame.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    base_confidence: f32,
    iou_threshold: f32,
    classes: Option<Vec<usize>>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            base_confidence: DEFAULT_BASE_CONFIDENCE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            classes: None,
        })
    }

    /// Override the confidence floor used when no hint is passed.
    pub fn with_base_confidence(mut self, threshold: f32) -> Self {
        self.base_confidence = threshold;
        self
    }

    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Only report these class indices.
    pub fn with_classes(mut self, classes: Vec<usize>) -> Self {
        self.classes = Some(classes);
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = frame.to_rgb_image()?;
        let resized = if image.dimensions() == (self.width, self.height) {
            image
        } else {
            imageops::resize(&image, self.width, self.height, FilterType::Triangle)
        };

        let width = self.width as usize;
        let pixels = resized.as_raw();
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }
}

/// How to read one raw detection output.
struct DecodeParams<'a> {
    /// Model input size; box coordinates are in these pixels.
    width: u32,
    height: u32,
    classes: Option<&'a [usize]>,
    floor: f32,
    iou_threshold: f32,
}

/// Decode a YOLO-style `[1, 4 + nc, anchors]` (or anchors-major) output
/// into normalized detections, keeping scores strictly above the floor.
fn decode_detections(output: &Tensor, params: &DecodeParams<'_>) -> Result<Vec<Detection>> {
    let view = output
        .to_array_view::<f32>()
        .context("model output tensor was not f32")?
        .into_dimensionality::<tract_ndarray::Ix3>()
        .context("expected a rank-3 detection output")?;

    let (_, a, b) = view.dim();
    // Fewer rows than columns means attributes-major ([1, 4 + nc, anchors]).
    let (attributes, anchors, attributes_major) = if a <= b { (a, b, true) } else { (b, a, false) };
    if attributes < 5 {
        return Err(anyhow!(
            "detection output has {} attributes, expected at least 5",
            attributes
        ));
    }
    let at = |attr: usize, anchor: usize| {
        if attributes_major {
            view[[0, attr, anchor]]
        } else {
            view[[0, anchor, attr]]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best: Option<(usize, f32)> = None;
        for class_id in 0..attributes - 4 {
            if params.classes.is_some_and(|allowed| !allowed.contains(&class_id)) {
                continue;
            }
            let score = at(4 + class_id, anchor);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((class_id, score));
            }
        }
        let Some((class_id, score)) = best else {
            continue;
        };
        if !(score > params.floor) {
            continue;
        }

        let cx = at(0, anchor) / params.width as f32;
        let cy = at(1, anchor) / params.height as f32;
        let w = at(2, anchor) / params.width as f32;
        let h = at(3, anchor) / params.height as f32;
        candidates.push(Detection::new(score).with_class(class_id).with_box(BoundingBox {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
            w,
            h,
        }));
    }

    Ok(non_max_suppression(candidates, params.iou_threshold))
}

/// Greedy per-class NMS, highest confidence first.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id
                && match (&k.bbox, &candidate.bbox) {
                    (Some(a), Some(b)) => a.iou(b) > iou_threshold,
                    _ => false,
                }
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame, min_confidence: Option<f32>) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        decode_detections(
            output,
            &DecodeParams {
                width: self.width,
                height: self.height,
                classes: self.classes.as_deref(),
                floor: min_confidence.unwrap_or(self.base_confidence),
                iou_threshold: self.iou_threshold,
            },
        )
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.width, self.height, [114, 114, 114]);
        self.detect(&blank, None).map(|_| ())
    }
}
