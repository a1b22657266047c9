//! Turning a frame's detections into a presence / confidence verdict.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::detect::result::Detection;

/// Where the confidence threshold is applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdMode {
    /// Keep every detection. Confidence is the max over all of them; presence
    /// means at least one exceeds the threshold.
    #[default]
    PerDetection,
    /// The threshold is handed to the detector and detections at or below it
    /// are discarded. Presence means anything survived; confidence is the max
    /// of the survivors.
    Prefiltered,
}

impl ThresholdMode {
    /// Threshold hint to pass down to the detector.
    pub fn detector_hint(self, threshold: f32) -> Option<f32> {
        match self {
            ThresholdMode::PerDetection => None,
            ThresholdMode::Prefiltered => Some(threshold),
        }
    }
}

impl fmt::Display for ThresholdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdMode::PerDetection => f.write_str("per-detection"),
            ThresholdMode::Prefiltered => f.write_str("prefiltered"),
        }
    }
}

impl FromStr for ThresholdMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-detection" | "per_detection" => Ok(ThresholdMode::PerDetection),
            "prefiltered" | "pre-filtered" => Ok(ThresholdMode::Prefiltered),
            other => Err(format!(
                "unknown threshold mode '{}'; expected per-detection or prefiltered",
                other
            )),
        }
    }
}

/// Presence and confidence for one sampled frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Verdict {
    pub present: bool,
    /// Always within 0..=1; 0 when nothing fired.
    pub confidence: f32,
}

impl Verdict {
    /// Evaluate detections under `mode`. In prefiltered mode the slice is
    /// trimmed in place so later consumers (the overlay) only see survivors.
    pub fn evaluate(detections: &mut Vec<Detection>, threshold: f32, mode: ThresholdMode) -> Self {
        if mode == ThresholdMode::Prefiltered {
            detections.retain(|d| d.confidence > threshold);
        }

        let confidence = detections
            .iter()
            .map(|d| sanitize(d.confidence))
            .fold(0.0f32, f32::max);
        let present = match mode {
            ThresholdMode::PerDetection => detections.iter().any(|d| d.confidence > threshold),
            ThresholdMode::Prefiltered => !detections.is_empty(),
        };

        Self {
            present,
            confidence,
        }
    }
}

fn sanitize(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
