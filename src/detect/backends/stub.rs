use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Stub backend for dry runs and tests. Uses pixel hashing, so it needs no
/// model file and is fully deterministic.
///
/// A frame whose content differs from the previous one yields a single
/// centred detection with a confidence derived from the pixel digest; an
/// unchanged frame (or the very first one) yields nothing.
pub struct StubBackend {
    last_hash: Option<[u8; 32]>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { last_hash: None }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame, min_confidence: Option<f32>) -> Result<Vec<Detection>> {
        let current_hash: [u8; 32] = Sha256::digest(frame.pixels()).into();

        let changed = match self.last_hash {
            Some(prev) => prev != current_hash,
            None => false,
        };

        self.last_hash = Some(current_hash);

        if !changed {
            return Ok(Vec::new());
        }

        let confidence = f32::from(current_hash[0]) / 255.0;
        if min_confidence.is_some_and(|min| confidence <= min) {
            return Ok(Vec::new());
        }

        Ok(vec![Detection::new(confidence).with_class(0).with_box(
            BoundingBox {
                x: 0.25,
                y: 0.25,
                w: 0.5,
                h: 0.5,
            },
        )])
    }
}
