use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend maps one frame to zero or more detections. The sampler owns the
/// presence / confidence bookkeeping; backends only report what they saw.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &str;

    /// Run detection on a frame.
    ///
    /// `min_confidence` is a pre-filter hint: backends that can threshold
    /// internally should drop detections at or below it. Backends that ignore
    /// it are still correct, since the sampler re-applies the same filter.
    fn detect(&mut self, frame: &Frame, min_confidence: Option<f32>) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<D: DetectorBackend + ?Sized> DetectorBackend for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame, min_confidence: Option<f32>) -> Result<Vec<Detection>> {
        (**self).detect(frame, min_confidence)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}

/// Adapts a closure into a backend, for callers that inject detection as a
/// plain function.
pub struct FnBackend<F> {
    name: String,
    detect: F,
}

impl<F> FnBackend<F>
where
    F: FnMut(&Frame) -> Result<Vec<Detection>> + Send,
{
    pub fn new(name: impl Into<String>, detect: F) -> Self {
        Self {
            name: name.into(),
            detect,
        }
    }
}

impl<F> DetectorBackend for FnBackend<F>
where
    F: FnMut(&Frame) -> Result<Vec<Detection>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&mut self, frame: &Frame, _min_confidence: Option<f32>) -> Result<Vec<Detection>> {
        (self.detect)(frame)
    }
}
