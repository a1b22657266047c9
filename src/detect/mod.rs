mod backend;
mod backends;
mod result;
mod verdict;

pub use backend::{DetectorBackend, FnBackend};
pub use backends::{build_backend, BackendKind, DetectorOptions, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection};
pub use verdict::{ThresholdMode, Verdict};
