//! Sightline: frame-sampling surveys of recorded video.
//!
//! A survey decodes a video file, runs a detector on every Kth frame, and
//! writes one row per sampled frame to a CSV table:
//!
//! ```text
//! Timestamp,Frame,Detected,Confidence
//! 0:00:00.4,cctv_frame_000015,True,0.8765
//! ```
//!
//! Timestamps are `H:MM:SS.d` with the tenth truncated, computed from the
//! frame's 1-based index and the source frame rate. Annotated copies of the
//! sampled frames can be saved as JPEGs, and saved frames can be sent to a
//! remote vision API for text extraction or description.
//!
//! # Module Structure
//!
//! - `ingest`: video sources (ffmpeg-backed files, `stub://` synthetic clips)
//! - `detect`: detector trait, verdict rules, stub and ONNX backends
//! - `sampler`: the lazy sampling iterator
//! - `table`, `overlay`: CSV and annotated JPEG outputs
//! - `survey`: end-to-end runs, foreground or on a worker thread
//! - `describe`: remote description client

pub mod cancel;
pub mod config;
pub mod describe;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod sampler;
pub mod survey;
pub mod table;
pub mod timecode;
pub mod ui;

pub use cancel::CancelToken;
pub use config::{DescribeConfig, Profile, SurveyConfig};
pub use describe::{DescribeClient, Description};
pub use detect::{
    build_backend, BackendKind, BoundingBox, Detection, DetectorBackend, DetectorOptions,
    FnBackend, StubBackend, ThresholdMode, Verdict,
};
pub use error::{Result, SurveyError};
pub use frame::Frame;
pub use ingest::{FileConfig, FileSource, VideoSource};
pub use sampler::{FrameSampler, OutputRecord, SamplerConfig, SamplerStats};
pub use survey::{run_survey, spawn_survey, survey_source, ProgressSink, RunSummary, SurveyHandle};
pub use table::{CsvTable, TableSummary};
