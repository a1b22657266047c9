//! Video sources.
//!
//! A source is an ordered, finite sequence of decoded frames plus a frame
//! rate. It can only be restarted by opening it again.
//!
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` clips (always available, used by tests and dry runs)

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{FileConfig, FileSource, FileStats};

/// A sequential frame source owned by one processing pass.
pub trait VideoSource {
    /// Human-readable origin (path or stub URL) for logs.
    fn origin(&self) -> &str;

    /// Nominal frames per second, if the container reports one.
    fn fps(&self) -> Option<f64>;

    /// Total frame count when the container knows it up front.
    fn frame_count_hint(&self) -> Option<u64> {
        None
    }

    /// Decode the next frame. `Ok(None)` marks the end of the stream; an error
    /// means decoding broke down mid-stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn origin(&self) -> &str {
        (**self).origin()
    }

    fn fps(&self) -> Option<f64> {
        (**self).fps()
    }

    fn frame_count_hint(&self) -> Option<u64> {
        (**self).frame_count_hint()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}
