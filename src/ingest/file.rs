//! Local file frame source.
//!
//! `FileSource` reads frames from a local video file (ffmpeg backend) or from
//! a synthetic `stub://` clip. Synthetic clips accept query parameters:
//!
//! ```text
//! stub://hallway?frames=45&fps=30&width=64&height=48&fail_at=20
//! ```
//!
//! `fail_at` makes the decoder error out when that 1-based frame is reached,
//! which exercises mid-stream termination without a corrupt file on disk.

use std::path::Path;

use anyhow::{anyhow, Result};
use url::Url;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::VideoSource;
use crate::error::SurveyError;
use crate::frame::Frame;

const STUB_SCHEME: &str = "stub://";
const DEFAULT_STUB_FRAMES: u64 = 100;
const DEFAULT_STUB_FPS: f64 = 30.0;
const DEFAULT_STUB_WIDTH: u32 = 64;
const DEFAULT_STUB_HEIGHT: u32 = 48;

/// Configuration for a local file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local file path (e.g., "/srv/footage/lobby.mp4") or a `stub://` clip.
    pub path: String,
    /// Frame rate to use when the container reports none.
    pub fps_override: Option<f64>,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fps_override: None,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    path: String,
    fps_override: Option<f64>,
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    /// Open the source. Any failure here is `SourceUnavailable`.
    pub fn open(config: FileConfig) -> crate::Result<Self> {
        let unavailable = |reason: String| SurveyError::SourceUnavailable {
            path: config.path.clone(),
            reason,
        };
        if !is_local_file_path(&config.path) {
            return Err(unavailable(
                "file ingestion only supports local paths (no URL schemes)".to_string(),
            ));
        }

        let backend = if config.path.starts_with(STUB_SCHEME) {
            let source =
                SyntheticFileSource::from_url(&config.path).map_err(|e| unavailable(e.to_string()))?;
            FileBackend::Synthetic(source)
        } else {
            if !Path::new(&config.path).is_file() {
                return Err(unavailable("no such file".to_string()));
            }
            open_decoder(&config.path).map_err(|e| unavailable(format!("{:#}", e)))?
        };

        log::info!("FileSource: opened {}", config.path);
        Ok(Self {
            path: config.path,
            fps_override: config.fps_override,
            backend,
        })
    }

    /// Decoding statistics so far.
    pub fn stats(&self) -> FileStats {
        let frames_decoded = match &self.backend {
            FileBackend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_decoded(),
        };
        FileStats {
            frames_decoded,
            path: self.path.clone(),
        }
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_decoder(path: &str) -> Result<FileBackend> {
    Ok(FileBackend::Ffmpeg(FfmpegFileSource::new(path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_decoder(_path: &str) -> Result<FileBackend> {
    Err(anyhow!(
        "video file decoding requires the ingest-file-ffmpeg feature"
    ))
}

impl VideoSource for FileSource {
    fn origin(&self) -> &str {
        &self.path
    }

    fn fps(&self) -> Option<f64> {
        let reported = match &self.backend {
            FileBackend::Synthetic(source) => Some(source.fps),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.fps(),
        };
        reported
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .or(self.fps_override)
    }

    fn frame_count_hint(&self) -> Option<u64> {
        match &self.backend {
            FileBackend::Synthetic(source) => Some(source.total_frames),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frame_count_hint(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_decoded: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    total_frames: u64,
    fps: f64,
    width: u32,
    height: u32,
    fail_at: Option<u64>,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticFileSource {
    fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| anyhow!("invalid stub url '{}': {}", raw, e))?;
        let mut source = Self {
            total_frames: DEFAULT_STUB_FRAMES,
            fps: DEFAULT_STUB_FPS,
            width: DEFAULT_STUB_WIDTH,
            height: DEFAULT_STUB_HEIGHT,
            fail_at: None,
            frame_count: 0,
            scene_state: 0,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "frames" => source.total_frames = parse_param(&key, &value)?,
                "fps" => source.fps = parse_param(&key, &value)?,
                "width" => source.width = parse_param(&key, &value)?,
                "height" => source.height = parse_param(&key, &value)?,
                "fail_at" => source.fail_at = Some(parse_param(&key, &value)?),
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if source.width == 0 || source.height == 0 {
            return Err(anyhow!("stub frames must have non-zero dimensions"));
        }
        Ok(source)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.total_frames {
            return Ok(None);
        }
        if self.fail_at == Some(self.frame_count + 1) {
            return Err(anyhow!(
                "synthetic decode failure at frame {}",
                self.frame_count + 1
            ));
        }
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        Frame::new(pixels, self.width, self.height).map(Some)
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.width as usize * self.height as usize * 3;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("stub parameter '{}' has invalid value '{}'", key, value))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_SCHEME) {
        return true;
    }
    !path.contains("://")
}
