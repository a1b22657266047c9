//! Survey and describe configuration.
//!
//! Values come from, in increasing precedence: profile defaults, an optional
//! config file named by `SIGHTLINE_CONFIG` (JSON, or TOML for a `.toml`
//! extension), and `SIGHTLINE_*` environment variables. Binaries layer CLI
//! flags on top and call `validate` again.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::detect::{BackendKind, DetectorOptions, ThresholdMode};
use crate::error::SurveyError;
use crate::sampler::SamplerConfig;

const DEFAULT_VIDEO_PATH: &str = "video.mp4";
const DEFAULT_INTERVAL: u64 = 15;
const DEFAULT_API_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";
const DEFAULT_API_TIMEOUT_SECS: u64 = 60;

/// Which detection job a run performs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// CCTV camera detection; thresholds every detection itself.
    #[default]
    Cctv,
    /// Door / entry-exit detection; lets the detector pre-filter.
    Door,
}

struct ProfileDefaults {
    model_path: &'static str,
    output_csv: &'static str,
    frames_dir: &'static str,
    threshold: f32,
    mode: ThresholdMode,
    label_prefix: &'static str,
    overlay_label: &'static str,
}

impl Profile {
    /// Every profile, in the order a combined run executes them.
    pub const ALL: [Profile; 2] = [Profile::Cctv, Profile::Door];

    /// Parse a comma-separated profile list; `all` expands to every profile.
    pub fn parse_list(raw: &str) -> Result<Vec<Profile>, String> {
        let mut profiles = Vec::new();
        for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            let expanded = if name.eq_ignore_ascii_case("all") {
                Profile::ALL.to_vec()
            } else {
                vec![name.parse::<Profile>()?]
            };
            for profile in expanded {
                if !profiles.contains(&profile) {
                    profiles.push(profile);
                }
            }
        }
        Ok(profiles)
    }

    fn defaults(self) -> ProfileDefaults {
        match self {
            Profile::Cctv => ProfileDefaults {
                model_path: "models/cctv.onnx",
                output_csv: "cctv_output.csv",
                frames_dir: "vidsaves",
                threshold: 0.3,
                mode: ThresholdMode::PerDetection,
                label_prefix: "cctv_frame",
                overlay_label: "CCTV",
            },
            Profile::Door => ProfileDefaults {
                model_path: "models/doors.onnx",
                output_csv: "door_output.csv",
                frames_dir: "door_frames_output",
                threshold: 0.2,
                mode: ThresholdMode::Prefiltered,
                label_prefix: "entry_exit_frame",
                overlay_label: "Door",
            },
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Cctv => f.write_str("cctv"),
            Profile::Door => f.write_str("door"),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cctv" | "camera" => Ok(Profile::Cctv),
            "door" | "entry_exit" | "entry-exit" => Ok(Profile::Door),
            other => Err(format!("unknown profile '{}'; expected cctv or door", other)),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct SurveyConfigFile {
    profile: Option<Profile>,
    video: Option<VideoConfigFile>,
    detector: Option<DetectorConfigFile>,
    sampling: Option<SamplingConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    path: Option<String>,
    fps_override: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<BackendKind>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    classes: Option<Vec<usize>>,
    base_confidence: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    interval: Option<u64>,
    threshold: Option<f32>,
    threshold_mode: Option<ThresholdMode>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    csv_path: Option<PathBuf>,
    label_prefix: Option<String>,
    save_frames: Option<bool>,
    frames_dir: Option<PathBuf>,
    overlay_label: Option<String>,
}

/// Everything one survey run needs.
#[derive(Debug, Clone)]
pub struct SurveyConfig {
    pub profile: Profile,
    pub video_path: String,
    pub fps_override: Option<f64>,
    pub backend: BackendKind,
    pub detector: DetectorOptions,
    pub sampler: SamplerConfig,
    pub output_csv: PathBuf,
    pub save_frames: bool,
    pub frames_dir: PathBuf,
    pub overlay_label: String,
}

impl SurveyConfig {
    /// Load from `SIGHTLINE_CONFIG` (if set) and the environment.
    pub fn load() -> crate::Result<Self> {
        Self::load_with_profile(None)
    }

    /// Like [`SurveyConfig::load`], but an explicit profile wins over
    /// `SIGHTLINE_PROFILE` and the file's `profile` key.
    pub fn load_with_profile(explicit: Option<Profile>) -> crate::Result<Self> {
        let file_cfg = match std::env::var("SIGHTLINE_CONFIG").ok().as_deref() {
            Some(path) if !path.trim().is_empty() => read_config_file(Path::new(path))?,
            _ => SurveyConfigFile::default(),
        };
        let profile = match (explicit, env_value("SIGHTLINE_PROFILE")) {
            (Some(profile), _) => profile,
            (None, Some(raw)) => raw.parse::<Profile>().map_err(SurveyError::Config)?,
            (None, None) => file_cfg.profile.unwrap_or_default(),
        };
        let mut cfg = Self::from_file(file_cfg, profile);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load one configuration per profile for a combined run. Duplicate
    /// profiles collapse; passes that would write the same CSV or frames
    /// directory are rejected.
    pub fn load_profiles(profiles: &[Profile]) -> crate::Result<Vec<Self>> {
        let mut configs: Vec<Self> = Vec::with_capacity(profiles.len());
        for &profile in profiles {
            if configs.iter().any(|cfg| cfg.profile == profile) {
                continue;
            }
            let cfg = Self::load_with_profile(Some(profile))?;
            if let Some(other) = configs.iter().find(|c| c.output_csv == cfg.output_csv) {
                return Err(SurveyError::Config(format!(
                    "profiles {} and {} would both write {}",
                    other.profile,
                    profile,
                    cfg.output_csv.display()
                )));
            }
            if let Some(other) = configs
                .iter()
                .find(|c| c.save_frames && cfg.save_frames && c.frames_dir == cfg.frames_dir)
            {
                return Err(SurveyError::Config(format!(
                    "profiles {} and {} would both save frames into {}",
                    other.profile,
                    profile,
                    cfg.frames_dir.display()
                )));
            }
            configs.push(cfg);
        }
        if configs.is_empty() {
            return Err(SurveyError::Config("no profile selected".to_string()));
        }
        Ok(configs)
    }

    /// Defaults for a profile, with no file or environment applied.
    pub fn for_profile(profile: Profile) -> Self {
        Self::from_file(SurveyConfigFile::default(), profile)
    }

    fn from_file(file: SurveyConfigFile, profile: Profile) -> Self {
        let defaults = profile.defaults();
        let video = file.video.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let sampling = file.sampling.unwrap_or_default();
        let output = file.output.unwrap_or_default();

        Self {
            profile,
            video_path: video
                .path
                .unwrap_or_else(|| DEFAULT_VIDEO_PATH.to_string()),
            fps_override: video.fps_override,
            backend: detector.backend.unwrap_or_default(),
            detector: detector_options(detector, defaults.model_path),
            sampler: SamplerConfig {
                interval: sampling.interval.unwrap_or(DEFAULT_INTERVAL),
                threshold: sampling.threshold.unwrap_or(defaults.threshold),
                mode: sampling.threshold_mode.unwrap_or(defaults.mode),
                label_prefix: output
                    .label_prefix
                    .unwrap_or_else(|| defaults.label_prefix.to_string()),
            },
            output_csv: output
                .csv_path
                .unwrap_or_else(|| PathBuf::from(defaults.output_csv)),
            save_frames: output.save_frames.unwrap_or(false),
            frames_dir: output
                .frames_dir
                .unwrap_or_else(|| PathBuf::from(defaults.frames_dir)),
            overlay_label: output
                .overlay_label
                .unwrap_or_else(|| defaults.overlay_label.to_string()),
        }
    }

    fn apply_env(&mut self) -> crate::Result<()> {
        if let Some(path) = env_value("SIGHTLINE_VIDEO_PATH") {
            self.video_path = path;
        }
        if let Some(path) = env_value("SIGHTLINE_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(raw) = env_value("SIGHTLINE_CLASSES") {
            self.detector.classes = Some(parse_classes(&raw).ok_or_else(|| {
                SurveyError::Config(
                    "SIGHTLINE_CLASSES must be a comma-separated list of class indices".to_string(),
                )
            })?);
        }
        if let Some(path) = env_value("SIGHTLINE_OUTPUT_CSV") {
            self.output_csv = PathBuf::from(path);
        }
        if let Some(path) = env_value("SIGHTLINE_FRAMES_DIR") {
            self.frames_dir = PathBuf::from(path);
        }
        if let Some(raw) = env_value("SIGHTLINE_SAVE_FRAMES") {
            self.save_frames = parse_bool(&raw).ok_or_else(|| {
                SurveyError::Config("SIGHTLINE_SAVE_FRAMES must be true or false".to_string())
            })?;
        }
        if let Some(raw) = env_value("SIGHTLINE_INTERVAL") {
            self.sampler.interval = raw.parse().map_err(|_| {
                SurveyError::Config("SIGHTLINE_INTERVAL must be a positive integer".to_string())
            })?;
        }
        if let Some(raw) = env_value("SIGHTLINE_THRESHOLD") {
            self.sampler.threshold = raw.parse().map_err(|_| {
                SurveyError::Config("SIGHTLINE_THRESHOLD must be a number in 0..=1".to_string())
            })?;
        }
        if let Some(raw) = env_value("SIGHTLINE_THRESHOLD_MODE") {
            self.sampler.mode = raw.parse().map_err(SurveyError::Config)?;
        }
        if let Some(raw) = env_value("SIGHTLINE_BACKEND") {
            self.backend = raw.parse().map_err(SurveyError::Config)?;
        }
        Ok(())
    }

    /// Check invariants; call again after applying CLI overrides.
    pub fn validate(&self) -> crate::Result<()> {
        if self.video_path.trim().is_empty() {
            return Err(SurveyError::Config("video path must not be empty".to_string()));
        }
        if self.output_csv.as_os_str().is_empty() {
            return Err(SurveyError::Config("output csv path must not be empty".to_string()));
        }
        if self.sampler.interval == 0 {
            return Err(SurveyError::Config(
                "sampling interval must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sampler.threshold) {
            return Err(SurveyError::Config(format!(
                "confidence threshold {} is outside 0..=1",
                self.sampler.threshold
            )));
        }
        if self.detector.input_size == 0 {
            return Err(SurveyError::Config(
                "model input size must be greater than zero".to_string(),
            ));
        }
        if self.backend != BackendKind::Stub && self.detector.model_path.as_os_str().is_empty() {
            return Err(SurveyError::Config(
                "a model path is required unless the stub backend is selected".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.base_confidence) {
            return Err(SurveyError::Config(format!(
                "base confidence {} is outside 0..=1",
                self.detector.base_confidence
            )));
        }
        if !(self.detector.iou_threshold > 0.0 && self.detector.iou_threshold <= 1.0) {
            return Err(SurveyError::Config(format!(
                "IoU threshold {} must be in (0, 1]",
                self.detector.iou_threshold
            )));
        }
        if self.detector.classes.as_ref().is_some_and(|c| c.is_empty()) {
            return Err(SurveyError::Config(
                "class filter must name at least one class".to_string(),
            ));
        }
        if let Some(fps) = self.fps_override {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(SurveyError::Config(format!(
                    "fps override {} must be a positive number",
                    fps
                )));
            }
        }
        if self.save_frames && self.frames_dir.as_os_str().is_empty() {
            return Err(SurveyError::Config(
                "frames directory must be set when saving frames".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the remote description client.
#[derive(Debug, Clone)]
pub struct DescribeConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl DescribeConfig {
    /// Load from the environment. The API key is mandatory and never defaulted.
    pub fn load() -> crate::Result<Self> {
        let api_key = env_value("SIGHTLINE_API_KEY").ok_or_else(|| {
            SurveyError::Config("SIGHTLINE_API_KEY must be set to call the describe API".to_string())
        })?;
        let endpoint =
            env_value("SIGHTLINE_API_ENDPOINT").unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());
        let timeout_secs = match env_value("SIGHTLINE_API_TIMEOUT_SECS") {
            Some(raw) => raw.parse().map_err(|_| {
                SurveyError::Config(
                    "SIGHTLINE_API_TIMEOUT_SECS must be an integer number of seconds".to_string(),
                )
            })?,
            None => DEFAULT_API_TIMEOUT_SECS,
        };
        Ok(Self {
            endpoint,
            api_key,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn read_config_file(path: &Path) -> crate::Result<SurveyConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        SurveyError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let parsed = if is_toml {
        toml::from_str(&raw).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| SurveyError::Config(format!("invalid config file {}: {}", path.display(), e)))
}

fn detector_options(file: DetectorConfigFile, default_model: &str) -> DetectorOptions {
    let mut options =
        DetectorOptions::new(file.model_path.unwrap_or_else(|| PathBuf::from(default_model)));
    if let Some(size) = file.input_size {
        options.input_size = size;
    }
    options.classes = file.classes;
    if let Some(floor) = file.base_confidence {
        options.base_confidence = floor;
    }
    if let Some(iou) = file.iou_threshold {
        options.iou_threshold = iou;
    }
    options
}

fn parse_classes(raw: &str) -> Option<Vec<usize>> {
    raw.split(',')
        .map(|part| part.trim().parse().ok())
        .collect::<Option<Vec<usize>>>()
        .filter(|classes| !classes.is_empty())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
