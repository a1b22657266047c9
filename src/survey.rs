//! End-to-end survey run: open the video, sample, and write the table.
//!
//! The output CSV is only created once the source has opened and reported a
//! usable frame rate, so a missing or unreadable video leaves nothing behind.

use std::io;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crate::cancel::CancelToken;
use crate::config::SurveyConfig;
use crate::detect::DetectorBackend;
use crate::error::SurveyError;
use crate::ingest::{FileConfig, FileSource, VideoSource};
use crate::overlay::FrameSaver;
use crate::sampler::{FrameSampler, OutputRecord, SamplerStats};
use crate::table::CsvTable;

/// Receives progress while a survey runs.
pub trait ProgressSink {
    fn on_start(&mut self, _total_frames: Option<u64>) {}
    fn on_record(&mut self, _record: &OutputRecord) {}
    fn on_finish(&mut self, _summary: &RunSummary) {}
}

impl ProgressSink for () {}

/// Outcome of a completed (or cancelled) survey.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub csv_path: PathBuf,
    /// Hex SHA-256 of the written table.
    pub sha256: String,
    pub fps: f64,
    pub stats: SamplerStats,
}

/// Open `cfg.video_path` and survey it into `cfg.output_csv`.
pub fn run_survey<D: DetectorBackend>(
    cfg: &SurveyConfig,
    detector: D,
    cancel: &CancelToken,
    progress: &mut dyn ProgressSink,
) -> crate::Result<RunSummary> {
    let source = FileSource::open(FileConfig {
        path: cfg.video_path.clone(),
        fps_override: cfg.fps_override,
    })?;
    survey_source(cfg, source, detector, cancel, progress)
}

/// Survey an already opened source.
pub fn survey_source<S: VideoSource, D: DetectorBackend>(
    cfg: &SurveyConfig,
    source: S,
    detector: D,
    cancel: &CancelToken,
    progress: &mut dyn ProgressSink,
) -> crate::Result<RunSummary> {
    let origin = source.origin().to_string();
    let mut sampler =
        FrameSampler::new(source, detector, cfg.sampler.clone())?.with_cancel(cancel.clone());
    if cfg.save_frames {
        sampler = sampler.with_saver(FrameSaver::new(&cfg.frames_dir, &cfg.overlay_label));
    }
    let fps = sampler.fps();
    log::info!(
        "surveying {} at {:.3} fps, every {} frame(s), threshold {} ({})",
        origin,
        fps,
        cfg.sampler.interval,
        cfg.sampler.threshold,
        cfg.sampler.mode
    );

    let mut table = CsvTable::create(&cfg.output_csv).map_err(|e| {
        SurveyError::Output(io::Error::new(
            e.kind(),
            format!("cannot create {}: {}", cfg.output_csv.display(), e),
        ))
    })?;
    progress.on_start(sampler.frame_count_hint());

    for item in sampler.by_ref() {
        let record = item?;
        table.append(&record)?;
        progress.on_record(&record);
    }

    let table = table.finish()?;
    let stats = sampler.stats().clone();
    let summary = RunSummary {
        csv_path: cfg.output_csv.clone(),
        sha256: table.sha256,
        fps,
        stats,
    };
    log::info!(
        "wrote {} record(s) to {} ({} positive, {} frame(s) decoded, sha256 {})",
        table.rows,
        summary.csv_path.display(),
        summary.stats.positives,
        summary.stats.frames_decoded,
        summary.sha256
    );
    if summary.stats.save_failures > 0 {
        log::warn!(
            "{} annotated frame(s) could not be saved",
            summary.stats.save_failures
        );
    }
    progress.on_finish(&summary);
    Ok(summary)
}

/// A survey running on a worker thread.
pub struct SurveyHandle {
    cancel: CancelToken,
    join: JoinHandle<crate::Result<RunSummary>>,
}

impl SurveyHandle {
    /// Ask the worker to stop after the frame it is decoding.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker. Records already written stay on disk if it failed.
    pub fn join(self) -> crate::Result<RunSummary> {
        self.join.join().map_err(|_| SurveyError::WorkerPanicked)?
    }
}

/// Start [`run_survey`] on a background thread so the caller stays responsive.
pub fn spawn_survey<D>(cfg: SurveyConfig, detector: D) -> crate::Result<SurveyHandle>
where
    D: DetectorBackend + 'static,
{
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let join = thread::Builder::new()
        .name("survey".to_string())
        .spawn(move || run_survey(&cfg, detector, &worker_cancel, &mut ()))?;
    Ok(SurveyHandle { cancel, join })
}
