//! Frame sampling and verdict records.
//!
//! `FrameSampler` drives a `VideoSource` through a `DetectorBackend` and yields
//! one `OutputRecord` for every Kth decoded frame. It is a lazy iterator: the
//! source is consumed as records are pulled, and a consumed sampler cannot be
//! restarted.
//!
//! Termination rules:
//! - end of stream ends the sequence;
//! - a decode error mid-stream also ends it (logged, partial output is valid);
//! - cancellation ends it before the next frame is decoded;
//! - a detector error is yielded once, after which the sequence is fused.

use std::iter::FusedIterator;

use crate::cancel::CancelToken;
use crate::detect::{DetectorBackend, ThresholdMode, Verdict};
use crate::error::SurveyError;
use crate::frame::Frame;
use crate::ingest::VideoSource;
use crate::overlay::FrameSaver;
use crate::timecode;

/// Parameters of a sampling pass.
#[derive(Clone, Debug)]
pub struct SamplerConfig {
    /// Process every Kth frame (K >= 1).
    pub interval: u64,
    /// Confidence threshold in 0..=1.
    pub threshold: f32,
    pub mode: ThresholdMode,
    /// Record label prefix; the frame index is appended as `_{index:06}`.
    pub label_prefix: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: 1,
            threshold: 0.5,
            mode: ThresholdMode::PerDetection,
            label_prefix: "frame".to_string(),
        }
    }
}

/// One row of the result table.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputRecord {
    pub timestamp: String,
    /// 1-based index of the decoded frame.
    pub frame_index: u64,
    pub frame_label: String,
    pub present: bool,
    pub confidence: f32,
}

impl OutputRecord {
    /// `Timestamp, Frame, Detected, Confidence` as written to CSV.
    pub fn csv_fields(&self) -> [String; 4] {
        [
            self.timestamp.clone(),
            self.frame_label.clone(),
            if self.present { "True" } else { "False" }.to_string(),
            format!("{:.4}", self.confidence),
        ]
    }
}

/// Counters for a pass, readable while iterating and afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub frames_decoded: u64,
    pub records: u64,
    pub positives: u64,
    pub frames_saved: u64,
    pub save_failures: u64,
    /// Stopped through the cancel token.
    pub cancelled: bool,
    /// Stopped by a decode error rather than end of stream.
    pub decode_terminated: bool,
}

pub struct FrameSampler<S, D> {
    source: S,
    detector: D,
    config: SamplerConfig,
    fps: f64,
    saver: Option<FrameSaver>,
    cancel: CancelToken,
    stats: SamplerStats,
    done: bool,
}

impl<S: VideoSource, D: DetectorBackend> FrameSampler<S, D> {
    /// Validate parameters and the source frame rate. Nothing is decoded yet.
    pub fn new(source: S, detector: D, config: SamplerConfig) -> crate::Result<Self> {
        if config.interval == 0 {
            return Err(SurveyError::Config(
                "sampling interval must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.threshold) {
            return Err(SurveyError::Config(format!(
                "confidence threshold {} is outside 0..=1",
                config.threshold
            )));
        }
        let fps = match source.fps() {
            Some(fps) if fps.is_finite() && fps > 0.0 => fps,
            other => {
                return Err(SurveyError::InvalidSource(format!(
                    "{} reports frame rate {:?}; a positive fps is required",
                    source.origin(),
                    other
                )))
            }
        };

        Ok(Self {
            source,
            detector,
            config,
            fps,
            saver: None,
            cancel: CancelToken::new(),
            stats: SamplerStats::default(),
            done: false,
        })
    }

    /// Save an annotated JPEG for every sampled frame.
    pub fn with_saver(mut self, saver: FrameSaver) -> Self {
        self.saver = Some(saver);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_count_hint(&self) -> Option<u64> {
        self.source.frame_count_hint()
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }

    fn process(&mut self, frame: Frame) -> crate::Result<OutputRecord> {
        let index = self.stats.frames_decoded;
        let hint = self.config.mode.detector_hint(self.config.threshold);
        let mut detections = match self.detector.detect(&frame, hint) {
            Ok(detections) => detections,
            Err(e) => {
                self.done = true;
                return Err(SurveyError::Detector {
                    backend: self.detector.name().to_string(),
                    frame_index: index,
                    reason: format!("{:#}", e),
                });
            }
        };
        let verdict = Verdict::evaluate(&mut detections, self.config.threshold, self.config.mode);

        let record = OutputRecord {
            timestamp: timecode::frame_timestamp(index, self.fps),
            frame_index: index,
            frame_label: format!("{}_{:06}", self.config.label_prefix, index),
            present: verdict.present,
            confidence: verdict.confidence,
        };
        self.stats.records += 1;
        if verdict.present {
            self.stats.positives += 1;
        }

        if let Some(saver) = self.saver.as_mut() {
            match saver.save(index, &frame, &verdict, &detections) {
                Ok(path) => {
                    self.stats.frames_saved += 1;
                    log::debug!("saved {}", path.display());
                }
                Err(e) => {
                    self.stats.save_failures += 1;
                    log::warn!("frame {} not saved: {}", index, e);
                }
            }
        }

        match self.source.frame_count_hint() {
            Some(total) => log::debug!("Processed frame {}/{}", index, total),
            None => log::debug!("Processed frame {}", index),
        }
        Ok(record)
    }
}

impl<S: VideoSource, D: DetectorBackend> Iterator for FrameSampler<S, D> {
    type Item = crate::Result<OutputRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.cancel.is_cancelled() {
                log::info!(
                    "sampling cancelled after {} frames of {}",
                    self.stats.frames_decoded,
                    self.source.origin()
                );
                self.stats.cancelled = true;
                self.done = true;
                return None;
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    log::warn!(
                        "decoding {} stopped after frame {}: {:#}",
                        self.source.origin(),
                        self.stats.frames_decoded,
                        e
                    );
                    self.stats.decode_terminated = true;
                    self.done = true;
                    return None;
                }
            };

            self.stats.frames_decoded += 1;
            if self.stats.frames_decoded % self.config.interval != 0 {
                continue;
            }
            return Some(self.process(frame));
        }
    }
}

impl<S: VideoSource, D: DetectorBackend> FusedIterator for FrameSampler<S, D> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, FnBackend, StubBackend};
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    struct VecSource {
        remaining: u64,
        fps: Option<f64>,
        fail_at: Option<u64>,
        decoded: u64,
    }

    impl VecSource {
        fn new(frames: u64, fps: f64) -> Self {
            Self {
                remaining: frames,
                fps: Some(fps),
                fail_at: None,
                decoded: 0,
            }
        }
    }

    impl VideoSource for VecSource {
        fn origin(&self) -> &str {
            "memory"
        }

        fn fps(&self) -> Option<f64> {
            self.fps
        }

        fn frame_count_hint(&self) -> Option<u64> {
            Some(self.remaining + self.decoded)
        }

        fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
            if self.fail_at == Some(self.decoded + 1) {
                return Err(anyhow!("corrupt packet"));
            }
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            self.decoded += 1;
            let shade = (self.decoded % 256) as u8;
            Ok(Some(Frame::filled(4, 4, [shade, shade, shade])))
        }
    }

    fn config(interval: u64, threshold: f32, mode: ThresholdMode) -> SamplerConfig {
        SamplerConfig {
            interval,
            threshold,
            mode,
            label_prefix: "cctv_frame".to_string(),
        }
    }

    fn nothing() -> FnBackend<impl FnMut(&Frame) -> anyhow::Result<Vec<Detection>> + Send> {
        FnBackend::new("none", |_: &Frame| Ok(Vec::new()))
    }

    #[test]
    fn record_count_is_floor_of_frames_over_interval() {
        for frames in [0u64, 1, 14, 15, 16, 44, 45, 100] {
            for interval in [1u64, 2, 7, 15, 50] {
                let sampler = FrameSampler::new(
                    VecSource::new(frames, 30.0),
                    nothing(),
                    config(interval, 0.3, ThresholdMode::PerDetection),
                )
                .unwrap();
                let records: Vec<_> = sampler.collect::<crate::Result<_>>().unwrap();
                assert_eq!(records.len() as u64, frames / interval, "F={frames} K={interval}");
            }
        }
    }

    #[test]
    fn samples_every_kth_frame_with_truncated_timestamps() {
        let sampler = FrameSampler::new(
            VecSource::new(45, 30.0),
            nothing(),
            config(15, 0.3, ThresholdMode::PerDetection),
        )
        .unwrap();
        let records: Vec<OutputRecord> = sampler.collect::<crate::Result<_>>().unwrap();

        let indices: Vec<u64> = records.iter().map(|r| r.frame_index).collect();
        assert_eq!(indices, vec![15, 30, 45]);
        let stamps: Vec<&str> = records.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["0:00:00.4", "0:00:00.9", "0:00:01.4"]);
        assert_eq!(records[0].frame_label, "cctv_frame_000015");
    }

    #[test]
    fn no_detections_yields_false_and_zero() {
        let mut sampler = FrameSampler::new(
            VecSource::new(1, 30.0),
            nothing(),
            config(1, 0.3, ThresholdMode::PerDetection),
        )
        .unwrap();
        let record = sampler.next().unwrap().unwrap();
        assert!(!record.present);
        assert_eq!(
            record.csv_fields(),
            [
                "0:00:00.0".to_string(),
                "cctv_frame_000001".to_string(),
                "False".to_string(),
                "0.0000".to_string()
            ]
        );
    }

    #[test]
    fn threshold_modes_differ_only_in_bookkeeping() {
        let scripted = || FnBackend::new("scripted", |_: &Frame| {
            Ok(vec![Detection::new(0.1), Detection::new(0.15)])
        });

        let mut per = FrameSampler::new(
            VecSource::new(1, 30.0),
            scripted(),
            config(1, 0.2, ThresholdMode::PerDetection),
        )
        .unwrap();
        let record = per.next().unwrap().unwrap();
        assert!(!record.present);
        assert_eq!(record.csv_fields()[3], "0.1500");

        let mut pre = FrameSampler::new(
            VecSource::new(1, 30.0),
            scripted(),
            config(1, 0.2, ThresholdMode::Prefiltered),
        )
        .unwrap();
        let record = pre.next().unwrap().unwrap();
        assert!(!record.present);
        assert_eq!(record.csv_fields()[3], "0.0000");
    }

    struct HintRecorder {
        hints: Arc<Mutex<Vec<Option<f32>>>>,
    }

    impl DetectorBackend for HintRecorder {
        fn name(&self) -> &str {
            "hints"
        }

        fn detect(&mut self, _frame: &Frame, min_confidence: Option<f32>) -> anyhow::Result<Vec<Detection>> {
            self.hints.lock().unwrap().push(min_confidence);
            Ok(vec![Detection::new(0.9)])
        }
    }

    #[test]
    fn prefiltered_mode_passes_threshold_to_detector() {
        let hints = Arc::new(Mutex::new(Vec::new()));
        for mode in [ThresholdMode::PerDetection, ThresholdMode::Prefiltered] {
            let sampler = FrameSampler::new(
                VecSource::new(2, 30.0),
                HintRecorder {
                    hints: hints.clone(),
                },
                config(2, 0.2, mode),
            )
            .unwrap();
            let records: Vec<_> = sampler.collect::<crate::Result<_>>().unwrap();
            assert!(records[0].present);
        }
        assert_eq!(*hints.lock().unwrap(), vec![None, Some(0.2)]);
    }

    #[test]
    fn rejects_unusable_frame_rates() {
        for fps in [Some(0.0), Some(-5.0), Some(f64::NAN), None] {
            let mut source = VecSource::new(10, 30.0);
            source.fps = fps;
            let err = FrameSampler::new(source, nothing(), SamplerConfig::default())
                .err()
                .expect("must reject");
            assert!(matches!(err, SurveyError::InvalidSource(_)));
        }
    }

    #[test]
    fn rejects_zero_interval_and_bad_threshold() {
        let bad_interval = FrameSampler::new(
            VecSource::new(1, 30.0),
            nothing(),
            config(0, 0.3, ThresholdMode::PerDetection),
        );
        assert!(matches!(bad_interval.err(), Some(SurveyError::Config(_))));

        let bad_threshold = FrameSampler::new(
            VecSource::new(1, 30.0),
            nothing(),
            config(1, 1.5, ThresholdMode::PerDetection),
        );
        assert!(matches!(bad_threshold.err(), Some(SurveyError::Config(_))));
    }

    #[test]
    fn decode_error_ends_sequence_without_error() {
        let mut source = VecSource::new(100, 30.0);
        source.fail_at = Some(32);
        let mut sampler =
            FrameSampler::new(source, nothing(), config(10, 0.3, ThresholdMode::PerDetection))
                .unwrap();
        let records: Vec<_> = sampler.by_ref().collect::<crate::Result<_>>().unwrap();
        assert_eq!(records.len(), 3);
        assert!(sampler.stats().decode_terminated);
        assert_eq!(sampler.stats().frames_decoded, 31);
        assert!(sampler.next().is_none());
    }

    #[test]
    fn detector_failure_is_yielded_once_then_fused() {
        let mut calls = 0;
        let failing = FnBackend::new("flaky", move |_: &Frame| {
            calls += 1;
            if calls == 2 {
                Err(anyhow!("model exploded"))
            } else {
                Ok(Vec::new())
            }
        });
        let mut sampler = FrameSampler::new(
            VecSource::new(10, 30.0),
            failing,
            config(1, 0.3, ThresholdMode::PerDetection),
        )
        .unwrap();
        assert!(sampler.next().unwrap().is_ok());
        match sampler.next() {
            Some(Err(SurveyError::Detector {
                backend,
                frame_index,
                ..
            })) => {
                assert_eq!(backend, "flaky");
                assert_eq!(frame_index, 2);
            }
            other => panic!("expected detector error, got {:?}", other),
        }
        assert!(sampler.next().is_none());
    }

    #[test]
    fn cancellation_stops_before_next_frame() {
        let cancel = CancelToken::new();
        let mut sampler = FrameSampler::new(
            VecSource::new(100, 30.0),
            nothing(),
            config(5, 0.3, ThresholdMode::PerDetection),
        )
        .unwrap()
        .with_cancel(cancel.clone());

        assert_eq!(sampler.next().unwrap().unwrap().frame_index, 5);
        cancel.cancel();
        assert!(sampler.next().is_none());
        assert!(sampler.stats().cancelled);
        assert_eq!(sampler.stats().frames_decoded, 5);
    }

    #[test]
    fn save_failures_do_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut sampler = FrameSampler::new(
            VecSource::new(6, 30.0),
            StubBackend::new(),
            config(2, 0.3, ThresholdMode::PerDetection),
        )
        .unwrap()
        .with_saver(FrameSaver::new(&blocker, "CCTV"));
        let records: Vec<_> = sampler.by_ref().collect::<crate::Result<_>>().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(sampler.stats().save_failures, 3);
        assert_eq!(sampler.stats().frames_saved, 0);
    }

    #[test]
    fn saves_annotated_frames_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let frames_dir = dir.path().join("frames");
        let mut sampler = FrameSampler::new(
            VecSource::new(6, 30.0),
            StubBackend::new(),
            config(3, 0.3, ThresholdMode::PerDetection),
        )
        .unwrap()
        .with_saver(FrameSaver::new(&frames_dir, "CCTV"));
        let records: Vec<_> = sampler.by_ref().collect::<crate::Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(sampler.stats().frames_saved, 2);
        assert!(frames_dir.join("frame_000003.jpg").is_file());
        assert!(frames_dir.join("frame_000006.jpg").is_file());
    }

    #[test]
    fn confidences_stay_in_unit_range() {
        let wild = FnBackend::new("wild", |_: &Frame| {
            Ok(vec![Detection::new(3.0), Detection::new(-1.0)])
        });
        let sampler = FrameSampler::new(
            VecSource::new(5, 30.0),
            wild,
            config(1, 0.5, ThresholdMode::PerDetection),
        )
        .unwrap();
        for record in sampler {
            let record = record.unwrap();
            assert!((0.0..=1.0).contains(&record.confidence));
        }
    }
}
