//! survey - sample a video, run a detector, and write a verdict table.
//!
//! Configuration comes from `SIGHTLINE_CONFIG` (TOML or JSON), then
//! `SIGHTLINE_*` environment variables, then these flags. `--profile all`
//! (or a repeated `--profile`) runs the passes one after another.

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use sightline::{
    build_backend, run_survey, ui::Ui, BackendKind, CancelToken, DetectorBackend, Profile,
    SurveyConfig, ThresholdMode,
};

#[derive(Parser, Debug)]
#[command(
    name = "survey",
    about = "Sample every Kth video frame and record detector verdicts to CSV"
)]
struct Args {
    /// Preset defaults (cctv|door|all); repeat or comma-separate to run several passes
    #[arg(long, value_name = "PROFILE")]
    profile: Vec<String>,

    /// Input video path (or stub://clip?frames=N&fps=F for a synthetic clip)
    #[arg(long, value_name = "PATH")]
    video: Option<String>,

    /// Detector model path
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Detector backend (stub|tract)
    #[arg(long, value_name = "BACKEND")]
    backend: Option<BackendKind>,

    /// Output CSV path
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Confidence threshold in 0..=1
    #[arg(long)]
    threshold: Option<f32>,

    /// How the threshold is applied (per-detection|prefiltered)
    #[arg(long, value_name = "MODE")]
    threshold_mode: Option<ThresholdMode>,

    /// Process every Nth frame
    #[arg(long, value_name = "N")]
    interval: Option<u64>,

    /// Frame rate to assume when the container reports none
    #[arg(long, value_name = "FPS")]
    fps: Option<f64>,

    /// Save annotated JPEGs of sampled frames
    #[arg(long)]
    save_frames: bool,

    /// Directory for annotated frames
    #[arg(long, value_name = "DIR")]
    frames_dir: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let configs = {
        let _stage = ui.stage("Load configuration");
        load_configs(&args)?
    };

    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("interrupt received, finishing current frame");
        handler_cancel.cancel();
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    for cfg in &configs {
        if cancel.is_cancelled() {
            log::warn!("skipping profile {}: cancelled", cfg.profile);
            continue;
        }
        run_pass(&ui, cfg, &cancel)?;
    }
    Ok(())
}

fn load_configs(args: &Args) -> Result<Vec<SurveyConfig>> {
    let profiles = Profile::parse_list(&args.profile.join(",")).map_err(|e| anyhow!(e))?;
    let mut configs = if profiles.len() > 1 {
        if args.output.is_some() || args.model.is_some() || args.frames_dir.is_some() {
            bail!(
                "--output, --model and --frames-dir apply to a single profile; \
                 run the profiles separately to override them"
            );
        }
        SurveyConfig::load_profiles(&profiles)?
    } else {
        vec![SurveyConfig::load_with_profile(profiles.first().copied())?]
    };
    for cfg in &mut configs {
        apply_args(cfg, args);
        cfg.validate()?;
    }
    Ok(configs)
}

fn run_pass(ui: &Ui, cfg: &SurveyConfig, cancel: &CancelToken) -> Result<()> {
    log::info!(
        "profile={}, video={}, output={}",
        cfg.profile,
        cfg.video_path,
        cfg.output_csv.display()
    );

    let detector = {
        let _stage = ui.stage(&format!("Load {} detector", cfg.profile));
        let mut detector = build_backend(cfg.backend, &cfg.detector)?;
        detector.warm_up()?;
        detector
    };
    log::info!("detector backend: {}", detector.name());

    let mut progress = ui.frames();
    let summary = run_survey(cfg, detector, cancel, &mut progress)?;

    println!(
        "survey [{}]: {} record(s), {} positive, {} frame(s) decoded",
        cfg.profile, summary.stats.records, summary.stats.positives, summary.stats.frames_decoded
    );
    println!("csv: {}", summary.csv_path.display());
    println!("sha256: {}", summary.sha256);
    if cfg.save_frames {
        println!(
            "frames: {} saved to {} ({} failed)",
            summary.stats.frames_saved,
            cfg.frames_dir.display(),
            summary.stats.save_failures
        );
    }
    if summary.stats.cancelled {
        println!("note: cancelled before the end of the video");
    }
    if summary.stats.decode_terminated {
        println!("note: decoding stopped early; the table covers frames read so far");
    }
    Ok(())
}

fn apply_args(cfg: &mut SurveyConfig, args: &Args) {
    if let Some(video) = &args.video {
        cfg.video_path = video.clone();
    }
    if let Some(model) = &args.model {
        cfg.detector.model_path = model.clone();
    }
    if let Some(backend) = args.backend {
        cfg.backend = backend;
    }
    if let Some(output) = &args.output {
        cfg.output_csv = output.clone();
    }
    if let Some(threshold) = args.threshold {
        cfg.sampler.threshold = threshold;
    }
    if let Some(mode) = args.threshold_mode {
        cfg.sampler.mode = mode;
    }
    if let Some(interval) = args.interval {
        cfg.sampler.interval = interval;
    }
    if let Some(fps) = args.fps {
        cfg.fps_override = Some(fps);
    }
    if args.save_frames {
        cfg.save_frames = true;
    }
    if let Some(dir) = &args.frames_dir {
        cfg.frames_dir = dir.clone();
    }
}
