use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use sightline::{
    build_backend, BackendKind, DescribeConfig, Profile, SurveyConfig, SurveyError, ThresholdMode,
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SIGHTLINE_CONFIG",
        "SIGHTLINE_PROFILE",
        "SIGHTLINE_VIDEO_PATH",
        "SIGHTLINE_MODEL_PATH",
        "SIGHTLINE_CLASSES",
        "SIGHTLINE_OUTPUT_CSV",
        "SIGHTLINE_FRAMES_DIR",
        "SIGHTLINE_SAVE_FRAMES",
        "SIGHTLINE_INTERVAL",
        "SIGHTLINE_THRESHOLD",
        "SIGHTLINE_THRESHOLD_MODE",
        "SIGHTLINE_BACKEND",
        "SIGHTLINE_API_KEY",
        "SIGHTLINE_API_ENDPOINT",
        "SIGHTLINE_API_TIMEOUT_SECS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SurveyConfig::load().expect("load defaults");
    assert_eq!(cfg.profile, Profile::Cctv);
    assert_eq!(cfg.video_path, "video.mp4");
    assert_eq!(cfg.output_csv, PathBuf::from("cctv_output.csv"));
    assert_eq!(cfg.sampler.interval, 15);
    assert_eq!(cfg.sampler.threshold, 0.3);
    assert_eq!(cfg.backend, BackendKind::Tract);
    assert_eq!(cfg.detector.model_path, PathBuf::from("models/cctv.onnx"));
    assert!(!cfg.save_frames);
}

#[test]
fn stub_backend_is_opt_in() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("SIGHTLINE_MODEL_PATH", dir.path().join("doors.onnx"));
    let cfg = SurveyConfig::load_with_profile(Some(Profile::Door)).expect("load config");
    assert_eq!(cfg.backend, BackendKind::Tract);
    // a configured model that cannot be loaded fails instead of falling back
    assert!(build_backend(cfg.backend, &cfg.detector).is_err());

    std::env::set_var("SIGHTLINE_BACKEND", "stub");
    let cfg = SurveyConfig::load_with_profile(Some(Profile::Door)).expect("load config");
    assert_eq!(cfg.backend, BackendKind::Stub);
    let backend = build_backend(cfg.backend, &cfg.detector).expect("stub backend");
    assert_eq!(backend.name(), "stub");

    clear_env();
}

#[test]
fn classes_come_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SIGHTLINE_CLASSES", "1, 4");
    let cfg = SurveyConfig::load().expect("load config");
    assert_eq!(cfg.detector.classes, Some(vec![1, 4]));
    clear_env();

    std::env::set_var("SIGHTLINE_CLASSES", "person");
    assert!(matches!(SurveyConfig::load(), Err(SurveyError::Config(_))));
    clear_env();
}

#[test]
fn loads_every_profile_for_a_combined_run() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let configs = SurveyConfig::load_profiles(&Profile::parse_list("all").unwrap())
        .expect("load profiles");
    let profiles: Vec<Profile> = configs.iter().map(|cfg| cfg.profile).collect();
    assert_eq!(profiles, vec![Profile::Cctv, Profile::Door]);
    assert_eq!(configs[0].output_csv, PathBuf::from("cctv_output.csv"));
    assert_eq!(configs[1].output_csv, PathBuf::from("door_output.csv"));
    assert_eq!(configs[1].sampler.mode, ThresholdMode::Prefiltered);

    // one shared CSV path would make the second pass overwrite the first
    std::env::set_var("SIGHTLINE_OUTPUT_CSV", "shared.csv");
    assert!(matches!(
        SurveyConfig::load_profiles(&Profile::ALL),
        Err(SurveyError::Config(_))
    ));
    clear_env();

    std::env::set_var("SIGHTLINE_SAVE_FRAMES", "true");
    std::env::set_var("SIGHTLINE_FRAMES_DIR", "frames");
    assert!(matches!(
        SurveyConfig::load_profiles(&Profile::ALL),
        Err(SurveyError::Config(_))
    ));
    clear_env();

    assert!(matches!(
        SurveyConfig::load_profiles(&[]),
        Err(SurveyError::Config(_))
    ));
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "profile": "door",
        "video": { "path": "footage/lobby.mp4", "fps_override": 25.0 },
        "detector": { "backend": "tract", "model_path": "models/lobby.onnx", "input_size": 320 },
        "sampling": { "interval": 10, "threshold": 0.45 },
        "output": { "csv_path": "out/lobby.csv", "save_frames": true, "overlay_label": "Entrance" }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SIGHTLINE_CONFIG", file.path());
    std::env::set_var("SIGHTLINE_INTERVAL", "5");
    std::env::set_var("SIGHTLINE_FRAMES_DIR", "out/frames");

    let cfg = SurveyConfig::load().expect("load config");

    assert_eq!(cfg.profile, Profile::Door);
    assert_eq!(cfg.video_path, "footage/lobby.mp4");
    assert_eq!(cfg.fps_override, Some(25.0));
    assert_eq!(cfg.backend, BackendKind::Tract);
    assert_eq!(cfg.detector.model_path, PathBuf::from("models/lobby.onnx"));
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.sampler.interval, 5);
    assert_eq!(cfg.sampler.threshold, 0.45);
    // not in the file: falls back to the door profile
    assert_eq!(cfg.sampler.mode, ThresholdMode::Prefiltered);
    assert_eq!(cfg.sampler.label_prefix, "entry_exit_frame");
    assert_eq!(cfg.output_csv, PathBuf::from("out/lobby.csv"));
    assert!(cfg.save_frames);
    assert_eq!(cfg.frames_dir, PathBuf::from("out/frames"));
    assert_eq!(cfg.overlay_label, "Entrance");

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
        [video]
        path = "stub://clip?frames=45&fps=30"

        [sampling]
        threshold = 0.6
        threshold_mode = "prefiltered"
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("SIGHTLINE_CONFIG", file.path());

    let cfg = SurveyConfig::load().expect("load config");
    assert_eq!(cfg.profile, Profile::Cctv);
    assert_eq!(cfg.video_path, "stub://clip?frames=45&fps=30");
    assert_eq!(cfg.sampler.threshold, 0.6);
    assert_eq!(cfg.sampler.mode, ThresholdMode::Prefiltered);

    clear_env();
}

#[test]
fn explicit_profile_beats_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SIGHTLINE_PROFILE", "cctv");
    let cfg = SurveyConfig::load_with_profile(Some(Profile::Door)).expect("load config");
    assert_eq!(cfg.profile, Profile::Door);
    assert_eq!(cfg.output_csv, PathBuf::from("door_output.csv"));

    clear_env();
}

#[test]
fn rejects_out_of_range_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SIGHTLINE_THRESHOLD", "1.5");
    assert!(matches!(SurveyConfig::load(), Err(SurveyError::Config(_))));
    clear_env();

    std::env::set_var("SIGHTLINE_INTERVAL", "0");
    assert!(matches!(SurveyConfig::load(), Err(SurveyError::Config(_))));
    clear_env();

    std::env::set_var("SIGHTLINE_SAVE_FRAMES", "sometimes");
    assert!(matches!(SurveyConfig::load(), Err(SurveyError::Config(_))));
    clear_env();

    std::env::set_var("SIGHTLINE_PROFILE", "garage");
    assert!(matches!(SurveyConfig::load(), Err(SurveyError::Config(_))));
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("SIGHTLINE_CONFIG", dir.path().join("absent.json"));
    assert!(matches!(SurveyConfig::load(), Err(SurveyError::Config(_))));

    clear_env();
}

#[test]
fn describe_config_requires_api_key() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    assert!(matches!(DescribeConfig::load(), Err(SurveyError::Config(_))));

    std::env::set_var("SIGHTLINE_API_KEY", "test-key");
    std::env::set_var("SIGHTLINE_API_ENDPOINT", "http://127.0.0.1:9/generate");
    std::env::set_var("SIGHTLINE_API_TIMEOUT_SECS", "5");
    let cfg = DescribeConfig::load().expect("load describe config");
    assert_eq!(cfg.api_key, "test-key");
    assert_eq!(cfg.endpoint, "http://127.0.0.1:9/generate");
    assert_eq!(cfg.timeout, Duration::from_secs(5));

    clear_env();
}
