// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 完整流程测试: 各组件用记录调用的替身

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::RgbImage;
use jetski_tracker::app::{Components, StopReason};
use jetski_tracker::config::{self, Config, ConfigManager};
use jetski_tracker::dataset::{DataValidator, DatasetValidator};
use jetski_tracker::display::{Display, StopSignal};
use jetski_tracker::input::{CaptureBackend, VideoCapture, VideoSource};
use jetski_tracker::processor::FrameProcessor;
use jetski_tracker::trainer::{ModelTrainer, TrainedModel};
use jetski_tracker::{Error, JetSkiTrackingApp, WorkflowState};

#[derive(Default)]
struct Calls {
    validated: Vec<PathBuf>,
    trained: Vec<Config>,
    opened: Vec<VideoSource>,
    frames_read: usize,
    processed: usize,
    shown: usize,
    released: usize,
    closed: usize,
}

type Shared = Arc<Mutex<Calls>>;

struct FixedValidator {
    valid: bool,
    calls: Shared,
}

impl DataValidator for FixedValidator {
    fn validate(&self, path: &Path) -> bool {
        self.calls.lock().unwrap().validated.push(path.to_path_buf());
        self.valid
    }
}

struct FakeTrainer {
    fail: bool,
    calls: Shared,
}

impl ModelTrainer for FakeTrainer {
    fn train(&self, config: &Config) -> jetski_tracker::Result<TrainedModel> {
        self.calls.lock().unwrap().trained.push(config.clone());
        if self.fail {
            return Err(Error::configuration("Training failed: boom"));
        }
        Ok(TrainedModel {
            weights: PathBuf::from("runs/detect/jetski_detection/weights/best.pt"),
            run_dir: PathBuf::from("runs/detect/jetski_detection"),
        })
    }
}

struct FakeProcessor {
    fail_at: Option<usize>,
    calls: Shared,
}

impl FrameProcessor for FakeProcessor {
    fn process_frame(&mut self, frame: &RgbImage) -> jetski_tracker::Result<RgbImage> {
        let mut calls = self.calls.lock().unwrap();
        calls.processed += 1;
        if Some(calls.processed) == self.fail_at {
            return Err(Error::frame("detector exploded"));
        }
        Ok(frame.clone())
    }
}

/// 读完 `frames` 帧后结束,或在第 `fail_at` 次读取时报错
struct FakeCapture {
    frames: usize,
    fail_at: Option<usize>,
    calls: Shared,
}

impl VideoCapture for FakeCapture {
    fn read(&mut self) -> anyhow::Result<Option<RgbImage>> {
        let mut calls = self.calls.lock().unwrap();
        calls.frames_read += 1;
        if Some(calls.frames_read) == self.fail_at {
            anyhow::bail!("corrupt packet");
        }
        if calls.frames_read > self.frames {
            return Ok(None);
        }
        Ok(Some(RgbImage::new(8, 8)))
    }

    fn release(&mut self) {
        self.calls.lock().unwrap().released += 1;
    }
}

struct FakeBackend {
    frames: usize,
    read_fail_at: Option<usize>,
    refuse: bool,
    calls: Shared,
}

impl CaptureBackend for FakeBackend {
    fn open(&self, source: &VideoSource) -> anyhow::Result<Box<dyn VideoCapture>> {
        self.calls.lock().unwrap().opened.push(source.clone());
        if self.refuse {
            anyhow::bail!("no such device");
        }
        Ok(Box::new(FakeCapture {
            frames: self.frames,
            fail_at: self.read_fail_at,
            calls: self.calls.clone(),
        }))
    }
}

/// 显示第 `stop_after` 帧后触发停止信号
struct FakeDisplay {
    stop_after: Option<usize>,
    stop: StopSignal,
    calls: Shared,
}

impl Display for FakeDisplay {
    fn show(&mut self, _window: &str, _frame: &RgbImage) -> anyhow::Result<()> {
        let mut calls = self.calls.lock().unwrap();
        calls.shown += 1;
        if Some(calls.shown) == self.stop_after {
            self.stop.request();
        }
        Ok(())
    }

    fn stop_requested(&mut self) -> bool {
        self.stop.is_requested()
    }

    fn close(&mut self) {
        self.calls.lock().unwrap().closed += 1;
    }
}

struct Scenario {
    valid_dataset: bool,
    train_fails: bool,
    refuse_open: bool,
    frames: usize,
    read_fail_at: Option<usize>,
    process_fail_at: Option<usize>,
    stop_after: Option<usize>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            valid_dataset: true,
            train_fails: false,
            refuse_open: false,
            frames: 3,
            read_fail_at: None,
            process_fail_at: None,
            stop_after: None,
        }
    }
}

fn base_config() -> Config {
    Config::new()
        .with(config::BASE_MODEL, "yolov8n.pt")
        .with(config::DATA_CONFIG, "/tmp/jetski/config.yaml")
        .with(config::DATA_PATH, "/tmp/jetski/dataset")
        .with(config::EPOCHS, 10u64)
        .with(config::IMGSZ, 640u64)
}

fn components(scenario: &Scenario, calls: &Shared) -> Components {
    Components {
        validator: Box::new(FixedValidator {
            valid: scenario.valid_dataset,
            calls: calls.clone(),
        }),
        trainer: Box::new(FakeTrainer {
            fail: scenario.train_fails,
            calls: calls.clone(),
        }),
        processor: Box::new(FakeProcessor {
            fail_at: scenario.process_fail_at,
            calls: calls.clone(),
        }),
        capture: Box::new(FakeBackend {
            frames: scenario.frames,
            read_fail_at: scenario.read_fail_at,
            refuse: scenario.refuse_open,
            calls: calls.clone(),
        }),
        display: Box::new(FakeDisplay {
            stop_after: scenario.stop_after,
            stop: StopSignal::new(),
            calls: calls.clone(),
        }),
    }
}

fn build(scenario: Scenario) -> (JetSkiTrackingApp, Shared) {
    let calls = Shared::default();
    let components = components(&scenario, &calls);
    (
        JetSkiTrackingApp::new(ConfigManager::new(base_config()), components),
        calls,
    )
}

#[test]
fn invalid_dataset_stops_before_training() {
    let (mut app, calls) = build(Scenario {
        valid_dataset: false,
        ..Scenario::default()
    });

    let err = app.execute_workflow("lake.mp4").unwrap_err();
    assert!(matches!(err, Error::InvalidDataset(_)));
    assert!(err.to_string().contains("Invalid dataset structure"));
    assert_eq!(app.state(), WorkflowState::Failed);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.validated, vec![PathBuf::from("/tmp/jetski/dataset")]);
    assert!(calls.trained.is_empty());
    assert!(calls.opened.is_empty());
}

#[test]
fn plays_stream_to_the_end() {
    let (mut app, calls) = build(Scenario::default());
    assert_eq!(app.state(), WorkflowState::Idle);

    let summary = app.execute_workflow("lake.mp4").unwrap();
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert!(summary.trained.weights.ends_with("weights/best.pt"));
    assert_eq!(app.state(), WorkflowState::Stopped);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.trained.len(), 1);
    assert_eq!(calls.trained[0].require_u64(config::EPOCHS).unwrap(), 10);
    assert_eq!(calls.opened, vec![VideoSource::Url("lake.mp4".into())]);
    assert_eq!(calls.processed, 3);
    assert_eq!(calls.shown, 3);
    assert_eq!(calls.released, 1);
    assert_eq!(calls.closed, 1);
}

#[test]
fn trainer_sees_config_updates() {
    let (mut app, calls) = build(Scenario::default());
    app.config_mut()
        .update(Config::new().with(config::EPOCHS, 1u64).with(config::BATCH, 4u64));

    app.execute_workflow("0").unwrap();

    let calls = calls.lock().unwrap();
    let seen = &calls.trained[0];
    assert_eq!(seen.require_u64(config::EPOCHS).unwrap(), 1);
    assert_eq!(seen.require_u64(config::BATCH).unwrap(), 4);
    assert_eq!(seen.require_u64(config::IMGSZ).unwrap(), 640);
    assert_eq!(calls.opened, vec![VideoSource::Device(0)]);
}

#[test]
fn training_failure_skips_video() {
    let (mut app, calls) = build(Scenario {
        train_fails: true,
        ..Scenario::default()
    });

    let err = app.execute_workflow("lake.mp4").unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(calls.lock().unwrap().opened.is_empty());
}

#[test]
fn unopenable_source_is_a_video_error() {
    let (mut app, calls) = build(Scenario {
        refuse_open: true,
        ..Scenario::default()
    });

    let err = app.execute_workflow("rtsp://cam/live").unwrap_err();
    assert!(matches!(err, Error::VideoProcessing(_)));
    assert!(err.to_string().contains("rtsp://cam/live"));
    assert_eq!(app.state(), WorkflowState::Failed);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.trained.len(), 1);
    assert_eq!(calls.released, 0);
}

#[test]
fn stop_signal_ends_loop_after_current_frame() {
    let (mut app, calls) = build(Scenario {
        frames: 100,
        stop_after: Some(2),
        ..Scenario::default()
    });

    let summary = app.execute_workflow("lake.mp4").unwrap();
    assert_eq!(summary.stop_reason, StopReason::UserRequested);
    assert_eq!(summary.frames_processed, 2);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.frames_read, 2);
    assert_eq!(calls.released, 1);
    assert_eq!(calls.closed, 1);
}

#[test]
fn read_failure_ends_stream_quietly() {
    let (mut app, calls) = build(Scenario {
        frames: 10,
        read_fail_at: Some(3),
        ..Scenario::default()
    });

    let summary = app.execute_workflow("lake.mp4").unwrap();
    assert_eq!(summary.frames_processed, 2);
    match summary.stop_reason {
        StopReason::ReadFailure(msg) => assert!(msg.contains("corrupt packet")),
        other => panic!("unexpected stop reason: {other}"),
    }
    assert_eq!(calls.lock().unwrap().released, 1);
}

#[test]
fn frame_error_propagates_after_release() {
    let (mut app, calls) = build(Scenario {
        frames: 10,
        process_fail_at: Some(2),
        ..Scenario::default()
    });

    let err = app.execute_workflow("lake.mp4").unwrap_err();
    assert!(matches!(err, Error::FrameProcessing(_)));
    assert!(err.is_video_processing());
    assert_eq!(app.state(), WorkflowState::Failed);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.shown, 1);
    assert_eq!(calls.released, 1);
    assert_eq!(calls.closed, 1);
}

#[test]
fn real_validator_rejects_dataset_without_labels() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("images")).unwrap();

    let calls = Shared::default();
    let mut components = components(
        &Scenario {
            frames: 1,
            ..Scenario::default()
        },
        &calls,
    );
    components.validator = Box::new(DatasetValidator);
    let config = base_config().with(
        config::DATA_PATH,
        dir.path().to_string_lossy().into_owned(),
    );
    let mut app = JetSkiTrackingApp::new(ConfigManager::new(config), components);

    let err = app.execute_workflow("lake.mp4").unwrap_err();
    assert!(matches!(err, Error::InvalidDataset(_)));
    assert!(calls.lock().unwrap().trained.is_empty());

    std::fs::create_dir(dir.path().join("labels")).unwrap();
    let summary = app.execute_workflow("lake.mp4").unwrap();
    assert_eq!(summary.frames_processed, 1);
    assert_eq!(calls.lock().unwrap().trained.len(), 1);
}
