// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 应用流程: 校验数据集 → 训练 → 打开视频 → 逐帧处理显示 → 释放

use std::fmt;
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use tracing::{info, warn};

use crate::annotate::Annotator;
use crate::cli::Args;
use crate::config::{self, default_config, Config, ConfigManager};
use crate::dataset::{DataValidator, DatasetValidator};
use crate::display::{Display, HeadlessDisplay, WINDOW_NAME};
use crate::input::{CaptureBackend, DefaultCapture, VideoCapture, VideoSource};
use crate::models::{OrtLoader, YOLOv8Config};
use crate::processor::{FrameProcessor, JetSkiProcessor};
use crate::repository::{is_remote, ModelRepository};
use crate::trainer::{ModelTrainer, TrainedModel, UltralyticsCli, YoloTrainer};
use crate::workspace::Workspace;
use crate::{Error, Result};

/// 流程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Validating,
    Training,
    Streaming,
    Stopped,
    Failed,
}

/// 视频循环结束原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    /// 读帧失败 (按流结束处理,不算错误)
    ReadFailure(String),
    UserRequested,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndOfStream => f.write_str("end of stream"),
            StopReason::ReadFailure(e) => write!(f, "read failure: {e}"),
            StopReason::UserRequested => f.write_str("stopped by user"),
        }
    }
}

/// 一次完整流程的结果
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSummary {
    pub trained: TrainedModel,
    pub frames_processed: usize,
    pub stop_reason: StopReason,
}

/// 流程依赖的各个组件
pub struct Components {
    pub validator: Box<dyn DataValidator + Send>,
    pub trainer: Box<dyn ModelTrainer + Send>,
    pub processor: Box<dyn FrameProcessor + Send>,
    pub capture: Box<dyn CaptureBackend + Send>,
    pub display: Box<dyn Display + Send>,
}

pub struct JetSkiTrackingApp {
    config: ConfigManager,
    validator: Box<dyn DataValidator + Send>,
    trainer: Box<dyn ModelTrainer + Send>,
    processor: Box<dyn FrameProcessor + Send>,
    capture: Box<dyn CaptureBackend + Send>,
    display: Box<dyn Display + Send>,
    state: WorkflowState,
}

/// 视频资源守卫: 任何退出路径都会释放采集并关闭窗口
struct StreamGuard<'a> {
    capture: Box<dyn VideoCapture>,
    display: &'a mut dyn Display,
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        self.capture.release();
        self.display.close();
        info!("🧹 视频资源已释放");
    }
}

impl JetSkiTrackingApp {
    pub fn new(config: ConfigManager, components: Components) -> Self {
        let Components {
            validator,
            trainer,
            processor,
            capture,
            display,
        } = components;
        Self {
            config,
            validator,
            trainer,
            processor,
            capture,
            display,
            state: WorkflowState::Idle,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigManager {
        &mut self.config
    }

    /// 替换显示后端 (预览窗口在主线程创建后注入)
    pub fn set_display(&mut self, display: Box<dyn Display + Send>) {
        self.display = display;
    }

    /// 执行完整流程
    pub fn execute_workflow(&mut self, source: &str) -> Result<WorkflowSummary> {
        let result = self.run(source);
        self.state = match &result {
            Ok(summary) => {
                info!(
                    "🏁 流程结束: {} 帧, {}",
                    summary.frames_processed, summary.stop_reason
                );
                WorkflowState::Stopped
            }
            Err(e) => {
                warn!("❌ 流程失败: {}", e);
                WorkflowState::Failed
            }
        };
        result
    }

    fn run(&mut self, source: &str) -> Result<WorkflowSummary> {
        self.state = WorkflowState::Validating;
        let config = self.config.config();
        let data_path = config.require_str(config::DATA_PATH)?;
        if !self.validator.validate(Path::new(data_path)) {
            return Err(Error::InvalidDataset(format!(
                "Invalid dataset structure: {data_path}"
            )));
        }
        info!("✅ 数据集结构有效: {}", data_path);

        self.state = WorkflowState::Training;
        let trained = self.trainer.train(&config)?;
        info!("✅ 模型训练完成: {}", trained.weights.display());

        self.state = WorkflowState::Streaming;
        let source = VideoSource::parse(source);
        let capture = self
            .capture
            .open(&source)
            .map_err(|e| Error::video(format!("Failed to open video source {source}: {e:#}")))?;
        info!("🎬 开始处理视频: {}", source);

        let mut stream = StreamGuard {
            capture,
            display: self.display.as_mut(),
        };
        let mut frames_processed = 0;
        let stop_reason = loop {
            let frame = match stream.capture.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::EndOfStream,
                Err(e) => {
                    warn!("⚠️ 读取帧失败,结束视频: {:#}", e);
                    break StopReason::ReadFailure(format!("{e:#}"));
                }
            };

            let annotated = self.processor.process_frame(&frame)?;
            stream
                .display
                .show(WINDOW_NAME, &annotated)
                .map_err(|e| Error::video(format!("Failed to display frame: {e:#}")))?;
            frames_processed += 1;

            if stream.display.stop_requested() {
                info!("⏹️ 收到停止信号");
                break StopReason::UserRequested;
            }
        };
        drop(stream);

        Ok(WorkflowSummary {
            trained,
            frames_processed,
            stop_reason,
        })
    }
}

/// 打开工作目录: `--workdir` 指定的目录,否则新建临时目录
pub fn open_workspace(args: &Args) -> Result<Workspace> {
    match &args.workdir {
        Some(dir) => Workspace::at(dir),
        None => Workspace::temporary(),
    }
}

/// 准备配置: 默认值 ← `--config` 文件 ← 命令行参数
///
/// 同时创建 `datasets/images`、`datasets/labels`,并把最终配置保存到
/// `data_config`,训练开始前它就是可用的数据文件。
pub fn prepare_config(args: &Args, workspace: &Workspace) -> Result<ConfigManager> {
    let mut manager = ConfigManager::new(default_config(workspace));
    if let Some(path) = &args.config {
        manager.update(ConfigManager::load(path)?.config());
    }
    manager.update(args.config_patch());

    workspace.prepare_dataset_layout()?;
    manager.save(manager.config().require_str(config::DATA_CONFIG)?)?;
    Ok(manager)
}

/// 模型/字体缓存目录
///
/// 临时工作目录会被删除,这时用平台缓存目录以便下次运行复用;
/// `--workdir` 下用 `<workdir>/models`。
pub fn model_cache_dir(workspace: &Workspace) -> PathBuf {
    if workspace.is_temporary() {
        ModelRepository::default_cache_dir()
    } else {
        workspace.cache_dir()
    }
}

/// 推理输入边长: 整数,或 `[h, w]` 取较大的一边
pub fn inference_imgsz(config: &Config) -> Result<u32> {
    let invalid = |value: &dyn fmt::Debug| {
        Error::configuration(format!(
            "`{}` must be a positive integer or [h, w], got {value:?}",
            config::IMGSZ
        ))
    };
    let value = config.require_present(config::IMGSZ)?;
    let side = match value {
        Value::Sequence(sides) if !sides.is_empty() => sides
            .iter()
            .map(|side| side.as_u64().ok_or_else(|| invalid(side)))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .max()
            .unwrap_or_default(),
        other => other.as_u64().ok_or_else(|| invalid(other))?,
    };
    match u32::try_from(side) {
        Ok(side) if side > 0 => Ok(side),
        _ => Err(invalid(value)),
    }
}

/// 本地推理模型必须存在;远程模型交给仓库下载
fn check_inference_model(spec: &str) -> Result<()> {
    if is_remote(spec) || Path::new(spec).is_file() {
        return Ok(());
    }
    Err(Error::configuration(format!(
        "inference model not found: {spec} (pass --weights <model.onnx|URL>, \
         e.g. after `yolo export model=yolov8n.pt format=onnx`)"
    )))
}

/// 启动: 工作目录、配置、数据集目录、推理模型、各组件
pub fn bootstrap_application(args: &Args) -> Result<(JetSkiTrackingApp, Workspace)> {
    let workspace = open_workspace(args)?;
    let manager = prepare_config(args, &workspace)?;
    let config = manager.config();

    let repository = ModelRepository::new(model_cache_dir(&workspace))?;
    let loader = OrtLoader::new(YOLOv8Config {
        conf: config.get_f32_or(config::CONF, 0.25)?,
        iou: config.get_f32_or(config::IOU, 0.45)?,
        imgsz: inference_imgsz(&config)?,
        cuda: args.cuda,
    });
    let inference_model = config.require_str(config::INFERENCE_MODEL)?;
    check_inference_model(inference_model)?;
    let model = repository.load_model(inference_model, &loader)?;

    let annotator = match &args.font {
        Some(font) => {
            let path = repository.resolve(font)?;
            Annotator::from_font_file(&path)
                .map_err(|e| Error::configuration(format!("{e:#}")))?
        }
        None => Annotator::new(),
    };
    let processor = JetSkiProcessor::new(model, config.tracker_options()?).with_annotator(annotator);

    let backend = UltralyticsCli::new(config.get_str_or(config::TRAINER_COMMAND, "yolo")?);
    let trainer = YoloTrainer::new(repository, backend);

    let display = match &args.save_frames {
        Some(dir) => HeadlessDisplay::save_frames_to(dir)
            .map_err(|e| Error::configuration(format!("{e:#}")))?,
        None => HeadlessDisplay::new(),
    };

    let app = JetSkiTrackingApp::new(
        manager,
        Components {
            validator: Box::new(DatasetValidator),
            trainer: Box::new(trainer),
            processor: Box::new(processor),
            capture: Box::new(DefaultCapture),
            display: Box::new(display),
        },
    );
    info!("🚀 应用初始化完成,工作目录 {}", workspace.root().display());
    Ok((app, workspace))
}
