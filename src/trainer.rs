// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 模型训练
//!
//! 本 crate 不实现训练本身,只负责把配置翻译成一次外部训练调用。

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{bail, Context};
use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::config::{self, Config};
use crate::repository::{Fetcher, HttpFetcher, ModelRepository};
use crate::{Error, Result};

/// 一次训练的全部参数
///
/// `epochs` `imgsz` `batch` 原样转交训练后端,例如 `batch: -1`
/// (AutoBatch)、`batch: 0.7` (显存比例)、`imgsz: [640, 480]`。
#[derive(Debug, Clone, PartialEq)]
pub struct TrainRequest {
    pub model: PathBuf,
    pub data: PathBuf,
    pub epochs: Value,
    pub imgsz: Value,
    pub batch: Value,
    pub name: String,
    pub project: Option<PathBuf>,
}

/// 训练产物
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub weights: PathBuf,
    pub run_dir: PathBuf,
}

/// 训练后端
pub trait TrainingBackend {
    fn train(&self, request: &TrainRequest) -> anyhow::Result<TrainedModel>;
}

/// 调用 Ultralytics 命令行: `yolo detect train model=.. data=.. ...`
#[derive(Debug, Clone)]
pub struct UltralyticsCli {
    program: String,
}

impl UltralyticsCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn arguments(request: &TrainRequest) -> Vec<String> {
        let mut args = vec![
            "detect".to_string(),
            "train".to_string(),
            format!("model={}", request.model.display()),
            format!("data={}", request.data.display()),
            format!("epochs={}", cli_value(&request.epochs)),
            format!("imgsz={}", cli_value(&request.imgsz)),
            format!("batch={}", cli_value(&request.batch)),
            format!("name={}", request.name),
            "exist_ok=True".to_string(),
        ];
        if let Some(project) = &request.project {
            args.push(format!("project={}", project.display()));
        }
        args
    }

    /// Ultralytics 的默认输出位置是 `runs/detect/<name>`
    fn run_dir(request: &TrainRequest) -> PathBuf {
        request
            .project
            .clone()
            .unwrap_or_else(|| Path::new("runs").join("detect"))
            .join(&request.name)
    }
}

impl Default for UltralyticsCli {
    fn default() -> Self {
        Self::new("yolo")
    }
}

/// YAML 值 → Ultralytics `key=value` 里的 value
fn cli_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(items) => {
            let items: Vec<String> = items.iter().map(cli_value).collect();
            format!("[{}]", items.join(","))
        }
        Value::Mapping(_) | Value::Tagged(_) => serde_yaml::to_string(value)
            .map(|text| text.trim().to_string())
            .unwrap_or_default(),
    }
}

fn log_lines(stream: impl Read) {
    for line in BufReader::new(stream).lines().map_while(|l| l.ok()) {
        if !line.trim().is_empty() {
            info!("[yolo] {}", line);
        }
    }
}

impl TrainingBackend for UltralyticsCli {
    fn train(&self, request: &TrainRequest) -> anyhow::Result<TrainedModel> {
        let args = Self::arguments(request);
        info!("🏋️ 启动训练: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("cannot start `{}`", self.program))?;

        // 进度条走 stderr,单独线程读,避免管道写满阻塞子进程
        let stderr_thread = child.stderr.take().map(|s| thread::spawn(move || log_lines(s)));
        if let Some(stdout) = child.stdout.take() {
            log_lines(stdout);
        }
        if let Some(handle) = stderr_thread {
            let _ = handle.join();
        }

        let status = child.wait()?;
        if !status.success() {
            bail!("`{}` exited with {}", self.program, status);
        }

        let run_dir = Self::run_dir(request);
        let weights_dir = run_dir.join("weights");
        let weights = ["best.pt", "last.pt"]
            .iter()
            .map(|name| weights_dir.join(name))
            .find(|path| path.is_file())
            .with_context(|| format!("no weights found in {}", weights_dir.display()))?;

        info!("✅ 训练完成: {}", weights.display());
        Ok(TrainedModel { weights, run_dir })
    }
}

/// 训练器
pub trait ModelTrainer {
    fn train(&self, config: &Config) -> Result<TrainedModel>;
}

/// 基于配置的 YOLO 训练器
///
/// 读取 `base_model` `data_config` `epochs` `imgsz`,可选 `batch`(默认8)
/// `name`(默认 `jetski_detection`) `project`。任何失败都折叠为
/// `Configuration("Training failed: ...")`。
pub struct YoloTrainer<B, F = HttpFetcher> {
    repository: ModelRepository<F>,
    backend: B,
}

impl<B: TrainingBackend, F: Fetcher> YoloTrainer<B, F> {
    pub fn new(repository: ModelRepository<F>, backend: B) -> Self {
        Self {
            repository,
            backend,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn request(&self, config: &Config) -> Result<TrainRequest> {
        let model = self
            .repository
            .resolve(config.require_str(config::BASE_MODEL)?)?;
        let project = match config.get(config::PROJECT) {
            None | Some(Value::Null) => None,
            Some(_) => Some(PathBuf::from(config.require_str(config::PROJECT)?)),
        };
        Ok(TrainRequest {
            model,
            data: PathBuf::from(config.require_str(config::DATA_CONFIG)?),
            epochs: config.require_present(config::EPOCHS)?.clone(),
            imgsz: config.require_present(config::IMGSZ)?.clone(),
            batch: match config.get(config::BATCH) {
                None | Some(Value::Null) => Value::from(config::DEFAULT_BATCH),
                Some(value) => value.clone(),
            },
            name: config.get_str_or(config::NAME, config::DEFAULT_RUN_NAME)?,
            project,
        })
    }
}

impl<B: TrainingBackend, F: Fetcher> ModelTrainer for YoloTrainer<B, F> {
    fn train(&self, config: &Config) -> Result<TrainedModel> {
        let request = self.request(config).map_err(|e| {
            warn!("❌ 训练参数无效: {}", e);
            Error::configuration(format!("Training failed: {e}"))
        })?;
        debug!("训练请求: {:?}", request);

        self.backend.train(&request).map_err(|e| {
            warn!("❌ 训练失败: {:#}", e);
            Error::configuration(format!("Training failed: {e:#}"))
        })
    }
}
