// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::Parser;

use crate::config::{self, Config};

/// 水上摩托检测与跟踪
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "JetSki 检测训练与跟踪", long_about = None)]
pub struct Args {
    /// 视频源: 文件/URL、摄像头序号或图片目录
    pub source: String,

    /// YAML 配置文件 (覆盖默认配置)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 工作目录 (默认创建 jetski_* 临时目录)
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// 结束后保留临时工作目录
    #[arg(long)]
    pub keep_workdir: bool,

    /// 推理用 ONNX 模型 (本地路径或 http(s) URL)
    ///
    /// 默认读取当前目录下的 yolov8n.onnx,没有时可先
    /// `yolo export model=yolov8n.pt format=onnx` 导出
    #[arg(short, long)]
    pub weights: Option<String>,

    /// 训练轮数
    #[arg(long)]
    pub epochs: Option<u64>,

    /// 输入尺寸
    #[arg(long)]
    pub imgsz: Option<u64>,

    /// 训练批大小
    #[arg(long)]
    pub batch: Option<u64>,

    /// 置信度阈值
    #[arg(long)]
    pub conf: Option<f32>,

    /// NMS IOU 阈值
    #[arg(long)]
    pub iou: Option<f32>,

    /// 使用 CUDA 推理
    #[arg(long)]
    pub cuda: bool,

    /// 标签字体 (TTF/OTF, 本地路径或 URL)
    #[arg(long)]
    pub font: Option<String>,

    /// 把标注后的帧保存为 PNG
    #[arg(long)]
    pub save_frames: Option<PathBuf>,

    /// 不打开预览窗口
    #[arg(long)]
    pub headless: bool,
}

impl Args {
    /// 命令行给出的参数作为配置补丁
    pub fn config_patch(&self) -> Config {
        let mut patch = Config::new();
        if let Some(weights) = &self.weights {
            patch.insert(config::INFERENCE_MODEL, weights.as_str());
        }
        if let Some(epochs) = self.epochs {
            patch.insert(config::EPOCHS, epochs);
        }
        if let Some(imgsz) = self.imgsz {
            patch.insert(config::IMGSZ, imgsz);
        }
        if let Some(batch) = self.batch {
            patch.insert(config::BATCH, batch);
        }
        if let Some(conf) = self.conf {
            patch.insert(config::CONF, conf as f64);
        }
        if let Some(iou) = self.iou {
            patch.insert(config::IOU, iou as f64);
        }
        patch
    }
}
