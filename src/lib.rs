// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotate; // 跟踪结果绘制
pub mod app; // 流程编排与启动
pub mod cli; // 命令行参数
pub mod config; // 运行配置 (YAML)
pub mod dataset; // 数据集结构检查
pub mod detection; // 检测框与多目标跟踪
pub mod display; // 结果显示
pub mod error;
pub mod input; // 视频输入系统
pub mod models; // 检测模型
pub mod processor; // 单帧处理
pub mod repository; // 模型仓库/缓存
pub mod trainer; // 模型训练
pub mod workspace; // 工作目录

pub use crate::app::{bootstrap_application, JetSkiTrackingApp, WorkflowState, WorkflowSummary};
pub use crate::cli::Args;
pub use crate::config::{Config, ConfigManager};
pub use crate::error::{Error, Result};
pub use crate::models::{Model, YOLOv8};
