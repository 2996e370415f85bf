// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 工作目录 (Workspace)
//!
//! 启动时创建,由调用方负责销毁。临时目录在 `Workspace` 被 drop
//! 或 `close()` 时删除;`--workdir` 指定的目录永远不会被删除。

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::Result;

/// 数据集必须包含的两个子目录
pub const DATASET_SUBDIRS: [&str; 2] = ["images", "labels"];

pub struct Workspace {
    root: PathBuf,
    temp: Option<TempDir>,
}

impl Workspace {
    /// 在系统临时目录下创建 `jetski_*` 工作目录
    pub fn temporary() -> Result<Self> {
        let temp = tempfile::Builder::new().prefix("jetski_").tempdir()?;
        let root = temp.path().to_path_buf();
        info!("📁 临时工作目录: {}", root.display());
        Ok(Self {
            root,
            temp: Some(temp),
        })
    }

    /// 使用已有目录 (不存在则创建)
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!("📁 工作目录: {}", root.display());
        Ok(Self { root, temp: None })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// 远程模型/字体缓存目录
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.root.join("datasets")
    }

    /// 训练用数据配置文件 (完整配置会被保存到这里)
    pub fn data_config_path(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    /// 训练输出目录
    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    /// 创建 `datasets/images` 与 `datasets/labels`
    pub fn prepare_dataset_layout(&self) -> Result<()> {
        for sub in DATASET_SUBDIRS {
            let dir = self.dataset_dir().join(sub);
            fs::create_dir_all(&dir)?;
            debug!("创建目录 {}", dir.display());
        }
        Ok(())
    }

    /// 保留临时目录 (不再自动删除),返回其路径
    pub fn keep(mut self) -> PathBuf {
        if let Some(temp) = self.temp.take() {
            let path = temp.keep();
            info!("📌 保留工作目录: {}", path.display());
            return path;
        }
        self.root.clone()
    }

    /// 显式销毁;非临时目录什么也不做
    pub fn close(mut self) -> Result<()> {
        if let Some(temp) = self.temp.take() {
            debug!("🧹 删除临时工作目录 {}", self.root.display());
            temp.close()?;
        }
        Ok(())
    }
}
