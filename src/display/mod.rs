// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 结果显示
///
/// - HeadlessDisplay: 无窗口,可选把每帧写成 PNG
/// - WindowDisplay:   macroquad 预览窗口 (`window` 特性)
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{debug, info};

#[cfg(feature = "window")]
pub mod window;

#[cfg(feature = "window")]
pub use window::{run_window, WindowDisplay};

/// 预览窗口名
pub const WINDOW_NAME: &str = "JetSki Tracking";

/// 跨线程停止信号 (按键/关闭窗口/外部请求)
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 显示后端
pub trait Display {
    fn show(&mut self, window: &str, frame: &RgbImage) -> Result<()>;

    /// 每帧轮询一次
    fn stop_requested(&mut self) -> bool;

    /// 关闭所有窗口,可重复调用
    fn close(&mut self);
}

#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    output_dir: Option<PathBuf>,
    shown: usize,
    stop: StopSignal,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每帧保存为 `<dir>/frame_000001.png`
    pub fn save_frames_to(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        info!("💾 输出帧目录: {}", dir.display());
        Ok(Self {
            output_dir: Some(dir),
            ..Self::default()
        })
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn frames_shown(&self) -> usize {
        self.shown
    }
}

impl Display for HeadlessDisplay {
    fn show(&mut self, window: &str, frame: &RgbImage) -> Result<()> {
        self.shown += 1;
        if let Some(dir) = &self.output_dir {
            let path = dir.join(format!("frame_{:06}.png", self.shown));
            frame
                .save(&path)
                .with_context(|| format!("save {}", path.display()))?;
            debug!("[{}] 保存 {}", window, path.display());
        }
        Ok(())
    }

    fn stop_requested(&mut self) -> bool {
        self.stop.is_requested()
    }

    fn close(&mut self) {
        debug!("关闭无窗口显示 ({} 帧)", self.shown);
    }
}
