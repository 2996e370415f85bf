// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入 (Video Input)
///
/// - ImageSequenceCapture: 目录中的图片按文件名顺序作为帧
/// - FfmpegCapture:        文件/URL/摄像头解码 (`ffmpeg` 特性)
/// - CaptureFilter:        FFmpeg 帧过滤, YUV420P → RGB
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use image::RgbImage;

pub mod image_sequence;

#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
#[cfg(feature = "ffmpeg")]
pub mod decoder;

pub use image_sequence::ImageSequenceCapture;

#[cfg(feature = "ffmpeg")]
pub use decoder::FfmpegCapture;

/// 视频源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// 本地摄像头序号
    Device(usize),
    /// 图片目录
    ImageSequence(PathBuf),
    /// 视频文件或网络流
    Url(String),
}

impl VideoSource {
    /// 纯数字 → 摄像头; 目录 → 图片序列; 其余 → 文件/URL
    pub fn parse(source: &str) -> Self {
        let trimmed = source.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = trimmed.parse() {
                return VideoSource::Device(index);
            }
        }
        if Path::new(source).is_dir() {
            return VideoSource::ImageSequence(PathBuf::from(source));
        }
        VideoSource::Url(source.to_string())
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoSource::Device(index) => write!(f, "camera #{index}"),
            VideoSource::ImageSequence(dir) => write!(f, "{}", dir.display()),
            VideoSource::Url(url) => f.write_str(url),
        }
    }
}

/// 已打开的视频流
pub trait VideoCapture {
    /// 下一帧; `Ok(None)` 表示流结束, `Err` 表示读取失败
    fn read(&mut self) -> Result<Option<RgbImage>>;

    /// 释放底层资源,可重复调用
    fn release(&mut self);
}

/// 打开视频源
pub trait CaptureBackend {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn VideoCapture>>;
}

/// 默认后端: 图片目录总是可用,其余需要 `ffmpeg` 特性
#[derive(Debug, Clone, Default)]
pub struct DefaultCapture;

impl CaptureBackend for DefaultCapture {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn VideoCapture>> {
        match source {
            VideoSource::ImageSequence(dir) => Ok(Box::new(ImageSequenceCapture::open(dir)?)),
            #[cfg(feature = "ffmpeg")]
            other => Ok(Box::new(FfmpegCapture::open(other)?)),
            #[cfg(not(feature = "ffmpeg"))]
            other => anyhow::bail!("cannot open {other}: built without the `ffmpeg` feature"),
        }
    }
}
