// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 领域错误类型
///
/// 所有外部库的失败都在最近的封装边界被转换成下面某一种,
/// 只保留消息字符串。不做重试,不做本地恢复。
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 配置缺失/类型错误,或训练流程失败
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 视频源无法打开等视频处理失败
    #[error("video processing error: {0}")]
    VideoProcessing(String),

    /// 单帧处理失败 (视频处理错误的子类)
    #[error("frame processing error: {0}")]
    FrameProcessing(String),

    /// 远程模型下载失败
    #[error("model download error: {0}")]
    ModelDownload(String),

    /// 数据集目录结构不合法
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// 配置文件读写
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn video(msg: impl Into<String>) -> Self {
        Error::VideoProcessing(msg.into())
    }

    pub fn frame(msg: impl Into<String>) -> Self {
        Error::FrameProcessing(msg.into())
    }

    /// 帧处理错误也属于视频处理错误
    pub fn is_video_processing(&self) -> bool {
        matches!(self, Error::VideoProcessing(_) | Error::FrameProcessing(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
