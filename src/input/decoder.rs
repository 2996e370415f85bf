// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// FFmpeg 视频采集
///
/// 解码在独立线程里跑 `FfmpegContext`,帧经有界通道交给调用方。
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Result};
use crossbeam_channel::{bounded, Receiver};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use tracing::{info, warn};

use super::decode_filter::CaptureFilter;
use super::{VideoCapture, VideoSource};

/// 解码线程与读取端之间的缓冲帧数
const FRAME_BUFFER: usize = 8;

pub struct FfmpegCapture {
    frames: Option<Receiver<RgbImage>>,
    /// 解码结束状态 (Err 为解码失败信息)
    finished: Receiver<std::result::Result<(), String>>,
    worker: Option<JoinHandle<()>>,
}

/// 摄像头 URL 与输入格式 (DirectShow/AVFoundation/V4L2)
fn camera_input(index: usize) -> Result<Input> {
    #[cfg(target_os = "windows")]
    {
        let devices = ez_ffmpeg::device::get_input_video_devices()
            .map_err(|e| anyhow!("cannot list cameras: {e}"))?;
        let name = devices
            .get(index)
            .ok_or_else(|| anyhow!("camera #{index} not found ({} available)", devices.len()))?;
        Ok(Input::new(format!("video={name}")).set_format("dshow"))
    }
    #[cfg(target_os = "macos")]
    {
        Ok(Input::new(index.to_string()).set_format("avfoundation"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        Ok(Input::new(format!("/dev/video{index}")).set_format("v4l2"))
    }
}

fn build_input(source: &VideoSource) -> Result<Input> {
    match source {
        VideoSource::Device(index) => camera_input(*index),
        VideoSource::Url(url) if url.starts_with("rtsp://") => Ok(Input::new(url.as_str())
            .set_input_opts([("rtsp_transport", "tcp"), ("rtsp_flags", "prefer_tcp")].into())),
        VideoSource::Url(url) => Ok(Input::new(url.as_str())),
        VideoSource::ImageSequence(dir) => Ok(Input::new(dir.to_string_lossy().into_owned())),
    }
}

impl FfmpegCapture {
    /// 打开视频源;打开失败在返回前就报告
    pub fn open(source: &VideoSource) -> Result<Self> {
        let input = build_input(source)?;
        let (frame_tx, frame_rx) = bounded(FRAME_BUFFER);
        let (ready_tx, ready_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        let label = source.to_string();

        let worker = thread::Builder::new()
            .name("ffmpeg-decode".into())
            .spawn(move || {
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("capture", Box::new(CaptureFilter::new(frame_tx)));
                let started = FfmpegContext::builder()
                    .input(input)
                    .filter_descs(["format=yuv420p"].into())
                    .output(create_null_output().add_frame_pipeline(pipe))
                    .build()
                    .map_err(|e| format!("build failed: {e}"))
                    .and_then(|ctx| ctx.start().map_err(|e| format!("start failed: {e}")));

                let scheduler = match started {
                    Ok(scheduler) => {
                        let _ = ready_tx.send(Ok(()));
                        scheduler
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let result = scheduler.wait().map_err(|e| e.to_string());
                let _ = done_tx.send(result);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("🎬 视频源已打开: {}", label);
                Ok(Self {
                    frames: Some(frame_rx),
                    finished: done_rx,
                    worker: Some(worker),
                })
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                bail!("cannot open {label}: {e}")
            }
            Err(_) => {
                let _ = worker.join();
                bail!("decode thread for {label} exited before start")
            }
        }
    }
}

impl VideoCapture for FfmpegCapture {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        let frames = self
            .frames
            .as_ref()
            .ok_or_else(|| anyhow!("capture already released"))?;
        match frames.recv() {
            Ok(frame) => Ok(Some(frame)),
            // 发送端随解码结束而关闭: 正常结束或解码失败
            Err(_) => match self.finished.recv() {
                Ok(Err(e)) => Err(anyhow!("decode failed: {e}")),
                _ => Ok(None),
            },
        }
    }

    fn release(&mut self) {
        // 先断开接收端,过滤器下一次发送失败即终止解码
        self.frames.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("⚠️ 解码线程异常退出");
            }
        }
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.release();
    }
}
