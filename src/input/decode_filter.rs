// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// FFmpeg 采集过滤器: YUV420P 帧 → RgbImage → 通道
use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, info, warn};

/// 解码帧过滤器
///
/// 接收端被丢弃后返回错误,FFmpeg 随即停止解码。
pub struct CaptureFilter {
    frames: Sender<RgbImage>,
    total_frames: usize,
    dropped_frames: usize,
}

impl CaptureFilter {
    pub fn new(frames: Sender<RgbImage>) -> Self {
        Self {
            frames,
            total_frames: 0,
            dropped_frames: 0,
        }
    }

    fn drop_frame(&mut self, reason: &str) {
        self.dropped_frames += 1;
        if self.dropped_frames <= 10 {
            warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
    }
}

impl FrameFilter for CaptureFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        self.total_frames += 1;

        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            self.drop_frame("空帧/损坏帧");
            return Ok(None);
        }

        // SAFETY: 指针非空, FFmpeg 在本回调期间保证帧数据有效;
        // 滤镜链已把像素格式固定为 yuv420p
        let image = unsafe {
            let av = &*frame.as_ptr();
            let (w, h) = (av.width as usize, av.height as usize);
            let planes = [av.data[0], av.data[1], av.data[2]];
            let y_stride = av.linesize[0] as usize;
            let uv_stride = av.linesize[1] as usize;

            if w == 0 || h == 0 {
                self.drop_frame("非法分辨率");
                return Ok(None);
            }
            if planes.iter().any(|p| p.is_null()) || y_stride < w || uv_stride < w.div_ceil(2) {
                self.drop_frame("YUV平面无效");
                return Ok(None);
            }

            let y = std::slice::from_raw_parts(planes[0], y_stride * h);
            let u = std::slice::from_raw_parts(planes[1], uv_stride * h.div_ceil(2));
            let v = std::slice::from_raw_parts(planes[2], uv_stride * h.div_ceil(2));
            yuv420p_to_rgb(y, u, v, y_stride, uv_stride, w, h)
        };

        let Some(image) = image else {
            self.drop_frame("转换失败");
            return Ok(None);
        };
        if self.frames.send(image).is_err() {
            debug!("采集已释放,停止解码");
            return Err("capture released".to_string());
        }
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        info!(
            "✅ 解码线程退出 (总帧 {}, 丢弃 {})",
            self.total_frames, self.dropped_frames
        );
    }
}

/// BT.601 整数近似 YUV420P → RGB
pub fn yuv420p_to_rgb(
    y_plane: &[u8],
    u_plane: &[u8],
    v_plane: &[u8],
    y_stride: usize,
    uv_stride: usize,
    width: usize,
    height: usize,
) -> Option<RgbImage> {
    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in 0..height {
        let y_row = row * y_stride;
        let uv_row = (row / 2) * uv_stride;
        for col in 0..width {
            let y = *y_plane.get(y_row + col)? as i32;
            let u = *u_plane.get(uv_row + col / 2)? as i32 - 128;
            let v = *v_plane.get(uv_row + col / 2)? as i32 - 128;
            rgb.push((y + ((v * 179) >> 7)).clamp(0, 255) as u8);
            rgb.push((y - ((u * 44) >> 7) - ((v * 91) >> 7)).clamp(0, 255) as u8);
            rgb.push((y + ((u * 227) >> 7)).clamp(0, 255) as u8);
        }
    }
    RgbImage::from_raw(width as u32, height as u32, rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grey_converts_to_grey() {
        let (w, h) = (4, 2);
        let y = vec![100u8; w * h];
        let uv = vec![128u8; w / 2];
        let img = yuv420p_to_rgb(&y, &uv, &uv, w, w / 2, w, h).unwrap();
        assert_eq!(img.dimensions(), (4, 2));
        assert!(img.pixels().all(|p| p.0 == [100, 100, 100]));
    }

    #[test]
    fn test_short_plane_is_rejected() {
        let y = vec![0u8; 3];
        let uv = vec![128u8; 1];
        assert!(yuv420p_to_rgb(&y, &uv, &uv, 2, 1, 2, 2).is_none());
    }
}
