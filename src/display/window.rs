// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! macroquad 预览窗口
//!
//! macroquad 必须跑在主线程,所以工作流放到工作线程, `WindowDisplay`
//! 只是把帧送进通道;`run_window` 在主线程消费并绘制。
//! 按 `q`/`Esc` 或关闭窗口都会触发停止信号。

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use image::RgbImage;
use macroquad::prelude::*;
use tracing::info;

use super::{Display, StopSignal, WINDOW_NAME};

/// 工作线程侧
pub struct WindowDisplay {
    frames: Option<Sender<RgbImage>>,
    stop: StopSignal,
}

impl WindowDisplay {
    /// 返回显示端和给 `run_window` 用的接收端
    pub fn channel(stop: StopSignal) -> (Self, Receiver<RgbImage>) {
        let (tx, rx) = bounded(2);
        (
            Self {
                frames: Some(tx),
                stop,
            },
            rx,
        )
    }
}

impl Display for WindowDisplay {
    fn show(&mut self, _window: &str, frame: &RgbImage) -> Result<()> {
        let frames = self
            .frames
            .as_ref()
            .ok_or_else(|| anyhow!("window already closed"))?;
        match frames.try_send(frame.clone()) {
            // 窗口只显示最新帧,来不及画的直接丢掉
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => self.stop.request(),
        }
        Ok(())
    }

    fn stop_requested(&mut self) -> bool {
        self.stop.is_requested()
    }

    fn close(&mut self) {
        self.frames.take();
    }
}

fn to_texture(frame: &RgbImage) -> Texture2D {
    let rgba: Vec<u8> = frame
        .pixels()
        .flat_map(|p| [p.0[0], p.0[1], p.0[2], 255])
        .collect();
    let texture = Texture2D::from_rgba8(frame.width() as u16, frame.height() as u16, &rgba);
    texture.set_filter(FilterMode::Linear);
    texture
}

/// 在主线程运行预览窗口,直到工作线程关闭通道或用户要求停止
pub fn run_window(frames: Receiver<RgbImage>, stop: StopSignal) {
    let conf = Conf {
        window_title: WINDOW_NAME.to_string(),
        window_width: 1280,
        window_height: 720,
        high_dpi: true,
        ..Default::default()
    };
    let signal = stop.clone();

    macroquad::Window::from_config(conf, async move {
        let mut texture: Option<Texture2D> = None;
        loop {
            if is_key_pressed(KeyCode::Q) || is_key_pressed(KeyCode::Escape) {
                info!("⏹️ 用户请求停止");
                signal.request();
                break;
            }

            // 只显示最新一帧
            let mut latest = None;
            loop {
                match frames.try_recv() {
                    Ok(frame) => latest = Some(frame),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if latest.is_none() {
                            return;
                        }
                        break;
                    }
                }
            }
            if let Some(frame) = latest {
                texture = Some(to_texture(&frame));
            }

            clear_background(BLACK);
            if let Some(tex) = &texture {
                let scale = (screen_width() / tex.width()).min(screen_height() / tex.height());
                let (w, h) = (tex.width() * scale, tex.height() * scale);
                draw_texture_ex(
                    tex,
                    (screen_width() - w) / 2.0,
                    (screen_height() - h) / 2.0,
                    WHITE,
                    DrawTextureParams {
                        dest_size: Some(vec2(w, h)),
                        ..Default::default()
                    },
                );
            }
            next_frame().await;
        }
    });

    // 窗口被关闭也算停止
    stop.request();
}
