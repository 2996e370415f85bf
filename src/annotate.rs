// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪结果绘制: 框、轨迹、标签

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;

use crate::detection::Track;

/// 框线宽 (像素)
const BOX_THICKNESS: i32 = 2;

pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Annotator {
    /// 无字体: 只画框和轨迹
    pub fn new() -> Self {
        Self {
            font: None,
            scale: PxScale::from(16.0),
        }
    }

    pub fn with_font(font: FontVec) -> Self {
        Self {
            font: Some(font),
            ..Self::new()
        }
    }

    /// 加载 TTF/OTF 字体文件
    pub fn from_font_file(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| anyhow::anyhow!("invalid font {}", path.display()))?;
        Ok(Self::with_font(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// 标签文字: `#<id> <类别> <置信度>`
    pub fn label(track: &Track, class_name: &str) -> String {
        format!("#{} {} {:.2}", track.id, class_name, track.bbox.confidence)
    }

    /// 在副本上绘制,原帧不变
    pub fn annotate<'a>(
        &self,
        frame: &RgbImage,
        tracks: impl IntoIterator<Item = (&'a Track, String)>,
    ) -> RgbImage {
        let mut canvas = frame.clone();
        for (track, label) in tracks {
            self.draw_track(&mut canvas, track, &label);
        }
        canvas
    }

    pub fn draw_track(&self, canvas: &mut RgbImage, track: &Track, label: &str) {
        let color = Rgb(track.color);
        let bbox = &track.bbox;

        for inset in 0..BOX_THICKNESS {
            let x = bbox.x1.round() as i32 + inset;
            let y = bbox.y1.round() as i32 + inset;
            let w = bbox.width().round() as i32 - 2 * inset;
            let h = bbox.height().round() as i32 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(w as u32, h as u32), color);
        }

        for pair in track.trajectory.windows(2) {
            draw_line_segment_mut(canvas, (pair[0].x, pair[0].y), (pair[1].x, pair[1].y), color);
        }

        let Some(font) = &self.font else {
            return;
        };
        let (tw, th) = text_size(self.scale, font, label);
        if tw == 0 || th == 0 {
            return;
        }
        let x = bbox.x1.round().max(0.0) as i32;
        // 标签放在框上方,放不下就放到框内
        let y = (bbox.y1.round() as i32 - th as i32 - 4).max(0);
        draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(tw + 4, th + 4), color);
        draw_text_mut(canvas, Rgb([255, 255, 255]), x + 2, y + 2, self.scale, font, label);
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BBox, ByteTracker};

    #[test]
    fn test_annotate_draws_box_on_copy() {
        let frame = RgbImage::new(100, 100);
        let mut tracker = ByteTracker::new();
        tracker.update(&[BBox::new(20.0, 20.0, 60.0, 60.0, 0.9, 0)]);
        let track = tracker.active_tracks().next().unwrap();
        let color = Rgb(track.color);

        let annotator = Annotator::new();
        let out = annotator.annotate(&frame, [(track, Annotator::label(track, "jetski"))]);

        assert_eq!(out.dimensions(), frame.dimensions());
        assert_eq!(*out.get_pixel(20, 40), color);
        assert_eq!(*out.get_pixel(21, 40), color);
        assert_eq!(*out.get_pixel(40, 40), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(20, 40), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_label_format() {
        let mut tracker = ByteTracker::new();
        tracker.update(&[BBox::new(0.0, 0.0, 10.0, 10.0, 0.876, 0)]);
        let track = tracker.active_tracks().next().unwrap();
        assert_eq!(Annotator::label(track, "jetski"), "#1 jetski 0.88");
    }

    #[test]
    fn test_invalid_font_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(Annotator::from_font_file(&path).is_err());
        assert!(!Annotator::new().has_font());
    }
}
