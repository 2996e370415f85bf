// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测框 (像素坐标, 左上/右下角)
#[derive(Clone, Debug, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: usize) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    /// 由中心点与宽高构造 (宽高最小为1像素)
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        let w = w.max(1.0);
        let h = h.max(1.0);
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0, 1.0, 0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// 限制在图像范围内
    pub fn clamp_to(&mut self, width: u32, height: u32) {
        let (w, h) = (width as f32, height as f32);
        self.x1 = self.x1.clamp(0.0, w);
        self.x2 = self.x2.clamp(0.0, w);
        self.y1 = self.y1.clamp(0.0, h);
        self.y2 = self.y2.clamp(0.0, h);
    }
}

/// 轨迹点 (框中心)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackPoint {
    pub x: f32,
    pub y: f32,
}

impl From<&BBox> for TrackPoint {
    fn from(bbox: &BBox) -> Self {
        let (x, y) = bbox.center();
        Self { x, y }
    }
}
