// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 跟踪公共组件: 框滤波、IOU、ID配色

use super::types::BBox;

/// 速度每帧保留比例
const VELOCITY_DECAY: f32 = 0.95;
/// 连续静止后的速度保留比例
const STATIONARY_DECAY: f32 = 0.7;
/// 尺寸变化速度每帧保留比例
const SIZE_DECAY: f32 = 0.98;
/// 低于该速度(像素/帧)视为静止
const STATIONARY_THRESHOLD: f32 = 2.0;

/// 单个目标的简化卡尔曼滤波 (对角协方差)
///
/// 状态: `[cx, cy, w, h, vx, vy, vw, vh]`,匀速模型加速度衰减。
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    state: [f32; 8],
    p: [f32; 8],
    /// 过程噪声
    q: f32,
    /// 观测噪声
    r: f32,
    stationary_frames: u32,
}

fn measure(bbox: &BBox) -> [f32; 4] {
    let (cx, cy) = bbox.center();
    [cx, cy, bbox.width(), bbox.height()]
}

impl KalmanBoxFilter {
    /// `q` 越小越平滑, `r` 越大越信任预测
    pub fn new(bbox: &BBox, q: f32, r: f32) -> Self {
        let [cx, cy, w, h] = measure(bbox);
        Self {
            state: [cx, cy, w, h, 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q,
            r,
            stationary_frames: 0,
        }
    }

    fn speed(&self) -> f32 {
        self.state[4].hypot(self.state[5])
    }

    /// 预测一帧
    pub fn predict(&mut self) {
        let stationary = self.speed() < STATIONARY_THRESHOLD;
        let (pos_decay, size_decay) = if stationary {
            self.stationary_frames += 1;
            let decay = if self.stationary_frames > 3 {
                STATIONARY_DECAY
            } else {
                VELOCITY_DECAY
            };
            (decay, decay)
        } else {
            self.stationary_frames = 0;
            (VELOCITY_DECAY, SIZE_DECAY)
        };

        self.state[4] *= pos_decay;
        self.state[5] *= pos_decay;
        self.state[6] *= size_decay;
        self.state[7] *= size_decay;
        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }

        let q = if stationary { self.q * 0.5 } else { self.q };
        self.p.iter_mut().for_each(|p| *p += q);
    }

    /// 融合一次观测
    pub fn update(&mut self, bbox: &BBox) {
        let z = measure(bbox);
        let mut residual = [0.0f32; 4];
        for i in 0..4 {
            residual[i] = z[i] - self.state[i];
        }

        // 残差小→更信任观测,残差大(跳变)→更信任预测
        let jump = residual[0].hypot(residual[1]);
        let r = if jump < STATIONARY_THRESHOLD {
            self.r * 0.3
        } else if jump < 10.0 {
            self.r
        } else {
            self.r * 3.0
        };
        let velocity_gain = if jump < STATIONARY_THRESHOLD { 0.3 } else { 1.0 };

        for i in 0..4 {
            let k_pos = self.p[i] / (self.p[i] + r);
            let k_vel = self.p[i + 4] / (self.p[i + 4] + r * 10.0);
            self.state[i] += k_pos * residual[i];
            self.state[i + 4] += k_vel * residual[i] * velocity_gain;
            self.p[i] *= 1.0 - k_pos;
            self.p[i + 4] *= 1.0 - k_vel;
        }

        if jump >= STATIONARY_THRESHOLD {
            self.stationary_frames = 0;
        }
    }

    /// 当前估计
    pub fn bbox(&self) -> BBox {
        BBox::from_center(self.state[0], self.state[1], self.state[2], self.state[3])
    }

    /// 下一帧预测 (用于匹配)
    pub fn predicted_bbox(&self) -> BBox {
        BBox::from_center(
            self.state[0] + self.state[4],
            self.state[1] + self.state[5],
            self.state[2] + self.state[6],
            self.state[3] + self.state[7],
        )
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.state[4], self.state[5])
    }
}

/// 两框 IOU
pub fn compute_iou(a: &BBox, b: &BBox) -> f32 {
    let iw = a.x2.min(b.x2) - a.x1.max(b.x1);
    let ih = a.y2.min(b.y2) - a.y1.max(b.y1);
    if iw <= 0.0 || ih <= 0.0 {
        return 0.0;
    }
    let inter = iw * ih;
    let union = a.area() + b.area() - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// 根据ID生成颜色 (黄金角采样色相)
pub fn id_to_color(id: u32) -> [u8; 3] {
    let hue = (id as f32 * 137.508) % 360.0;
    hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r, g, b].map(|v| ((v + m) * 255.0) as u8)
}
