// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ByteTrack 多目标跟踪
//!
//! 1. 所有轨迹先做卡尔曼预测
//! 2. 高分检测框与全部轨迹做 IOU 贪心匹配
//! 3. 低分检测框只用来救回第2步没匹配上的轨迹
//! 4. 剩下的高分框开新轨迹,丢失过久的轨迹删除
//!
//! 纯运动模型,不用外观特征。

use super::tracker::{compute_iou, id_to_color, KalmanBoxFilter};
use super::types::{BBox, TrackPoint};

/// 轨迹最多保留的中心点个数
const MAX_TRAJECTORY: usize = 50;

/// 一条轨迹
#[derive(Clone, Debug)]
pub struct Track {
    pub id: u32,
    /// 平滑后的框,类别/置信度取最近一次匹配的检测
    pub bbox: BBox,
    pub trajectory: Vec<TrackPoint>,
    /// 连续未匹配帧数 (0 表示本帧有检测)
    pub frames_lost: u32,
    pub color: [u8; 3],
    /// 匹配成功的总帧数
    pub hits: u32,
    kalman: KalmanBoxFilter,
}

impl Track {
    fn new(id: u32, detection: &BBox) -> Self {
        // r=0.5: 更信任检测结果,快速响应移动
        let kalman = KalmanBoxFilter::new(detection, 0.1, 0.5);
        let bbox = Self::smoothed(&kalman, detection);
        Self {
            id,
            trajectory: vec![TrackPoint::from(&bbox)],
            bbox,
            frames_lost: 0,
            color: id_to_color(id),
            hits: 1,
            kalman,
        }
    }

    fn smoothed(kalman: &KalmanBoxFilter, detection: &BBox) -> BBox {
        BBox {
            confidence: detection.confidence,
            class_id: detection.class_id,
            ..kalman.bbox()
        }
    }

    fn predict(&mut self) {
        self.kalman.predict();
        let estimate = Self::smoothed(&self.kalman, &self.bbox);
        self.bbox = estimate;
    }

    fn update(&mut self, detection: &BBox) {
        self.kalman.update(detection);
        self.bbox = Self::smoothed(&self.kalman, detection);
        self.frames_lost = 0;
        self.hits += 1;
        self.trajectory.push(TrackPoint::from(&self.bbox));
        if self.trajectory.len() > MAX_TRAJECTORY {
            self.trajectory.remove(0);
        }
    }

    /// 本帧是否有检测支撑
    pub fn is_active(&self) -> bool {
        self.frames_lost == 0
    }
}

/// ByteTrack 跟踪器
pub struct ByteTracker {
    tracks: Vec<Track>,
    next_id: u32,
    /// 最大允许丢失帧数
    max_lost_frames: u32,
    high_score_threshold: f32,
    /// 低于此分数的检测直接丢弃
    low_score_threshold: f32,
    high_iou_threshold: f32,
    low_iou_threshold: f32,
}

impl ByteTracker {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            max_lost_frames: 60, // 约2秒
            high_score_threshold: 0.4,
            low_score_threshold: 0.1,
            high_iou_threshold: 0.4,
            low_iou_threshold: 0.3,
        }
    }

    pub fn with_max_lost_frames(mut self, frames: u32) -> Self {
        self.max_lost_frames = frames;
        self
    }

    /// 输入当前帧检测,返回全部轨迹 (含暂时丢失的)
    pub fn update(&mut self, detections: &[BBox]) -> &[Track] {
        for track in &mut self.tracks {
            track.predict();
        }

        let (high, low): (Vec<usize>, Vec<usize>) = (0..detections.len())
            .filter(|&i| detections[i].confidence >= self.low_score_threshold)
            .partition(|&i| detections[i].confidence >= self.high_score_threshold);

        let mut det_matched = vec![false; detections.len()];
        let mut track_matched = vec![false; self.tracks.len()];

        let all_tracks: Vec<usize> = (0..self.tracks.len()).collect();
        for (d, t) in self.associate(detections, &high, &all_tracks, self.high_iou_threshold) {
            det_matched[d] = true;
            track_matched[t] = true;
            self.tracks[t].update(&detections[d]);
        }

        let leftover: Vec<usize> = all_tracks
            .into_iter()
            .filter(|&t| !track_matched[t])
            .collect();
        for (d, t) in self.associate(detections, &low, &leftover, self.low_iou_threshold) {
            det_matched[d] = true;
            track_matched[t] = true;
            self.tracks[t].update(&detections[d]);
        }

        for (t, matched) in track_matched.into_iter().enumerate() {
            if !matched {
                self.tracks[t].frames_lost += 1;
            }
        }

        for d in high {
            if !det_matched[d] {
                self.tracks.push(Track::new(self.next_id, &detections[d]));
                self.next_id += 1;
            }
        }

        let max_lost = self.max_lost_frames;
        self.tracks.retain(|t| t.frames_lost <= max_lost);
        &self.tracks
    }

    /// 贪心 IOU 匹配,返回 (检测下标, 轨迹下标)
    fn associate(
        &self,
        detections: &[BBox],
        det_indices: &[usize],
        track_indices: &[usize],
        iou_threshold: f32,
    ) -> Vec<(usize, usize)> {
        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
        for &d in det_indices {
            for &t in track_indices {
                let iou = compute_iou(&detections[d], &self.tracks[t].kalman.predicted_bbox());
                if iou >= iou_threshold {
                    candidates.push((iou, d, t));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut used_det = Vec::new();
        let mut used_track = Vec::new();
        let mut pairs = Vec::new();
        for (_, d, t) in candidates {
            if !used_det.contains(&d) && !used_track.contains(&t) {
                used_det.push(d);
                used_track.push(t);
                pairs.push((d, t));
            }
        }
        pairs
    }

    /// 本帧有检测支撑的轨迹
    pub fn active_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.is_active())
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// 清空所有轨迹, ID 从1重新开始
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new()
    }
}
