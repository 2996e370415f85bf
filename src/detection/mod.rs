// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测与跟踪
///
/// - types:     检测框/轨迹点
/// - tracker:   卡尔曼框滤波、IOU、配色
/// - bytetrack: ByteTrack 多目标跟踪
pub mod bytetrack;
pub mod tracker;
pub mod types;

pub use bytetrack::{ByteTracker, Track};
pub use types::{BBox, TrackPoint};
