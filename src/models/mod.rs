// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测模型统一接口
///
/// ```text
/// RGB帧 → preprocess(letterbox) → ort 推理 → postprocess(解码+NMS) → Vec<BBox>
/// ```
use anyhow::Result;
use image::RgbImage;

use crate::detection::tracker::compute_iou;
use crate::detection::BBox;

pub mod yolov8;

pub use yolov8::{OrtLoader, YOLOv8, YOLOv8Config};

/// 检测模型
pub trait Model {
    /// 单帧检测,坐标为原图像素
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BBox>>;

    /// 类别名 (下标即类别ID)
    fn names(&self) -> &[String];

    fn class_name(&self, class_id: usize) -> String {
        self.names()
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{class_id}"))
    }
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BBox>> {
        (**self).detect(image)
    }

    fn names(&self) -> &[String] {
        (**self).names()
    }
}

/// 按类别贪心 NMS,结果按置信度降序
pub fn non_max_suppression(boxes: &mut Vec<BBox>, iou_threshold: f32) {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..boxes.len() {
        let suppressed = boxes[..kept].iter().any(|prev| {
            prev.class_id == boxes[index].class_id
                && compute_iou(prev, &boxes[index]) > iou_threshold
        });
        if !suppressed {
            boxes.swap(kept, index);
            kept += 1;
        }
    }
    boxes.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nms_keeps_best_per_cluster() {
        let mut boxes = vec![
            BBox::new(0.0, 0.0, 10.0, 10.0, 0.6, 0),
            BBox::new(1.0, 1.0, 11.0, 11.0, 0.9, 0),
            BBox::new(50.0, 50.0, 60.0, 60.0, 0.5, 0),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
        assert!((boxes[0].confidence - 0.9).abs() < 1e-6);
        assert!((boxes[1].confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_nms_is_class_aware() {
        let mut boxes = vec![
            BBox::new(0.0, 0.0, 10.0, 10.0, 0.9, 0),
            BBox::new(0.0, 0.0, 10.0, 10.0, 0.8, 1),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
    }

    struct Named(Vec<String>);

    impl Model for Named {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<BBox>> {
            Ok(Vec::new())
        }

        fn names(&self) -> &[String] {
            &self.0
        }
    }

    #[test]
    fn test_class_name_fallback() {
        let model: Box<dyn Model> = Box::new(Named(vec!["jetski".into()]));
        assert_eq!(model.class_name(0), "jetski");
        assert_eq!(model.class_name(5), "class5");
    }
}
