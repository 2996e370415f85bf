// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 单帧处理: 检测 → 类别过滤 → 跟踪 → 绘制

use image::RgbImage;
use tracing::debug;

use crate::annotate::Annotator;
use crate::config::TrackerOptions;
use crate::detection::ByteTracker;
use crate::models::Model;
use crate::{Error, Result};

/// 帧处理器
pub trait FrameProcessor {
    /// 返回绘制了跟踪结果的新帧
    fn process_frame(&mut self, frame: &RgbImage) -> Result<RgbImage>;
}

pub struct JetSkiProcessor<M> {
    model: M,
    tracker: ByteTracker,
    options: TrackerOptions,
    annotator: Annotator,
}

impl<M: Model> JetSkiProcessor<M> {
    pub fn new(model: M, options: TrackerOptions) -> Self {
        Self {
            model,
            tracker: ByteTracker::new(),
            options,
            annotator: Annotator::new(),
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn options(&self) -> &TrackerOptions {
        &self.options
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: Model> FrameProcessor for JetSkiProcessor<M> {
    fn process_frame(&mut self, frame: &RgbImage) -> Result<RgbImage> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(Error::frame("Frame processing failed: empty frame"));
        }

        let detections: Vec<_> = self
            .model
            .detect(frame)
            .map_err(|e| Error::frame(format!("Frame processing failed: {e:#}")))?
            .into_iter()
            .filter(|det| self.options.allows(det.class_id))
            .collect();

        if !self.options.persist {
            self.tracker.reset();
        }
        self.tracker.update(&detections);

        let labelled: Vec<_> = self
            .tracker
            .active_tracks()
            .map(|track| {
                let name = self.model.class_name(track.bbox.class_id);
                (track, Annotator::label(track, &name))
            })
            .collect();
        debug!(
            "检测 {} 个, 跟踪 {} 个",
            detections.len(),
            labelled.len()
        );
        Ok(self.annotator.annotate(frame, labelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use image::Rgb;

    /// 每帧返回固定检测,右移 `step` 像素
    struct ScriptedModel {
        detections: Vec<BBox>,
        step: f32,
        calls: usize,
        fail: bool,
        names: Vec<String>,
    }

    impl ScriptedModel {
        fn new(detections: Vec<BBox>) -> Self {
            Self {
                detections,
                step: 2.0,
                calls: 0,
                fail: false,
                names: vec!["jetski".into(), "boat".into()],
            }
        }
    }

    impl Model for ScriptedModel {
        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<BBox>> {
            if self.fail {
                anyhow::bail!("inference exploded");
            }
            let shift = self.calls as f32 * self.step;
            self.calls += 1;
            Ok(self
                .detections
                .iter()
                .map(|b| BBox::new(b.x1 + shift, b.y1, b.x2 + shift, b.y2, b.confidence, b.class_id))
                .collect())
        }

        fn names(&self) -> &[String] {
            &self.names
        }
    }

    fn frame() -> RgbImage {
        RgbImage::from_pixel(160, 120, Rgb([10, 20, 30]))
    }

    fn jetski_and_boat() -> Vec<BBox> {
        vec![
            BBox::new(10.0, 10.0, 50.0, 50.0, 0.9, 0),
            BBox::new(90.0, 10.0, 130.0, 50.0, 0.9, 1),
        ]
    }

    #[test]
    fn empty_frame_is_frame_error() {
        let mut processor =
            JetSkiProcessor::new(ScriptedModel::new(vec![]), TrackerOptions::default());
        let err = processor.process_frame(&RgbImage::new(0, 0)).unwrap_err();
        assert!(matches!(err, Error::FrameProcessing(_)));
        assert!(err.is_video_processing());
        assert_eq!(processor.model().calls, 0);
    }

    #[test]
    fn inference_failure_is_frame_error() {
        let mut model = ScriptedModel::new(vec![]);
        model.fail = true;
        let mut processor = JetSkiProcessor::new(model, TrackerOptions::default());
        match processor.process_frame(&frame()).unwrap_err() {
            Error::FrameProcessing(msg) => assert!(msg.contains("inference exploded")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn output_is_annotated_copy() {
        let mut processor =
            JetSkiProcessor::new(ScriptedModel::new(jetski_and_boat()), TrackerOptions::default());
        let input = frame();
        let out = processor.process_frame(&input).unwrap();
        assert_eq!(out.dimensions(), input.dimensions());
        assert_ne!(out, input);
        // 只保留类别0: boat 的框没有被画
        assert_eq!(*out.get_pixel(90, 30), Rgb([10, 20, 30]));
        assert_ne!(*out.get_pixel(10, 30), Rgb([10, 20, 30]));
    }

    #[test]
    fn class_filter_applies_before_tracking() {
        let mut processor =
            JetSkiProcessor::new(ScriptedModel::new(jetski_and_boat()), TrackerOptions::default());
        processor.process_frame(&frame()).unwrap();
        assert_eq!(processor.tracker.track_count(), 1);

        let all = TrackerOptions {
            persist: true,
            classes: None,
        };
        let mut processor = JetSkiProcessor::new(ScriptedModel::new(jetski_and_boat()), all);
        processor.process_frame(&frame()).unwrap();
        assert_eq!(processor.tracker.track_count(), 2);

        let nothing = TrackerOptions {
            persist: true,
            classes: Some(vec![]),
        };
        let mut processor = JetSkiProcessor::new(ScriptedModel::new(jetski_and_boat()), nothing);
        let input = frame();
        let out = processor.process_frame(&input).unwrap();
        assert_eq!(processor.tracker.track_count(), 0);
        assert_eq!(out, input);
    }

    #[test]
    fn persist_keeps_identities_across_frames() {
        let mut processor =
            JetSkiProcessor::new(ScriptedModel::new(jetski_and_boat()), TrackerOptions::default());
        for _ in 0..5 {
            processor.process_frame(&frame()).unwrap();
        }
        let track = processor.tracker.active_tracks().next().unwrap();
        assert_eq!(track.id, 1);
        assert_eq!(track.hits, 5);
    }

    #[test]
    fn no_persist_resets_every_frame() {
        let options = TrackerOptions {
            persist: false,
            classes: Some(vec![0]),
        };
        let mut processor = JetSkiProcessor::new(ScriptedModel::new(jetski_and_boat()), options);
        for _ in 0..5 {
            processor.process_frame(&frame()).unwrap();
        }
        assert_eq!(processor.tracker.track_count(), 1);
        let track = processor.tracker.active_tracks().next().unwrap();
        assert_eq!(track.id, 1);
        assert_eq!(track.hits, 1);
    }
}
