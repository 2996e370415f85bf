// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 ONNX 检测模型
// 包含: 模型加载、预处理、推理、后处理

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array, ArrayView2, Axis};
use ort::session::{builder::GraphOptimizationLevel, Session};
use regex::Regex;
use tracing::{debug, info, warn};

use super::{non_max_suppression, Model};
use crate::detection::BBox;
use crate::repository::ModelLoader;
use crate::Error;

/// letterbox 填充灰度
const PAD_VALUE: f32 = 144.0 / 255.0;
/// 输出前4行是 cx, cy, w, h
const CXYWH_OFFSET: usize = 4;

/// YOLOv8 推理参数
#[derive(Debug, Clone, PartialEq)]
pub struct YOLOv8Config {
    pub conf: f32,
    pub iou: f32,
    /// 输入边长 (导出时的 imgsz)
    pub imgsz: u32,
    pub cuda: bool,
}

impl Default for YOLOv8Config {
    fn default() -> Self {
        Self {
            conf: 0.25,
            iou: 0.45,
            imgsz: 640,
            cuda: false,
        }
    }
}

/// YOLOv8 模型
pub struct YOLOv8 {
    session: Session,
    input_name: String,
    width: u32,
    height: u32,
    conf: f32,
    iou: f32,
    names: Vec<String>,
}

impl YOLOv8 {
    pub fn new(path: &Path, config: &YOLOv8Config) -> Result<Self> {
        let mut builder = Session::builder()?;
        if config.cuda {
            builder = with_cuda(builder)?;
        }
        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .context("model has no inputs")?;

        let names = session
            .metadata()
            .ok()
            .and_then(|meta| meta.custom("names").ok().flatten())
            .map(|raw| parse_names(&raw))
            .unwrap_or_default();
        if names.is_empty() {
            warn!("⚠️ 模型元数据中没有类别名");
        }

        info!(
            "✅ YOLOv8 已加载: 输入 {} {}x{}, {} 类",
            input_name,
            config.imgsz,
            config.imgsz,
            names.len()
        );

        Ok(Self {
            session,
            input_name,
            width: config.imgsz,
            height: config.imgsz,
            conf: config.conf,
            iou: config.iou,
            names,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn run(&mut self, image: &RgbImage) -> Result<Vec<BBox>> {
        let (input, ratio) = letterbox(image, self.width, self.height);
        let shape = [1usize, 3, self.height as usize, self.width as usize];
        let value = ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => value])?;
        let (out_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: Vec<usize> = out_shape.iter().map(|&d| d.max(0) as usize).collect();

        let mut boxes = decode_predictions(
            data,
            &dims,
            self.conf,
            ratio,
            image.width(),
            image.height(),
        )?;
        non_max_suppression(&mut boxes, self.iou);
        debug!("检测到 {} 个目标", boxes.len());
        Ok(boxes)
    }
}

#[cfg(feature = "cuda")]
fn with_cuda(
    builder: ort::session::builder::SessionBuilder,
) -> Result<ort::session::builder::SessionBuilder> {
    use ort::execution_providers::CUDAExecutionProvider;
    info!("🚀 启用 CUDA 执行提供者");
    Ok(builder.with_execution_providers([CUDAExecutionProvider::default()
        .with_device_id(0)
        .build()])?)
}

#[cfg(not(feature = "cuda"))]
fn with_cuda(
    builder: ort::session::builder::SessionBuilder,
) -> Result<ort::session::builder::SessionBuilder> {
    warn!("⚠️ 未启用 cuda 特性,使用 CPU 推理");
    Ok(builder)
}

impl Model for YOLOv8 {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BBox>> {
        self.run(image)
    }

    fn names(&self) -> &[String] {
        &self.names
    }
}

/// 解析元数据里的 `{0: 'person', 1: 'bicycle'}`
pub fn parse_names(raw: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#) else {
        return Vec::new();
    };
    let mut pairs: Vec<(usize, String)> = re
        .captures_iter(raw)
        .filter_map(|cap| Some((cap[1].parse().ok()?, cap[2].to_string())))
        .collect();
    pairs.sort_by_key(|(id, _)| *id);
    pairs.into_iter().map(|(_, name)| name).collect()
}

/// 等比缩放到左上角,其余填充灰色
///
/// 返回 NCHW(N=1) 的归一化数据和缩放比例。
pub fn letterbox(image: &RgbImage, width: u32, height: u32) -> (Vec<f32>, f32) {
    let (w0, h0) = image.dimensions();
    let ratio = (width as f32 / w0 as f32).min(height as f32 / h0 as f32);
    let w_new = ((w0 as f32 * ratio).round() as u32).clamp(1, width);
    let h_new = ((h0 as f32 * ratio).round() as u32).clamp(1, height);
    let resized = image::imageops::resize(image, w_new, h_new, FilterType::Triangle);

    let mut tensor = Array::from_elem((3, height as usize, width as usize), PAD_VALUE);
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[c, y as usize, x as usize]] = pixel.0[c] as f32 / 255.0;
        }
    }
    (tensor.into_raw_vec_and_offset().0, ratio)
}

/// 解码 `[1, 4+nc, N]` 输出: 取最大类别分,过滤低分,还原到原图坐标
pub fn decode_predictions(
    data: &[f32],
    shape: &[usize],
    conf_threshold: f32,
    ratio: f32,
    width: u32,
    height: u32,
) -> Result<Vec<BBox>> {
    let &[batch, rows, anchors] = shape else {
        bail!("unexpected output shape {:?}", shape);
    };
    if batch != 1 || rows <= CXYWH_OFFSET {
        bail!("unexpected output shape {:?}", shape);
    }
    let preds = ArrayView2::from_shape((rows, anchors), data)?;

    let (w, h) = (width as f32, height as f32);
    let mut boxes = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let Some((class_id, &confidence)) = pred
            .iter()
            .skip(CXYWH_OFFSET)
            .enumerate()
            .reduce(|best, x| if x.1 > best.1 { x } else { best })
        else {
            continue;
        };
        if confidence < conf_threshold {
            continue;
        }

        let cx = pred[0] / ratio;
        let cy = pred[1] / ratio;
        let bw = pred[2] / ratio;
        let bh = pred[3] / ratio;
        let mut bbox = BBox::new(
            cx - bw / 2.0,
            cy - bh / 2.0,
            cx + bw / 2.0,
            cy + bh / 2.0,
            confidence,
            class_id,
        );
        bbox.clamp_to(width, height);
        if bbox.x2 > bbox.x1 && bbox.y2 > bbox.y1 && bbox.x1 < w && bbox.y1 < h {
            boxes.push(bbox);
        }
    }
    Ok(boxes)
}

/// 以 ONNX Runtime 加载 YOLOv8
#[derive(Debug, Clone, Default)]
pub struct OrtLoader {
    pub config: YOLOv8Config,
}

impl OrtLoader {
    pub fn new(config: YOLOv8Config) -> Self {
        Self { config }
    }
}

impl ModelLoader for OrtLoader {
    type Model = YOLOv8;

    fn load(&self, path: &Path) -> crate::Result<YOLOv8> {
        YOLOv8::new(path, &self.config)
            .map_err(|e| Error::configuration(format!("Failed to load model: {e:#}")))
    }
}
