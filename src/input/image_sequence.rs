// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 图片序列输入: 目录中的图片按文件名排序逐帧读取

use std::cmp::Ordering;
use std::fs;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use tracing::{debug, info};

use super::VideoCapture;

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 取下一段连续数字或连续非数字
fn next_run(chars: &mut Peekable<Chars<'_>>) -> Option<(bool, String)> {
    let digit = chars.peek()?.is_ascii_digit();
    let mut run = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() != digit {
            break;
        }
        run.push(c);
        chars.next();
    }
    Some((digit, run))
}

/// 自然序: `frame_2` 排在 `frame_10` 前面
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut ra, mut rb) = (a.chars().peekable(), b.chars().peekable());
    loop {
        let ord = match (next_run(&mut ra), next_run(&mut rb)) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((true, x)), Some((true, y))) => {
                // 按数值比较,不经过整数解析,长数字串也不会溢出
                let (x, y) = (x.trim_start_matches('0'), y.trim_start_matches('0'));
                x.len().cmp(&y.len()).then_with(|| x.cmp(y))
            }
            (Some((_, x)), Some((_, y))) => x.to_lowercase().cmp(&y.to_lowercase()),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

pub struct ImageSequenceCapture {
    frames: Vec<PathBuf>,
    next: usize,
    released: bool,
}

impl ImageSequenceCapture {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut frames: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("cannot read {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        if frames.is_empty() {
            bail!("no image frames in {}", dir.display());
        }
        frames.sort_by(|a, b| {
            let name = |p: &PathBuf| p.file_name().map(|n| n.to_string_lossy().into_owned());
            natural_cmp(&name(a).unwrap_or_default(), &name(b).unwrap_or_default())
        });
        info!("🎞️ 图片序列: {} 帧 ({})", frames.len(), dir.display());
        Ok(Self {
            frames,
            next: 0,
            released: false,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl VideoCapture for ImageSequenceCapture {
    fn read(&mut self) -> Result<Option<RgbImage>> {
        if self.released {
            bail!("capture already released");
        }
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        let frame = image::open(path)
            .with_context(|| format!("cannot decode {}", path.display()))?
            .to_rgb8();
        debug!("读取帧 {}", path.display());
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.released = true;
    }
}
