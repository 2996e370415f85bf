// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 模型仓库 - 本地路径直接加载,远程URL下载到缓存后加载
//!
//! 缓存目录是平铺的,文件名取URL路径的最后一段。文件存在即视为
//! 有效缓存,不做校验,也不重试。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{Error, Result};

/// 远程传输
pub trait Fetcher {
    /// 把 `url` 的内容写到 `dest`
    fn fetch(&self, url: &str, dest: &Path) -> anyhow::Result<()>;
}

/// 模型加载后端: 本地文件 → 模型句柄
pub trait ModelLoader {
    type Model;

    fn load(&self, path: &Path) -> Result<Self::Model>;
}

impl<F, M> ModelLoader for F
where
    F: Fn(&Path) -> Result<M>,
{
    type Model = M;

    fn load(&self, path: &Path) -> Result<M> {
        self(path)
    }
}

/// HTTP 下载 (ureq)
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher;

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        let partial = partial_path(dest);
        let result = (|| -> anyhow::Result<()> {
            let resp = ureq::get(url).call()?;
            let mut reader = resp.into_reader();
            let mut file = fs::File::create(&partial)?;
            let bytes = io::copy(&mut reader, &mut file)?;
            file.sync_all()?;
            fs::rename(&partial, dest)?;
            debug!("下载完成 {} 字节 → {}", bytes, dest.display());
            Ok(())
        })();
        if result.is_err() {
            let _ = fs::remove_file(&partial);
        }
        result
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// 是否为远程引用
pub fn is_remote(spec: &str) -> bool {
    spec.starts_with("http")
}

/// URL 最后一段路径 (去掉 query/fragment)
pub fn cache_file_name(url: &str) -> Option<&str> {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let name = url[..end].rsplit('/').next()?;
    if name.is_empty() || name.contains(':') || name == "." || name == ".." {
        return None;
    }
    Some(name)
}

pub struct ModelRepository<F = HttpFetcher> {
    cache_dir: PathBuf,
    fetcher: F,
}

impl ModelRepository<HttpFetcher> {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_fetcher(cache_dir, HttpFetcher)
    }

    /// `~/.cache/jetski-tracker/models` (各平台对应的缓存目录)
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("jetski-tracker")
            .join("models")
    }
}

impl<F: Fetcher> ModelRepository<F> {
    pub fn with_fetcher(cache_dir: impl Into<PathBuf>, fetcher: F) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir, fetcher })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// 模型引用 → 本地文件路径 (远程引用按需下载)
    pub fn resolve(&self, spec: &str) -> Result<PathBuf> {
        if !is_remote(spec) {
            return Ok(PathBuf::from(spec));
        }

        let name = cache_file_name(spec).ok_or_else(|| {
            Error::ModelDownload(format!("Failed to download model: no file name in {spec}"))
        })?;
        let model_path = self.cache_dir.join(name);
        if model_path.exists() {
            debug!("📦 使用缓存模型 {}", model_path.display());
        } else {
            self.download(spec, &model_path)?;
        }
        Ok(model_path)
    }

    pub fn load_model<L: ModelLoader>(&self, spec: &str, loader: &L) -> Result<L::Model> {
        let path = self.resolve(spec)?;
        info!("📦 加载模型: {}", path.display());
        loader.load(&path)
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!("⬇️  下载模型: {} → {}", url, dest.display());
        self.fetcher
            .fetch(url, dest)
            .map_err(|e| Error::ModelDownload(format!("Failed to download model: {e}")))
    }
}
