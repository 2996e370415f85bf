// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 运行配置 - YAML 键值表
//!
//! 配置是一个有序的 `键 → 标量/嵌套值` 映射。`ConfigManager` 负责
//! 合并更新与落盘;读取永远返回副本。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::info;

use crate::workspace::Workspace;
use crate::{Error, Result};

pub const BASE_MODEL: &str = "base_model";
pub const DATA_CONFIG: &str = "data_config";
pub const DATA_PATH: &str = "data_path";
pub const EPOCHS: &str = "epochs";
pub const IMGSZ: &str = "imgsz";
pub const BATCH: &str = "batch";
pub const NAME: &str = "name";
pub const PROJECT: &str = "project";
pub const TRACKER: &str = "tracker";
pub const INFERENCE_MODEL: &str = "inference_model";
pub const TRAINER_COMMAND: &str = "trainer_command";
pub const CONF: &str = "conf";
pub const IOU: &str = "iou";

pub const DEFAULT_BATCH: u64 = 8;
pub const DEFAULT_RUN_NAME: &str = "jetski_detection";

/// 配置表
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    values: Mapping,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mapping(values: Mapping) -> Self {
        Self { values }
    }

    /// 链式构造: `Config::new().with("epochs", 1)`
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(Value::from(key), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mapping(&self) -> &Mapping {
        &self.values
    }

    /// 浅合并: 顶层键后写覆盖,嵌套表整体替换
    pub fn merge(&mut self, patch: Config) {
        for (key, value) in patch.values {
            self.values.insert(key, value);
        }
    }

    pub fn require(&self, key: &str) -> Result<&Value> {
        self.get(key)
            .ok_or_else(|| Error::configuration(format!("missing key `{key}`")))
    }

    /// 存在且不为 `null`,类型不限
    pub fn require_present(&self, key: &str) -> Result<&Value> {
        match self.require(key)? {
            Value::Null => Err(Error::configuration(format!("`{key}` must not be null"))),
            value => Ok(value),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| Error::configuration(format!("`{key}` must be a string")))
    }

    pub fn require_u64(&self, key: &str) -> Result<u64> {
        self.require(key)?
            .as_u64()
            .ok_or_else(|| Error::configuration(format!("`{key}` must be a non-negative integer")))
    }

    /// 缺省时返回默认值;存在但类型不对仍然报错
    pub fn get_u64_or(&self, key: &str, default: u64) -> Result<u64> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(_) => self.require_u64(key),
        }
    }

    pub fn get_str_or(&self, key: &str, default: &str) -> Result<String> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(default.to_string()),
            Some(_) => self.require_str(key).map(str::to_string),
        }
    }

    pub fn get_f32_or(&self, key: &str, default: f32) -> Result<f32> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| Error::configuration(format!("`{key}` must be a number"))),
        }
    }

    /// 解析嵌套的 `tracker` 表
    pub fn tracker_options(&self) -> Result<TrackerOptions> {
        let value = self.require(TRACKER)?.clone();
        serde_yaml::from_value(value)
            .map_err(|e| Error::configuration(format!("invalid `{TRACKER}`: {e}")))
    }
}

/// 跟踪参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerOptions {
    /// 是否跨帧保持目标ID
    pub persist: bool,
    /// 只保留这些类别; `null`/缺省为全部类别,空列表为一个都不留
    pub classes: Option<Vec<usize>>,
}

impl TrackerOptions {
    pub fn allows(&self, class_id: usize) -> bool {
        self.classes
            .as_ref()
            .map_or(true, |classes| classes.contains(&class_id))
    }
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            persist: true,
            classes: Some(vec![0]),
        }
    }
}

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Config,
}

impl ConfigManager {
    pub fn new(base: Config) -> Self {
        Self { config: base }
    }

    /// 从YAML文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let values: Mapping = serde_yaml::from_str(&text).map_err(|e| {
            Error::configuration(format!("{} is not a YAML mapping: {e}", path.display()))
        })?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(Self::new(Config::from_mapping(values)))
    }

    pub fn update(&mut self, patch: Config) {
        self.config.merge(patch);
    }

    /// 保存完整配置到YAML文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_yaml::to_string(&self.config)
            .map_err(|e| Error::configuration(format!("serialize config: {e}")))?;
        fs::write(path, text)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 当前配置的副本
    pub fn config(&self) -> Config {
        self.config.clone()
    }
}

/// 启动默认配置
///
/// 除训练/跟踪参数外还带上 Ultralytics 数据文件需要的
/// `path/train/val/names`,保存到 `data_config` 后可直接用于训练。
pub fn default_config(workspace: &Workspace) -> Config {
    let dataset = workspace.dataset_dir();
    let mut tracker = Mapping::new();
    tracker.insert("persist".into(), true.into());
    tracker.insert("classes".into(), vec![0u64].into());
    let mut names = Mapping::new();
    names.insert(0u64.into(), "jetski".into());

    Config::new()
        .with(BASE_MODEL, "yolov8n.pt")
        .with(
            DATA_CONFIG,
            workspace.data_config_path().to_string_lossy().into_owned(),
        )
        .with(DATA_PATH, dataset.to_string_lossy().into_owned())
        .with(EPOCHS, 10u64)
        .with(IMGSZ, 640u64)
        .with(TRACKER, tracker)
        .with(INFERENCE_MODEL, "yolov8n.onnx")
        .with(PROJECT, workspace.runs_dir().to_string_lossy().into_owned())
        .with("path", dataset.to_string_lossy().into_owned())
        .with("train", "images")
        .with("val", "images")
        .with("names", names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        let mut tracker = Mapping::new();
        tracker.insert("persist".into(), true.into());
        tracker.insert("classes".into(), vec![0u64].into());
        Config::new()
            .with(BASE_MODEL, "yolov8n.pt")
            .with(DATA_CONFIG, "config.yaml")
            .with(DATA_PATH, "datasets")
            .with(EPOCHS, 1u64)
            .with(IMGSZ, 320u64)
            .with(TRACKER, tracker)
    }

    #[test]
    fn config_returns_copy() {
        let manager = ConfigManager::new(sample());
        let mut copy = manager.config();
        copy.insert("new_key", "value");
        copy.insert(EPOCHS, 99u64);
        assert!(!manager.config().contains_key("new_key"));
        assert_eq!(manager.config().require_u64(EPOCHS).unwrap(), 1);
    }

    #[test]
    fn update_is_shallow_last_write_wins() {
        let mut manager = ConfigManager::new(sample());
        let mut tracker = Mapping::new();
        tracker.insert("classes".into(), vec![3u64].into());
        manager.update(Config::new().with(EPOCHS, 5u64).with(TRACKER, tracker));
        manager.update(Config::new().with(EPOCHS, 7u64));

        let config = manager.config();
        assert_eq!(config.require_u64(EPOCHS).unwrap(), 7);
        // 嵌套表被整体替换, persist 不再存在
        let err = config.tracker_options().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(config.require_str(BASE_MODEL).unwrap(), "yolov8n.pt");
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let manager = ConfigManager::new(sample());
        manager.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("base_model: yolov8n.pt"));

        let loaded = ConfigManager::load(&path).unwrap();
        assert_eq!(loaded.config(), manager.config());
    }

    #[test]
    fn save_to_unwritable_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("config.yaml");
        let err = ConfigManager::new(sample()).save(&path).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn load_rejects_non_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.yaml");
        std::fs::write(&path, "- a\n- b\n").unwrap();
        let err = ConfigManager::load(&path).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn typed_accessors() {
        let config = sample().with(BATCH, "sixteen");
        assert_eq!(config.get_u64_or(NAME, 8).unwrap(), 8);
        assert!(config.get_u64_or(BATCH, 8).is_err());
        assert_eq!(
            config.get_str_or(NAME, DEFAULT_RUN_NAME).unwrap(),
            "jetski_detection"
        );
        let err = config.require_u64("missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(config.require_u64(BASE_MODEL).is_err());
    }

    #[test]
    fn tracker_options_parse() {
        let options = sample().tracker_options().unwrap();
        assert_eq!(options, TrackerOptions::default());
        assert!(options.allows(0));
        assert!(!options.allows(2));

        let none = TrackerOptions {
            persist: false,
            classes: Some(vec![]),
        };
        assert!(!none.allows(0));
        assert!(!none.allows(42));
    }

    #[test]
    fn null_classes_tracks_everything() {
        let mut tracker = Mapping::new();
        tracker.insert("persist".into(), true.into());
        tracker.insert("classes".into(), Value::Null);
        let options = sample().with(TRACKER, tracker).tracker_options().unwrap();
        assert_eq!(options.classes, None);
        assert!(options.allows(0));
        assert!(options.allows(7));

        let mut tracker = Mapping::new();
        tracker.insert("persist".into(), false.into());
        let options = sample().with(TRACKER, tracker).tracker_options().unwrap();
        assert_eq!(options.classes, None);
    }

    #[test]
    fn defaults_point_into_workspace() {
        let ws = Workspace::temporary().unwrap();
        let config = default_config(&ws);
        let data_path = config.require_str(DATA_PATH).unwrap();
        assert!(data_path.starts_with(ws.root().to_str().unwrap()));
        assert!(config.require_str(DATA_CONFIG).unwrap().ends_with("config.yaml"));
        assert_eq!(config.require_u64(EPOCHS).unwrap(), 10);
        assert_eq!(config.require_u64(IMGSZ).unwrap(), 640);
        assert!(!config.contains_key(BATCH));
        assert_eq!(config.tracker_options().unwrap(), TrackerOptions::default());
    }
}
