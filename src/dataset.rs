// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 数据集结构检查

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::workspace::DATASET_SUBDIRS;

/// 数据集校验
pub trait DataValidator {
    /// 结构合法返回 true;不存在/不可读同样返回 false,不报错
    fn validate(&self, path: &Path) -> bool;
}

/// 要求目录直接包含 `images` 与 `labels` 两个条目
///
/// 只看名字,不检查内容,也不区分条目是文件还是目录。
#[derive(Debug, Clone, Default)]
pub struct DatasetValidator;

impl DataValidator for DatasetValidator {
    fn validate(&self, path: &Path) -> bool {
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("⚠️ 无法读取数据集目录 {}: {}", path.display(), e);
                return false;
            }
        };

        let names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        debug!("数据集 {} 条目: {:?}", path.display(), names);

        DATASET_SUBDIRS
            .iter()
            .all(|required| names.iter().any(|name| name == required))
    }
}
