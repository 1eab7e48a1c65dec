// 上传任务定义
//
// 一个输入路径对应一个 UploadJob，一个 UploadJob 对应且仅对应一个 UploadResult

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 结果中文件名字段的键
pub const NAME_KEY: &str = "name";

/// 上传任务
///
/// 创建后不可变，由处理它的任务独占
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    /// 在原始输入序列中的位置
    pub index: usize,
    /// 本地文件路径
    pub file_path: PathBuf,
}

impl UploadJob {
    pub fn new(index: usize, file_path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            file_path: file_path.into(),
        }
    }

    /// 文件基础名（用于 multipart 文件名与结果中的 name）
    pub fn file_name(&self) -> String {
        base_name(&self.file_path)
    }
}

/// 取路径的基础文件名
///
/// 没有文件名部分的路径（如 `/` 或 `..`）原样返回
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// 单个文件的上传结果
///
/// 序列化为扁平 JSON 对象：`name` 加上远端返回的全部字符串字段。
/// `identifiers` 为空即表示上传失败。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// 基础文件名
    pub name: String,
    /// 远端分配的标识字段（如 sha1）
    #[serde(flatten)]
    pub identifiers: BTreeMap<String, String>,
}

impl UploadResult {
    /// 成功结果
    ///
    /// 远端若也返回了 `name` 字段，以本地基础文件名为准
    pub fn success(name: impl Into<String>, mut identifiers: BTreeMap<String, String>) -> Self {
        identifiers.remove(NAME_KEY);
        Self {
            name: name.into(),
            identifiers,
        }
    }

    /// 失败结果（只有文件名）
    pub fn failure(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifiers: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        !self.identifiers.is_empty()
    }

    pub fn identifier(&self, key: &str) -> Option<&str> {
        self.identifiers.get(key).map(String::as_str)
    }
}

/// 上传进度事件
///
/// 每完成一个任务（无论成功失败）发送一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// 已完成任务数（单调递增，1..=total）
    pub completed: usize,
    /// 总任务数
    pub total: usize,
    /// 刚完成的任务在输入中的位置
    pub index: usize,
    /// 刚完成的文件名
    pub name: String,
    /// 是否上传成功
    pub success: bool,
}

impl ProgressEvent {
    /// 渲染为 "completed/total"
    pub fn ratio(&self) -> String {
        format!("{}/{}", self.completed, self.total)
    }
}
