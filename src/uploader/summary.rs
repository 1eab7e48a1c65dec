// 批次汇总与结果校验

use crate::uploader::task::{base_name, UploadResult};
use chrono::{DateTime, Local};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// 批次上传汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 失败文件名（按输入顺序）
    pub failed_names: Vec<String>,
    /// 批次完成时间
    pub finished_at: DateTime<Local>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn from_results(results: &[UploadResult], elapsed: Duration) -> Self {
        let failed_names: Vec<String> = results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.name.clone())
            .collect();

        Self {
            total: results.len(),
            succeeded: results.len() - failed_names.len(),
            failed: failed_names.len(),
            failed_names,
            finished_at: Local::now(),
            elapsed,
        }
    }

    /// 输出汇总日志
    pub fn log(&self) {
        info!(
            "批量上传完成: 共 {} 个, 成功 {}, 失败 {}, 耗时 {:.2}s, 完成于 {}",
            self.total,
            self.succeeded,
            self.failed,
            self.elapsed.as_secs_f64(),
            self.finished_at.format("%Y-%m-%d %H:%M:%S")
        );
        if !self.failed_names.is_empty() {
            warn!("上传失败的文件: {:?}", self.failed_names);
        }
    }
}

/// 校验结果顺序：`results[i].name` 必须等于 `paths[i]` 的基础文件名
pub fn verify_order<P: AsRef<Path>>(results: &[UploadResult], paths: &[P]) -> bool {
    results.len() == paths.len()
        && results
            .iter()
            .zip(paths)
            .all(|(result, path)| result.name == base_name(path.as_ref()))
}
