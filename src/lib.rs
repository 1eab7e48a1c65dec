// Batch Uploader Library
// 有界并发批量文件上传核心库

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 上传模块
pub mod uploader;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

// 导出常用类型
pub use config::{AppConfig, LogConfig, UploadConfig};
pub use uploader::{
    serialize_results, BatchSummary, HttpTransport, ProgressEvent, UploadEngine, UploadError,
    UploadManager, UploadResult, UploadTransport,
};

/// 批量上传入口（默认配置）
///
/// 返回 UTF-8 JSON 数组，元素顺序与 `file_paths` 一致
pub async fn upload_files<P: AsRef<Path>>(
    endpoint: &str,
    api_key: &str,
    file_paths: &[P],
) -> Result<Vec<u8>> {
    upload_files_with_config(
        &UploadConfig::default(),
        endpoint,
        api_key,
        file_paths,
        None,
        CancellationToken::new(),
    )
    .await
}

/// 批量上传入口（指定配置、进度通道与取消令牌）
///
/// 只有 HTTP 客户端构造失败或配置无效时返回错误；单个文件的失败体现在结果中
pub async fn upload_files_with_config<P: AsRef<Path>>(
    config: &UploadConfig,
    endpoint: &str,
    api_key: &str,
    file_paths: &[P],
    progress_tx: Option<UnboundedSender<ProgressEvent>>,
    cancel_token: CancellationToken,
) -> Result<Vec<u8>> {
    config.validate()?;
    let transport = Arc::new(HttpTransport::new(config)?);
    let results = upload_with_transport(
        transport,
        config,
        endpoint,
        api_key,
        file_paths,
        progress_tx,
        cancel_token,
    )
    .await;
    Ok(serialize_results(&results))
}

/// 使用指定传输层上传，返回有序结果集合
pub async fn upload_with_transport<P: AsRef<Path>>(
    transport: Arc<dyn UploadTransport>,
    config: &UploadConfig,
    endpoint: &str,
    api_key: &str,
    file_paths: &[P],
    progress_tx: Option<UnboundedSender<ProgressEvent>>,
    cancel_token: CancellationToken,
) -> Vec<UploadResult> {
    let engine = UploadEngine::new(transport, endpoint, api_key, config)
        .with_cancel_token(cancel_token);
    let mut manager = UploadManager::new(Arc::new(engine), config.max_workers);
    if let Some(tx) = progress_tx {
        manager = manager.with_progress(tx);
    }
    manager.upload_all(file_paths).await
}
