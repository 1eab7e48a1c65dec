// 宿主调用适配层
//
// 用法: UPLOADER_ENDPOINT=<url> UPLOADER_API_KEY=<key> batch-uploader <file>...
// 结果 JSON 输出到 stdout，日志与进度输出到 stderr

use anyhow::{Context, Result};
use batch_uploader::{config::DEFAULT_CONFIG_PATH, logging, AppConfig, ProgressEvent};
use std::io::Write;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 渲染覆盖式进度行
async fn render_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    let mut rendered = false;
    while let Some(event) = rx.recv().await {
        eprint!("\r上传进度: {}", event.ratio());
        rendered = true;
    }
    if rendered {
        eprintln!();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        std::env::var("UPLOADER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load_or_default(&config_path).await;

    // 必须保持 _log_guard 存活
    let _log_guard = logging::init_logging(&config.log);

    let endpoint = std::env::var("UPLOADER_ENDPOINT").context("缺少环境变量 UPLOADER_ENDPOINT")?;
    let api_key = std::env::var("UPLOADER_API_KEY").context("缺少环境变量 UPLOADER_API_KEY")?;
    let file_paths: Vec<String> = std::env::args().skip(1).collect();

    info!("Batch Uploader v{} 启动, {} 个文件", env!("CARGO_PKG_VERSION"), file_paths.len());

    // Ctrl-C 取消批次，已开始的任务以失败结果结束
    let cancel_token = CancellationToken::new();
    {
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("收到中断信号，取消剩余上传");
                cancel_token.cancel();
            }
        });
    }

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(render_progress(progress_rx));

    let output = batch_uploader::upload_files_with_config(
        &config.upload,
        &endpoint,
        &api_key,
        &file_paths,
        Some(progress_tx),
        cancel_token,
    )
    .await?;

    // 发送端已随上传管理器释放，等待进度行收尾
    let _ = renderer.await;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&output).context("写出结果失败")?;
    stdout.write_all(b"\n")?;
    Ok(())
}
