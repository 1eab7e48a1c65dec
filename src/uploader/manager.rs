// 批量上传管理器
//
// 并发策略：
// - 每个输入文件一个 tokio 任务，JoinSet 统一回收
// - Semaphore 控制同时进行网络 I/O 的任务数，许可随 guard 释放（含 panic 路径）
// - 任务返回 (index, result)，按原始输入位置写回结果槽位，与完成顺序无关
// - 完成计数只在回收循环中递增，进度事件按 1..=total 的顺序发送

use crate::uploader::engine::UploadEngine;
use crate::uploader::summary::BatchSummary;
use crate::uploader::task::{base_name, ProgressEvent, UploadJob, UploadResult};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// 默认最大并发上传数
pub const DEFAULT_MAX_WORKERS: usize = 20;

/// 批量上传管理器
pub struct UploadManager {
    engine: Arc<UploadEngine>,
    max_workers: usize,
    progress_tx: Option<UnboundedSender<ProgressEvent>>,
}

impl UploadManager {
    pub fn new(engine: Arc<UploadEngine>, max_workers: usize) -> Self {
        Self {
            engine,
            max_workers: max_workers.max(1),
            progress_tx: None,
        }
    }

    /// 设置进度事件通道
    pub fn with_progress(mut self, progress_tx: UnboundedSender<ProgressEvent>) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    /// 上传全部文件
    ///
    /// 返回的结果与 `file_paths` 等长且同序；单个文件的失败不会中断批次
    pub async fn upload_all<P: AsRef<Path>>(&self, file_paths: &[P]) -> Vec<UploadResult> {
        let total = file_paths.len();
        let started_at = Instant::now();

        info!(
            "开始批量上传: {} 个文件, 最大并发数: {}",
            total, self.max_workers
        );

        // 信号量控制并发数
        let semaphore = Arc::new(Semaphore::new(self.max_workers));

        let mut join_set: JoinSet<(usize, UploadResult)> = JoinSet::new();

        for (index, path) in file_paths.iter().enumerate() {
            let job = UploadJob::new(index, path.as_ref());
            let engine = self.engine.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let result = run_job(&job, &engine, semaphore).await;
                (job.index, result)
            });
        }

        // 结果槽位，按输入位置写入
        let mut slots: Vec<Option<UploadResult>> = vec![None; total];
        // 完成计数（仅本批次，由回收循环独占）
        let mut completed = 0;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    completed += 1;
                    self.report_progress(ProgressEvent {
                        completed,
                        total,
                        index,
                        name: result.name.clone(),
                        success: result.is_success(),
                    });
                    slots[index] = Some(result);
                }
                Err(e) => error!("上传任务异常退出: {}", e),
            }
        }

        let results: Vec<UploadResult> = slots
            .into_iter()
            .zip(file_paths)
            .map(|(slot, path)| slot.unwrap_or_else(|| UploadResult::failure(base_name(path.as_ref()))))
            .collect();

        let summary = BatchSummary::from_results(&results, started_at.elapsed());
        summary.log();

        results
    }

    /// 发送进度事件
    fn report_progress(&self, event: ProgressEvent) {
        debug!("上传进度: {} ({})", event.ratio(), event.name);
        if let Some(tx) = &self.progress_tx {
            // 接收端已关闭时忽略
            let _ = tx.send(event);
        }
    }
}

/// 执行单个任务：获取许可 → 上传 → 释放许可
///
/// 等待许可期间批次被取消，直接返回失败结果；上传过程中的 panic 被捕获并转为失败结果
async fn run_job(job: &UploadJob, engine: &UploadEngine, semaphore: Arc<Semaphore>) -> UploadResult {
    let name = job.file_name();

    let permit = tokio::select! {
        biased;
        _ = engine.cancel_token().cancelled() => {
            debug!("等待许可时批次已取消: {}", name);
            return UploadResult::failure(name);
        }
        permit = semaphore.acquire_owned() => permit,
    };
    let permit = match permit {
        Ok(p) => p,
        Err(e) => {
            error!("获取上传许可失败: {}, 错误: {}", name, e);
            return UploadResult::failure(name);
        }
    };

    let outcome = AssertUnwindSafe(engine.upload(&job.file_path))
        .catch_unwind()
        .await;

    drop(permit);

    match outcome {
        Ok(result) => result,
        Err(_) => {
            error!("上传任务 panic: #{} {}", job.index, name);
            UploadResult::failure(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::uploader::error::UploadError;
    use crate::uploader::transport::{UploadRequest, UploadTransport};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    /// 记录同时在途请求数的替身传输
    ///
    /// 文件名含 "fail" 的请求始终失败，含 "panic" 的请求直接 panic；
    /// 延迟取自文件名中的数字（毫秒）
    #[derive(Default)]
    struct CountingTransport {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    fn delay_of(name: &str) -> Duration {
        let digits: String = name.chars().filter(|c| c.is_ascii_digit()).collect();
        Duration::from_millis(digits.parse().unwrap_or(10))
    }

    #[async_trait]
    impl UploadTransport for CountingTransport {
        async fn post_file(&self, request: &UploadRequest<'_>) -> Result<String, UploadError> {
            let name = base_name(request.path);
            if name.contains("panic") {
                panic!("transport exploded on {}", name);
            }

            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(delay_of(&name)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if name.contains("fail") {
                return Err(UploadError::Status {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: String::new(),
                });
            }
            Ok(format!(r#"{{"sha1":"sha1-{}"}}"#, name))
        }
    }

    fn manager(transport: Arc<CountingTransport>, max_workers: usize) -> UploadManager {
        let config = UploadConfig {
            max_attempts: 3,
            ..UploadConfig::default()
        };
        let engine = UploadEngine::new(transport, "http://localhost/upload", "key", &config);
        UploadManager::new(Arc::new(engine), max_workers)
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_input_order() {
        let transport = Arc::new(CountingTransport::default());
        let manager = manager(transport, 4);

        // 越靠前的文件越晚完成
        let paths: Vec<String> = (0..8).map(|i| format!("/in/f{}.jpg", 800 - i * 100)).collect();
        let results = manager.upload_all(&paths).await;

        assert_eq!(results.len(), paths.len());
        for (result, path) in results.iter().zip(&paths) {
            assert_eq!(result.name, base_name(Path::new(path)));
            assert!(result.is_success());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_workers() {
        let transport = Arc::new(CountingTransport::default());
        let manager = manager(transport.clone(), 3);

        let paths: Vec<String> = (0..12).map(|i| format!("/in/file_{}.jpg", 50 + i)).collect();
        let results = manager.upload_all(&paths).await;

        assert_eq!(results.len(), 12);
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_file_keeps_position() {
        let transport = Arc::new(CountingTransport::default());
        let manager = manager(transport.clone(), 20);

        let paths = ["/a.jpg", "/b_fail.jpg", "/c.jpg"];
        let results = manager.upload_all(&paths).await;

        assert_eq!(results[0].identifier("sha1"), Some("sha1-a.jpg"));
        assert_eq!(results[1], UploadResult::failure("b_fail.jpg"));
        assert_eq!(results[2].identifier("sha1"), Some("sha1-c.jpg"));
        // a + c 各 1 次，b 3 次
        assert_eq!(transport.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_event_per_job() {
        let transport = Arc::new(CountingTransport::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let manager = manager(transport, 2).with_progress(tx);

        let paths = ["/x1.jpg", "/x2_fail.jpg", "/x3.jpg", "/x4.jpg"];
        manager.upload_all(&paths).await;
        drop(manager);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 4);
        let completed: Vec<usize> = events.iter().map(|e| e.completed).collect();
        assert_eq!(completed, vec![1, 2, 3, 4]);
        assert!(events.iter().all(|e| e.total == 4));
        let indexes: HashSet<usize> = events.iter().map(|e| e.index).collect();
        assert_eq!(indexes.len(), 4);
        let failed: Vec<&ProgressEvent> = events.iter().filter(|e| !e.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].index, 1);
    }

    /// 立即成功的替身传输
    struct InstantTransport;

    #[async_trait]
    impl UploadTransport for InstantTransport {
        async fn post_file(&self, _request: &UploadRequest<'_>) -> Result<String, UploadError> {
            Ok(r#"{"sha1":"x"}"#.to_string())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_progress_in_order_on_multi_thread_runtime() {
        let config = UploadConfig::default();
        let paths: Vec<String> = (0..200).map(|i| format!("/m/f{}.jpg", i)).collect();

        for _ in 0..50 {
            let engine =
                UploadEngine::new(Arc::new(InstantTransport), "http://localhost/upload", "key", &config);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let manager = UploadManager::new(Arc::new(engine), 20).with_progress(tx);

            manager.upload_all(&paths).await;
            drop(manager);

            let mut completed = Vec::with_capacity(paths.len());
            while let Some(event) = rx.recv().await {
                completed.push(event.completed);
            }
            let expected: Vec<usize> = (1..=paths.len()).collect();
            assert_eq!(completed, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_isolated() {
        let transport = Arc::new(CountingTransport::default());
        let manager = manager(transport.clone(), 1);

        let paths = ["/ok1.jpg", "/panic.jpg", "/ok2.jpg"];
        let results = manager.upload_all(&paths).await;

        assert!(results[0].is_success());
        assert_eq!(results[1], UploadResult::failure("panic.jpg"));
        // 单许可下 panic 后许可仍被释放
        assert!(results[2].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_batch_still_full_length() {
        let transport = Arc::new(CountingTransport::default());
        let config = UploadConfig::default();
        let token = CancellationToken::new();
        token.cancel();
        let engine = UploadEngine::new(transport.clone(), "http://localhost/upload", "key", &config)
            .with_cancel_token(token);
        let manager = UploadManager::new(Arc::new(engine), 2);

        let paths = ["/a.jpg", "/b.jpg", "/c.jpg"];
        let results = manager.upload_all(&paths).await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.is_success()));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let transport = Arc::new(CountingTransport::default());
        let manager = manager(transport, 4);
        let paths: Vec<String> = Vec::new();
        assert!(manager.upload_all(&paths).await.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_order_independent_of_completion(
            delays in proptest::collection::vec(1u64..500, 0..30),
            workers in 1usize..6,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();

            let paths: Vec<String> = delays
                .iter()
                .enumerate()
                .map(|(i, d)| format!("/p/n{}_{}.bin", i, d))
                .collect();

            let results = runtime.block_on(async {
                let transport = Arc::new(CountingTransport::default());
                manager(transport, workers).upload_all(&paths).await
            });

            prop_assert_eq!(results.len(), paths.len());
            for (result, path) in results.iter().zip(&paths) {
                prop_assert_eq!(&result.name, &base_name(Path::new(path)));
            }
        }
    }
}
