// 单文件上传引擎
//
// 负责一个文件的重试循环：
// 1. 每次尝试重新打开文件并编码 multipart 请求
// 2. 本地文件打不开立即失败，不重试
// 3. 可重试错误按 attempt × 步长 线性退避
// 4. 成功后解析响应体并注入 name 字段
// 5. 重试耗尽或取消时返回只有 name 的失败结果，从不向调用方返回错误

use crate::config::UploadConfig;
use crate::uploader::error::UploadError;
use crate::uploader::task::{base_name, UploadResult};
use crate::uploader::transport::{UploadRequest, UploadTransport};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =====================================================
// 重试配置
// =====================================================

/// 计算第 `attempt` 次失败后的退避延迟
///
/// # 延迟序列（步长 2s）
/// - attempt=1: 2s
/// - attempt=2: 4s
/// - attempt=9: 18s
fn calculate_backoff_delay(attempt: u32, step: Duration) -> Duration {
    step.saturating_mul(attempt)
}

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 退避步长
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_step: config.backoff_step(),
        }
    }

    /// 第 `attempt` 次失败后的等待时间；最后一次失败后不再等待
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| calculate_backoff_delay(attempt, self.backoff_step))
    }
}

// =====================================================
// 响应解析
// =====================================================

/// 解析上传成功响应
///
/// - 宽松模式：非 JSON 对象视为没有标识字段；对象中的非字符串字段被丢弃
/// - 严格模式：响应体必须是全部为字符串字段的 JSON 对象，否则返回可重试的格式错误
pub fn decode_response(body: &str, strict: bool) -> Result<BTreeMap<String, String>, UploadError> {
    if strict {
        return serde_json::from_str::<BTreeMap<String, String>>(body).map_err(|e| {
            debug!("响应体解析失败（严格模式）: {}", e);
            UploadError::MalformedResponse {
                body: body.to_string(),
            }
        });
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => Ok(object
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(s) => Some((key, s)),
                _ => None,
            })
            .collect()),
        Ok(_) | Err(_) => {
            warn!("上传响应不是 JSON 对象，按无标识字段处理: {:.200}", body);
            Ok(BTreeMap::new())
        }
    }
}

// =====================================================
// 上传引擎
// =====================================================

/// 单文件上传引擎
///
/// 多个并发任务共享同一个引擎
pub struct UploadEngine {
    transport: Arc<dyn UploadTransport>,
    endpoint: String,
    api_key: String,
    policy: RetryPolicy,
    strict_response: bool,
    cancel_token: CancellationToken,
}

impl UploadEngine {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            policy: RetryPolicy::from_config(config),
            strict_response: config.strict_response,
            cancel_token: CancellationToken::new(),
        }
    }

    /// 设置取消令牌（默认永不取消）
    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// 上传一个文件
    ///
    /// 所有失败都落为 `UploadResult::failure`
    pub async fn upload(&self, path: &Path) -> UploadResult {
        let name = base_name(path);
        let request = UploadRequest {
            endpoint: &self.endpoint,
            api_key: &self.api_key,
            path,
        };

        for attempt in 1..=self.policy.max_attempts {
            let outcome = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => Err(UploadError::Cancelled),
                outcome = self.attempt(&request) => outcome,
            };

            let e = match outcome {
                Ok(identifiers) => {
                    info!(
                        "✓ 上传成功: {} (第 {} 次尝试, {} 个标识字段)",
                        name,
                        attempt,
                        identifiers.len()
                    );
                    return UploadResult::success(name, identifiers);
                }
                Err(e) => e,
            };

            let kind = e.kind();
            if !kind.is_retriable() {
                error!("上传失败（不可重试）: {}, {:?}, 错误: {}", name, kind, e);
                return UploadResult::failure(name);
            }

            match self.policy.delay_after(attempt) {
                Some(delay) => {
                    warn!(
                        "上传失败，等待 {:?} 后重试 ({}/{}): {}, 错误: {}",
                        delay, attempt, self.policy.max_attempts, name, e
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel_token.cancelled() => {
                            warn!("退避等待期间批次被取消: {}", name);
                            return UploadResult::failure(name);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    error!(
                        "上传失败，已达最大尝试次数 ({}): {}, 最后错误: {}",
                        self.policy.max_attempts, name, e
                    );
                }
            }
        }

        UploadResult::failure(name)
    }

    /// 单次尝试：发送请求并解析响应
    async fn attempt(
        &self,
        request: &UploadRequest<'_>,
    ) -> Result<BTreeMap<String, String>, UploadError> {
        let body = self.transport.post_file(request).await?;
        decode_response(&body, self.strict_response)
    }
}
