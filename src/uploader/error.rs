// 上传错误定义与分类

use std::path::PathBuf;
use thiserror::Error;

/// 单次上传尝试的错误
#[derive(Debug, Error)]
pub enum UploadError {
    /// 本地文件无法打开（不可重试）
    #[error("无法打开文件 {path:?}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 传输层错误（连接失败、超时、读取响应失败等）
    #[error("请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    /// 服务端返回非成功状态码
    #[error("服务端返回 {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// 响应体不是字符串字段组成的 JSON 对象（仅严格模式下产生）
    #[error("响应格式错误: {body}")]
    MalformedResponse { body: String },

    /// 请求头构造失败（如 API key 含非法字符）
    #[error("无效的请求头: {0}")]
    InvalidHeader(String),

    /// 批次已取消
    #[error("上传已取消")]
    Cancelled,
}

/// 上传错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorKind {
    /// 本地文件不存在或无法读取（不可重试）
    FileNotFound,
    /// 网络错误（可重试）
    Network,
    /// 超时（可重试）
    Timeout,
    /// 服务器错误（可重试）
    ServerError,
    /// 限流（可重试）
    RateLimited,
    /// 客户端错误，如 401/403/404（可重试）
    ClientError,
    /// 请求无法构造（不可重试）
    InvalidRequest,
    /// 响应格式错误（可重试）
    MalformedResponse,
    /// 已取消（不可重试）
    Cancelled,
}

impl UploadErrorKind {
    /// 是否可重试
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            UploadErrorKind::Network
                | UploadErrorKind::Timeout
                | UploadErrorKind::ServerError
                | UploadErrorKind::RateLimited
                | UploadErrorKind::ClientError
                | UploadErrorKind::MalformedResponse
        )
    }
}

impl UploadError {
    /// 错误分类
    pub fn kind(&self) -> UploadErrorKind {
        match self {
            UploadError::FileOpen { .. } => UploadErrorKind::FileNotFound,
            UploadError::Transport(e) if e.is_timeout() => UploadErrorKind::Timeout,
            UploadError::Transport(_) => UploadErrorKind::Network,
            UploadError::Status { status, .. } => classify_status(*status),
            UploadError::MalformedResponse { .. } => UploadErrorKind::MalformedResponse,
            UploadError::InvalidHeader(_) => UploadErrorKind::InvalidRequest,
            UploadError::Cancelled => UploadErrorKind::Cancelled,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind().is_retriable()
    }
}

/// 按 HTTP 状态码分类
fn classify_status(status: reqwest::StatusCode) -> UploadErrorKind {
    match status.as_u16() {
        408 => UploadErrorKind::Timeout,
        429 => UploadErrorKind::RateLimited,
        400..=499 => UploadErrorKind::ClientError,
        _ => UploadErrorKind::ServerError,
    }
}
