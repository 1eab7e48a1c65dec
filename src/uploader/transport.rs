// 上传传输层
//
// UploadTransport 负责“发送一个文件、取回响应体”；重试、退避、结果解析由引擎负责。
// 生产实现基于 reqwest，测试中可替换为计数/失败替身。

use crate::config::UploadConfig;
use crate::uploader::error::UploadError;
use crate::uploader::multipart::{build_headers, MultipartEncoder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 单次上传请求
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    /// 上传端点 URL
    pub endpoint: &'a str,
    /// API key
    pub api_key: &'a str,
    /// 本地文件路径
    pub path: &'a Path,
}

/// 上传传输接口
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// 发送一次上传请求，返回成功响应的响应体
    ///
    /// 每次调用都重新打开文件；文件打不开时返回 `UploadError::FileOpen`
    async fn post_file(&self, request: &UploadRequest<'_>) -> Result<String, UploadError>;
}

/// 基于 reqwest 的 HTTP 传输
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    encoder: MultipartEncoder,
}

impl HttpTransport {
    /// 按配置创建 HTTP 客户端（带单请求超时）
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(
            client,
            MultipartEncoder::new(config.file_field.clone(), config.form_fields.clone()),
        ))
    }

    pub fn with_client(client: Client, encoder: MultipartEncoder) -> Self {
        Self { client, encoder }
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn post_file(&self, request: &UploadRequest<'_>) -> Result<String, UploadError> {
        let headers = build_headers(request.api_key)?;
        let encoded = self.encoder.encode(request.path).await?;

        debug!(
            "发送上传请求: endpoint={}, file={}, size={}, content_type={}",
            request.endpoint, encoded.file_name, encoded.file_size, encoded.content_type
        );

        let response = self
            .client
            .post(request.endpoint)
            .headers(headers)
            .multipart(encoded.form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        debug!(
            "上传响应: file={}, status={}, body_len={}",
            encoded.file_name,
            status,
            body.len()
        );

        if !status.is_success() {
            return Err(UploadError::Status { status, body });
        }

        Ok(body)
    }
}
