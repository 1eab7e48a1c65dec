// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/uploader.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 最大同时上传文件数（并发许可数）
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// 单个文件最大尝试次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 退避步长（秒），第 n 次失败后等待 n × 步长
    #[serde(default = "default_backoff_step_secs")]
    pub backoff_step_secs: u64,
    /// 单个请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 连接超时（秒）
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// multipart 中文件部分的字段名
    #[serde(default = "default_file_field")]
    pub file_field: String,
    /// 严格模式：响应体不是字符串字段 JSON 对象时按失败重试
    #[serde(default)]
    pub strict_response: bool,
    /// 随文件一起提交的附加表单字段
    #[serde(default)]
    pub form_fields: BTreeMap<String, String>,
}

fn default_max_workers() -> usize {
    20
}

fn default_max_attempts() -> u32 {
    10
}

fn default_backoff_step_secs() -> u64 {
    2
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_file_field() -> String {
    "file".to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_attempts: default_max_attempts(),
            backoff_step_secs: default_backoff_step_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            file_field: default_file_field(),
            strict_response: false,
            form_fields: BTreeMap::new(),
        }
    }
}

impl UploadConfig {
    pub fn backoff_step(&self) -> Duration {
        Duration::from_secs(self.backoff_step_secs)
    }

    /// 校验上传参数
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            anyhow::bail!("max_workers 必须大于 0");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts 必须大于 0");
        }
        if self.file_field.trim().is_empty() {
            anyhow::bail!("file_field 不能为空");
        }
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别（默认 info，RUST_LOG 优先）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 是否同时写入日志文件
    #[serde(default)]
    pub file_enabled: bool,
    /// 日志文件目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_enabled: false,
            log_dir: default_log_dir(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .upload
            .validate()
            .context("配置文件中的上传参数验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.upload.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("配置已保存: {}", path);
        Ok(())
    }

    /// 加载配置，文件不存在或无效时使用默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                Self::default()
            }
        }
    }
}
