// Multipart 编码器
//
// 把一个本地文件和附加表单字段编码为 multipart/form-data 请求体。
// 文件内容以流的方式写入请求体，不整体读入内存。

use crate::uploader::error::UploadError;
use crate::uploader::task::base_name;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::io::ReaderStream;

/// 默认文件字段名
pub const DEFAULT_FILE_FIELD: &str = "file";

/// API key 请求头
pub const API_KEY_HEADER: &str = "x-api-key";

/// 编码结果
pub struct EncodedUpload {
    /// multipart 表单（请求体）
    pub form: Form,
    /// 带 boundary 的 Content-Type
    pub content_type: String,
    /// 文件部分使用的文件名
    pub file_name: String,
    /// 文件大小（字节）
    pub file_size: u64,
}

/// Multipart 编码器
#[derive(Debug, Clone)]
pub struct MultipartEncoder {
    file_field: String,
    form_fields: BTreeMap<String, String>,
}

impl Default for MultipartEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_FIELD, BTreeMap::new())
    }
}

impl MultipartEncoder {
    pub fn new(file_field: impl Into<String>, form_fields: BTreeMap<String, String>) -> Self {
        Self {
            file_field: file_field.into(),
            form_fields,
        }
    }

    /// 编码一个文件
    ///
    /// 文件打不开时返回 `UploadError::FileOpen`，与网络错误区分
    pub async fn encode(&self, path: &Path) -> Result<EncodedUpload, UploadError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| UploadError::FileOpen {
                path: path.to_path_buf(),
                source,
            })?;
        let file_size = file
            .metadata()
            .await
            .map_err(|source| UploadError::FileOpen {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let file_name = base_name(path);
        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, file_size)
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")?;

        let mut form = Form::new().part(self.file_field.clone(), part);
        for (key, value) in &self.form_fields {
            form = form.text(key.clone(), value.clone());
        }

        let content_type = format!("multipart/form-data; boundary={}", form.boundary());

        Ok(EncodedUpload {
            form,
            content_type,
            file_name,
            file_size,
        })
    }
}

/// 构造上传请求头（Content-Type 由 multipart 表单自带）
pub fn build_headers(api_key: &str) -> Result<HeaderMap, UploadError> {
    let mut headers = HeaderMap::new();
    let key = HeaderValue::from_str(api_key)
        .map_err(|e| UploadError::InvalidHeader(format!("{}: {}", API_KEY_HEADER, e)))?;
    headers.insert(HeaderName::from_static(API_KEY_HEADER), key);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Ok(headers)
}
