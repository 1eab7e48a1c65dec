// 批量上传模块
//
// - task: 任务、结果、进度事件
// - error: 错误分类（决定是否重试）
// - multipart: multipart/form-data 编码
// - transport: 传输接口与 reqwest 实现
// - engine: 单文件重试循环（线性退避）
// - manager: 有界并发调度与有序结果回收
// - serializer / summary: 结果输出与批次汇总

pub mod engine;
pub mod error;
pub mod manager;
pub mod multipart;
pub mod serializer;
pub mod summary;
pub mod task;
pub mod transport;

pub use engine::{decode_response, RetryPolicy, UploadEngine};
pub use error::{UploadError, UploadErrorKind};
pub use manager::{UploadManager, DEFAULT_MAX_WORKERS};
pub use multipart::{build_headers, EncodedUpload, MultipartEncoder};
pub use serializer::{deserialize_results, serialize_results};
pub use summary::{verify_order, BatchSummary};
pub use task::{base_name, ProgressEvent, UploadJob, UploadResult};
pub use transport::{HttpTransport, UploadRequest, UploadTransport};
