pub mod backend;
pub mod http;
pub mod local;
pub mod memory;
pub mod retry;
pub mod s3;

pub use backend::{Backend, BackendType};
pub use http::HttpBackend;
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use retry::{retry_with_backoff, RetryConfig, Retryable};
pub use s3::S3Backend;
