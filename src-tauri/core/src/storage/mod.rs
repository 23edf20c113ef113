//! 远端文件存储服务抽象。
//!
//! 客户端只依赖 [StorageBackend]；HTTP 实现见 [http::HttpStorage]。

pub mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::image_ref::ImageReference;
use crate::upload::{ProgressTracker, SelectedFile};

pub use http::HttpStorage;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// 读取服务端的有序图片引用列表。
    async fn list_images(&self) -> Result<Vec<ImageReference>>;

    /// 以单个 multipart 请求上传文件；发送请求体时通过 `progress` 上报进度。
    /// 返回服务端在响应中给出的引用（若有）。
    async fn upload_image(
        &self,
        file: &SelectedFile,
        progress: ProgressTracker,
    ) -> Result<Option<ImageReference>>;

    /// 按存储键（引用的最后一个路径段）删除。
    async fn delete_image(&self, storage_key: &str) -> Result<()>;
}
