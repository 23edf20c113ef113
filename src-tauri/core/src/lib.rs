//! 画廊客户端核心库：图片列表、带进度的上传、按引用删除，以及写后重新同步。

pub mod config;
pub mod error;
pub mod events;
pub mod gallery;
pub mod image_ref;
pub mod image_type;
pub mod storage;
pub mod upload;

pub use config::GalleryConfig;
pub use error::{GalleryError, Operation, Result};
pub use events::{EventBroadcaster, GalleryEvent, GalleryEventKind};
pub use gallery::GalleryClient;
pub use image_ref::ImageReference;
pub use storage::{HttpStorage, StorageBackend};
pub use upload::{SelectedFile, UploadHandle, UploadOutcome, UploadProgress, UploadState};
