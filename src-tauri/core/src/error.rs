//! 画廊客户端错误类型。
//!
//! 所有错误最终都在调用处转换为一条面向用户的消息（[`GalleryError::user_message`]），
//! 不做区分展示，也不自动重试。

/// 触发错误的操作，用于选择兜底的通用提示语。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Upload,
    Delete,
}

impl Operation {
    /// 服务端没有给出 detail 时使用的通用提示。
    pub fn generic_message(self) -> &'static str {
        match self {
            Operation::List => "Failed to load the gallery.",
            Operation::Upload => "Failed to upload the file.",
            Operation::Delete => "Failed to delete the image.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    /// 网络/传输层失败（连接、超时、请求体流中断等）
    #[error("transport error: {0}")]
    Transport(String),

    /// 服务端返回非 2xx，`detail` 为响应体中的 `detail` 字段
    #[error("server returned {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Server { status: u16, detail: Option<String> },

    /// 响应体无法解析
    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("Please select a file to upload.")]
    NoFileSelected,

    #[error("Invalid image reference: {0}")]
    InvalidReference(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("File is too large ({size} bytes). Max size is {max_bytes} bytes.")]
    FileTooLarge { size: u64, max_bytes: u64 },

    #[error("An upload is already in progress.")]
    UploadInProgress,

    #[error("Upload canceled.")]
    Canceled,

    #[error("upload task failed: {0}")]
    TaskFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GalleryError>;

impl GalleryError {
    /// 校验类错误：这类错误在发出任何请求之前就已返回。
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GalleryError::NoFileSelected
                | GalleryError::InvalidReference(_)
                | GalleryError::UnsupportedFile(_)
                | GalleryError::FileTooLarge { .. }
                | GalleryError::UploadInProgress
        )
    }

    /// 转换为面向用户的提示：优先服务端 detail，其次校验消息，最后是操作的通用提示。
    pub fn user_message(&self, op: Operation) -> String {
        match self {
            GalleryError::Server {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => detail.clone(),
            GalleryError::Canceled => self.to_string(),
            e if e.is_validation() => e.to_string(),
            _ => op.generic_message().to_string(),
        }
    }
}

impl From<reqwest::Error> for GalleryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GalleryError::Decode(e.to_string())
        } else {
            GalleryError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_detail_wins() {
        let e = GalleryError::Server {
            status: 400,
            detail: Some("Uploaded file is not an image.".to_string()),
        };
        assert_eq!(
            e.user_message(Operation::Upload),
            "Uploaded file is not an image."
        );
    }

    #[test]
    fn test_generic_fallback() {
        let e = GalleryError::Server {
            status: 500,
            detail: None,
        };
        assert_eq!(e.user_message(Operation::Delete), "Failed to delete the image.");

        let e = GalleryError::Server {
            status: 500,
            detail: Some("   ".to_string()),
        };
        assert_eq!(e.user_message(Operation::List), "Failed to load the gallery.");

        let e = GalleryError::Transport("connection refused".to_string());
        assert_eq!(e.user_message(Operation::Upload), "Failed to upload the file.");
    }

    #[test]
    fn test_validation_message() {
        assert!(GalleryError::NoFileSelected.is_validation());
        assert!(!GalleryError::Canceled.is_validation());
        assert_eq!(
            GalleryError::NoFileSelected.user_message(Operation::Upload),
            "Please select a file to upload."
        );
    }
}
