//! 画廊客户端配置。构造时注入，库内不读取任何全局状态或环境变量。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{GalleryError, Result};

const DEFAULT_API_BASE: &str = "http://localhost:8000";

/// 服务端单文件大小上限：5 MB
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GalleryConfig {
    /// 存储服务地址，`/api/...` 端点拼接在其路径之后
    pub api_base: Url,
    /// 单次请求总超时；为空表示不设超时
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// 上传请求体按此大小分块流式发送，每块发送后上报一次进度
    pub upload_chunk_size: usize,
    /// 超过该大小的文件在发请求前直接拒绝
    pub max_upload_bytes: u64,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse(DEFAULT_API_BASE).expect("default api base is a valid url"),
            request_timeout_secs: None,
            connect_timeout_secs: 10,
            user_agent: format!("gallery-client/{}", env!("CARGO_PKG_VERSION")),
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl GalleryConfig {
    /// 从 JSON 文件加载，缺省字段使用默认值。
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GalleryError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            GalleryError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_api_base(mut self, api_base: &str) -> Result<Self> {
        self.api_base = Url::parse(api_base.trim())
            .map_err(|e| GalleryError::Config(format!("Invalid api base {api_base}: {e}")))?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        match self.api_base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(GalleryError::Config(format!(
                    "Unsupported api base scheme: {other}"
                )))
            }
        }
        if self.api_base.cannot_be_a_base() {
            return Err(GalleryError::Config(format!(
                "Api base cannot be a base url: {}",
                self.api_base
            )));
        }
        if self.upload_chunk_size == 0 {
            return Err(GalleryError::Config(
                "uploadChunkSize must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// 在 `api_base` 路径之后追加路径段（每段单独做百分号编码）。
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                GalleryError::Config(format!(
                    "Api base cannot be a base url: {}",
                    self.api_base
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
