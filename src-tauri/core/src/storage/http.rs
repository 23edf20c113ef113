//! HTTP 存储服务实现：
//! - `GET  {base}/api/images`            → JSON 字符串数组
//! - `POST {base}/api/upload`            → multipart 字段 `file`，响应 `{"url": ...}`
//! - `DELETE {base}/api/images/{name}`   → 成功状态
//!
//! 上传请求体按块流式发送，每块交给传输层时上报一次进度。

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use percent_encoding::percent_decode_str;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::StorageBackend;
use crate::config::GalleryConfig;
use crate::error::{GalleryError, Result};
use crate::image_ref::ImageReference;
use crate::upload::{ProgressTracker, SelectedFile};

pub struct HttpStorage {
    client: reqwest::Client,
    config: GalleryConfig,
}

impl HttpStorage {
    pub fn new(config: GalleryConfig) -> Result<Self> {
        config.validate()?;
        let client = create_client(&config)?;
        Ok(Self { client, config })
    }
}

pub fn create_client(config: &GalleryConfig) -> Result<reqwest::Client> {
    let mut client_builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .user_agent(config.user_agent.as_str());

    // 未配置时不设总超时，挂起的请求会一直等待
    if let Some(timeout) = config.request_timeout() {
        client_builder = client_builder.timeout(timeout);
    }

    client_builder
        .build()
        .map_err(|e| GalleryError::Config(format!("Failed to create HTTP client: {}", e)))
}

#[derive(Deserialize)]
struct UploadResponse {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// 提取 `{"detail": ...}`：字符串直接使用；校验错误数组取各项 `msg` 拼接。
fn parse_error_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Array(items) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            if msgs.is_empty() {
                None
            } else {
                Some(msgs.join("; "))
            }
        }
        _ => None,
    }
}

async fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let detail = parse_error_detail(&body);
    warn!(status = status.as_u16(), detail = ?detail, "storage service returned an error");
    Err(GalleryError::Server {
        status: status.as_u16(),
        detail,
    })
}

fn progress_body(content: Arc<[u8]>, chunk_size: usize, progress: ProgressTracker) -> Body {
    let len = content.len();
    let chunk_size = chunk_size.max(1);
    let chunks = stream::iter((0..len).step_by(chunk_size)).map(move |start| {
        let end = (start + chunk_size).min(len);
        let chunk = content[start..end].to_vec();
        progress.advance(chunk.len() as u64);
        Ok::<_, std::io::Error>(chunk)
    });
    Body::wrap_stream(chunks)
}

#[async_trait]
impl StorageBackend for HttpStorage {
    async fn list_images(&self) -> Result<Vec<ImageReference>> {
        let url = self.config.endpoint(&["api", "images"])?;
        debug!(url = %url, "listing images");
        let resp = self.client.get(url).send().await?;
        let resp = ensure_success(resp).await?;
        let images: Vec<ImageReference> = resp.json().await?;
        Ok(images)
    }

    async fn upload_image(
        &self,
        file: &SelectedFile,
        progress: ProgressTracker,
    ) -> Result<Option<ImageReference>> {
        let url = self.config.endpoint(&["api", "upload"])?;
        debug!(
            url = %url,
            file = file.file_name(),
            bytes = file.len(),
            "uploading image"
        );

        let total = progress.total();
        let body = progress_body(file.content_arc(), self.config.upload_chunk_size, progress);
        let part = Part::stream_with_length(body, total)
            .file_name(file.file_name().to_string())
            .mime_str(file.mime_type())?;
        let form = Form::new().part("file", part);

        let resp = self.client.post(url).multipart(form).send().await?;
        let resp = ensure_success(resp).await?;

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<UploadResponse>(&text) {
            Ok(r) => Ok(r.url.map(ImageReference::from)),
            Err(e) => {
                debug!("upload response has no url: {}", e);
                Ok(None)
            }
        }
    }

    async fn delete_image(&self, storage_key: &str) -> Result<()> {
        // 引用里可能已是编码后的文件名，先解码再由 endpoint 统一编码
        let name = percent_decode_str(storage_key).decode_utf8_lossy();
        if name.is_empty() {
            return Err(GalleryError::InvalidReference(storage_key.to_string()));
        }
        let url = self.config.endpoint(&["api", "images", name.as_ref()])?;
        debug!(url = %url, "deleting image");
        let resp = self.client.delete(url).send().await?;
        ensure_success(resp).await?;
        Ok(())
    }
}
