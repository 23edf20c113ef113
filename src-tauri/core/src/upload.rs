//! 上传相关类型：待上传文件、上传状态快照、进度跟踪与可取消的上传句柄。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{GalleryError, Result};
use crate::image_ref::ImageReference;
use crate::image_type;

/// 用户选中的待上传文件（内容已读入内存，克隆廉价）。
#[derive(Clone)]
pub struct SelectedFile {
    file_name: String,
    mime_type: String,
    content: Arc<[u8]>,
}

impl SelectedFile {
    /// 读取本地文件。文件名取路径最后一段。
    pub async fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| GalleryError::UnsupportedFile(path.display().to_string()))?
            .to_string();
        let content = tokio::fs::read(path).await?;
        Self::from_bytes(file_name, content)
    }

    /// 从内存内容构造，MIME 由扩展名/内容推断，非图片直接拒绝。
    pub fn from_bytes(file_name: impl Into<String>, content: Vec<u8>) -> Result<Self> {
        let file_name = file_name.into();
        let mime = image_type::detect_image_mime(&file_name, &content)
            .ok_or_else(|| GalleryError::UnsupportedFile(file_name.clone()))?;
        Ok(Self {
            file_name,
            mime_type: mime.to_string(),
            content: content.into(),
        })
    }

    /// 显式指定 MIME（须为支持的图片类型）。
    pub fn with_mime(
        file_name: impl Into<String>,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<Self> {
        let file_name = file_name.into();
        if !image_type::is_supported_mime(mime_type) {
            return Err(GalleryError::UnsupportedFile(format!(
                "{file_name} ({mime_type})"
            )));
        }
        Ok(Self {
            file_name,
            mime_type: mime_type.to_lowercase(),
            content: content.into(),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn content_arc(&self) -> Arc<[u8]> {
        Arc::clone(&self.content)
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.content.len())
            .finish()
    }
}

/// 上传状态快照（只读，由客户端生成）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadState {
    /// 当前选中文件名
    pub selected_file: Option<String>,
    /// 0..=100
    pub progress: u8,
    pub in_flight: bool,
    pub error: Option<String>,
}

/// 上传进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub sent_bytes: u64,
    pub total_bytes: u64,
    pub percent: u8,
}

impl UploadProgress {
    /// `percent = round(sent * 100 / total)`，total 为 0 时按 1 计算。
    pub fn new(sent_bytes: u64, total_bytes: u64) -> Self {
        let total = total_bytes.max(1);
        let percent = ((sent_bytes as f64 * 100.0) / total as f64).round();
        Self {
            sent_bytes,
            total_bytes,
            percent: percent.clamp(0.0, 100.0) as u8,
        }
    }

    pub fn complete(total_bytes: u64) -> Self {
        Self {
            sent_bytes: total_bytes,
            total_bytes,
            percent: 100,
        }
    }
}

/// 进度回调（在传输层轮询请求体时同步调用）
pub type ProgressSink = Arc<dyn Fn(UploadProgress) + Send + Sync>;

struct TrackerState {
    sent: u64,
    last_percent: u8,
    closed: bool,
}

struct TrackerInner {
    total: u64,
    tx: watch::Sender<UploadProgress>,
    sink: Option<ProgressSink>,
    state: Mutex<TrackerState>,
}

/// 上传进度跟踪器，克隆后共享同一份计数。
///
/// 只在整数百分比变大时上报，因此上报序列单调不减；`close` 之后不再上报。
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

impl ProgressTracker {
    pub fn new(
        total_bytes: u64,
        sink: Option<ProgressSink>,
    ) -> (Self, watch::Receiver<UploadProgress>) {
        let (tx, rx) = watch::channel(UploadProgress::new(0, total_bytes));
        let tracker = Self {
            inner: Arc::new(TrackerInner {
                total: total_bytes,
                tx,
                sink,
                state: Mutex::new(TrackerState {
                    sent: 0,
                    last_percent: 0,
                    closed: false,
                }),
            }),
        };
        (tracker, rx)
    }

    pub fn total(&self) -> u64 {
        self.inner.total
    }

    /// 记录新发送的 `bytes` 字节。
    pub fn advance(&self, bytes: u64) {
        let Ok(mut st) = self.inner.state.lock() else {
            return;
        };
        if st.closed {
            return;
        }
        st.sent = st.sent.saturating_add(bytes).min(self.inner.total);
        let progress = UploadProgress::new(st.sent, self.inner.total);
        if progress.percent > st.last_percent {
            st.last_percent = progress.percent;
            self.emit(progress);
        }
    }

    /// 请求成功后调用：进度置为 100。
    pub fn finish(&self) {
        let Ok(mut st) = self.inner.state.lock() else {
            return;
        };
        if st.closed {
            return;
        }
        st.sent = self.inner.total;
        let already_reported = st.last_percent == 100;
        st.last_percent = 100;
        if !already_reported {
            self.emit(UploadProgress::complete(self.inner.total));
        } else {
            self.inner
                .tx
                .send_replace(UploadProgress::complete(self.inner.total));
        }
    }

    pub fn close(&self) {
        if let Ok(mut st) = self.inner.state.lock() {
            st.closed = true;
        }
    }

    fn emit(&self, progress: UploadProgress) {
        self.inner.tx.send_replace(progress);
        if let Some(sink) = &self.inner.sink {
            sink(progress);
        }
    }
}

/// 上传完成结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// 服务端在上传响应中返回的引用（若有）
    pub reference: Option<ImageReference>,
    /// 重新同步后的列表；重新同步失败时为当前显示的列表
    pub images: Vec<ImageReference>,
    pub resynced: bool,
}

/// 取消上传用的句柄，可从 [UploadHandle] 中取出后跨任务使用。
#[derive(Clone)]
pub struct UploadCanceller {
    tx: Arc<watch::Sender<bool>>,
}

impl UploadCanceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// 正在进行的上传：可监听进度、可取消、可等待最终结果。
pub struct UploadHandle {
    progress: watch::Receiver<UploadProgress>,
    canceller: UploadCanceller,
    task: JoinHandle<Result<UploadOutcome>>,
}

impl UploadHandle {
    pub(crate) fn new(
        progress: watch::Receiver<UploadProgress>,
        cancel_tx: watch::Sender<bool>,
        task: JoinHandle<Result<UploadOutcome>>,
    ) -> Self {
        Self {
            progress,
            canceller: UploadCanceller {
                tx: Arc::new(cancel_tx),
            },
            task,
        }
    }

    /// 中间进度流：最新值总是可读，发送端在上传结束后关闭。
    pub fn progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.clone()
    }

    pub fn latest_progress(&self) -> UploadProgress {
        *self.progress.borrow()
    }

    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn canceller(&self) -> UploadCanceller {
        self.canceller.clone()
    }

    pub async fn wait(self) -> Result<UploadOutcome> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(GalleryError::Canceled),
            Err(e) => Err(GalleryError::TaskFailed(e.to_string())),
        }
    }
}

/// 等待取消信号；发送端被丢弃时永不返回。
pub(crate) async fn wait_canceled(rx: &mut watch::Receiver<bool>) {
    loop {
        let canceled = *rx.borrow_and_update();
        if canceled {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
