//! 画廊客户端：维护显示列表、带进度上传选中文件、按引用删除，每次修改后重新同步列表。
//!
//! 列表只由 [GalleryClient::list] 整体替换，从不做本地乐观合并。
//! 状态变化通过 [EventBroadcaster] 通知订阅方。

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::config::GalleryConfig;
use crate::error::{GalleryError, Operation, Result};
use crate::events::{ArcGalleryEvent, EventBroadcaster, GalleryEvent, GalleryEventKind};
use crate::image_ref::ImageReference;
use crate::storage::{HttpStorage, StorageBackend};
use crate::upload::{
    wait_canceled, ProgressSink, ProgressTracker, SelectedFile, UploadHandle, UploadOutcome,
    UploadProgress, UploadState,
};

#[derive(Default)]
struct GalleryState {
    images: Vec<ImageReference>,
    selected: Option<SelectedFile>,
    in_flight: bool,
    error: Option<String>,
    /// 已应用到 `images` 的最新 list 请求序号
    applied_list_seq: u64,
}

struct ClientInner {
    backend: Arc<dyn StorageBackend>,
    config: GalleryConfig,
    events: EventBroadcaster,
    state: RwLock<GalleryState>,
    /// 进度由传输层同步回调写入，不走 state 锁
    progress: AtomicU8,
    list_seq: AtomicU64,
}

/// 画廊客户端（克隆后共享同一份状态）
#[derive(Clone)]
pub struct GalleryClient {
    inner: Arc<ClientInner>,
}

impl GalleryClient {
    /// 使用 HTTP 存储服务创建客户端。
    pub fn new(config: GalleryConfig) -> Result<Self> {
        let backend = HttpStorage::new(config.clone())?;
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    /// 注入任意存储实现。
    pub fn with_backend(backend: Arc<dyn StorageBackend>, config: GalleryConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                backend,
                config,
                events: EventBroadcaster::default(),
                state: RwLock::new(GalleryState::default()),
                progress: AtomicU8::new(0),
                list_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.inner.events
    }

    pub fn subscribe(
        &self,
        kind: GalleryEventKind,
    ) -> tokio::sync::broadcast::Receiver<(u64, ArcGalleryEvent)> {
        self.inner.events.subscribe(kind)
    }

    // ==================== 读取 ====================

    pub async fn images(&self) -> Vec<ImageReference> {
        self.inner.state.read().await.images.clone()
    }

    pub async fn upload_state(&self) -> UploadState {
        let st = self.inner.state.read().await;
        self.snapshot(&st)
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.state.read().await.error.clone()
    }

    pub fn display_url(&self, reference: &ImageReference) -> String {
        reference.display_url(&self.inner.config.api_base)
    }

    // ==================== 列表 ====================

    /// 从服务端重新读取列表并整体替换显示列表。
    ///
    /// 失败时设置错误消息，保留原列表，不重试。若在本次请求发出之后又有更新的
    /// list 已被应用，本次响应被丢弃，返回当前显示的列表。
    pub async fn list(&self) -> Result<Vec<ImageReference>> {
        let seq = self.inner.list_seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(seq, "refreshing gallery");

        match self.inner.backend.list_images().await {
            Ok(images) => {
                let mut st = self.inner.state.write().await;
                if seq < st.applied_list_seq {
                    debug!(
                        seq,
                        applied = st.applied_list_seq,
                        "discarding stale list response"
                    );
                    return Ok(st.images.clone());
                }
                st.applied_list_seq = seq;
                st.images = images.clone();
                drop(st);

                self.inner.events.broadcast(GalleryEvent::ImagesChanged {
                    images: images.clone(),
                });
                Ok(images)
            }
            Err(e) => {
                let applied = self.inner.state.read().await.applied_list_seq;
                if seq < applied {
                    debug!(seq, applied, "ignoring failure of stale list request");
                } else {
                    warn!("failed to list images: {}", e);
                    self.set_error(Some(e.user_message(Operation::List))).await;
                }
                Err(e)
            }
        }
    }

    // ==================== 选择文件 ====================

    /// 设置待上传文件；超出大小上限时拒绝并保留原选择。
    pub async fn select_file(&self, file: SelectedFile) -> Result<()> {
        if let Err(e) = self.check_size(&file) {
            self.set_error(Some(e.user_message(Operation::Upload))).await;
            return Err(e);
        }
        let state = {
            let mut st = self.inner.state.write().await;
            st.selected = Some(file);
            st.error = None;
            self.snapshot(&st)
        };
        self.inner
            .events
            .broadcast(GalleryEvent::ErrorChanged { message: None });
        self.inner
            .events
            .broadcast(GalleryEvent::UploadStateChanged { state });
        Ok(())
    }

    pub async fn clear_selection(&self) {
        let state = {
            let mut st = self.inner.state.write().await;
            st.selected = None;
            self.snapshot(&st)
        };
        self.inner
            .events
            .broadcast(GalleryEvent::UploadStateChanged { state });
    }

    pub async fn clear_error(&self) {
        self.set_error(None).await;
    }

    // ==================== 上传 ====================

    /// 上传选中文件并等待结果（包括随后的重新同步）。
    pub async fn upload(&self) -> Result<UploadOutcome> {
        self.start_upload().await?.wait().await
    }

    /// 开始上传，返回可监听进度、可取消的句柄。
    ///
    /// 未选择文件时设置错误并立即返回，不发出任何请求；已有上传在进行时返回
    /// [GalleryError::UploadInProgress]。
    pub async fn start_upload(&self) -> Result<UploadHandle> {
        let (file, state) = {
            let mut st = self.inner.state.write().await;
            if st.in_flight {
                return Err(GalleryError::UploadInProgress);
            }
            let selected = st.selected.clone();
            let file = match selected {
                Some(f) => f,
                None => {
                    let e = GalleryError::NoFileSelected;
                    st.error = Some(e.user_message(Operation::Upload));
                    let message = st.error.clone();
                    drop(st);
                    self.inner
                        .events
                        .broadcast(GalleryEvent::ErrorChanged { message });
                    return Err(e);
                }
            };
            if let Err(e) = self.check_size(&file) {
                st.error = Some(e.user_message(Operation::Upload));
                let message = st.error.clone();
                drop(st);
                self.inner
                    .events
                    .broadcast(GalleryEvent::ErrorChanged { message });
                return Err(e);
            }
            st.in_flight = true;
            st.error = None;
            self.inner.progress.store(0, Ordering::SeqCst);
            let state = self.snapshot(&st);
            (file, state)
        };

        self.inner
            .events
            .broadcast(GalleryEvent::ErrorChanged { message: None });
        self.inner
            .events
            .broadcast(GalleryEvent::UploadStateChanged { state });

        let (tracker, progress_rx) = ProgressTracker::new(file.len(), Some(self.progress_sink()));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        info!(file = file.file_name(), bytes = file.len(), "starting upload");
        let client = self.clone();
        let task =
            tokio::spawn(async move { client.supervise_upload(file, tracker, cancel_rx).await });

        Ok(UploadHandle::new(progress_rx, cancel_tx, task))
    }

    /// 在独立任务中执行上传；任务 panic 时同样复位上传状态。
    async fn supervise_upload(
        &self,
        file: SelectedFile,
        tracker: ProgressTracker,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<UploadOutcome> {
        let client = self.clone();
        let worker_file = file.clone();
        let worker_tracker = tracker.clone();
        let worker = tokio::spawn(async move {
            client
                .run_upload(worker_file, worker_tracker, cancel_rx)
                .await
        });

        match worker.await {
            Ok(result) => result,
            Err(e) => {
                let err = if e.is_cancelled() {
                    GalleryError::Canceled
                } else {
                    GalleryError::TaskFailed(e.to_string())
                };
                self.fail_upload(&file, &tracker, err).await
            }
        }
    }

    async fn run_upload(
        &self,
        file: SelectedFile,
        tracker: ProgressTracker,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> Result<UploadOutcome> {
        let result = tokio::select! {
            biased;
            _ = wait_canceled(&mut cancel_rx) => Err(GalleryError::Canceled),
            r = self.inner.backend.upload_image(&file, tracker.clone()) => r,
        };

        match result {
            Ok(reference) => {
                tracker.finish();
                tracker.close();
                let state = {
                    let mut st = self.inner.state.write().await;
                    st.selected = None;
                    st.in_flight = false;
                    self.inner.progress.store(0, Ordering::SeqCst);
                    self.snapshot(&st)
                };
                self.inner
                    .events
                    .broadcast(GalleryEvent::UploadStateChanged { state });
                info!(file = file.file_name(), "upload finished, resynchronizing");

                // 只有收到上传响应之后才重新同步
                match self.list().await {
                    Ok(images) => Ok(UploadOutcome {
                        reference,
                        images,
                        resynced: true,
                    }),
                    Err(_) => Ok(UploadOutcome {
                        reference,
                        images: self.images().await,
                        resynced: false,
                    }),
                }
            }
            Err(e) => self.fail_upload(&file, &tracker, e).await,
        }
    }

    /// 上传失败：复位进度与 in-flight，设置错误，保留选择和列表。
    async fn fail_upload(
        &self,
        file: &SelectedFile,
        tracker: &ProgressTracker,
        e: GalleryError,
    ) -> Result<UploadOutcome> {
        tracker.close();
        warn!(file = file.file_name(), "upload failed: {}", e);
        let state = {
            let mut st = self.inner.state.write().await;
            st.in_flight = false;
            st.error = Some(e.user_message(Operation::Upload));
            self.inner.progress.store(0, Ordering::SeqCst);
            self.snapshot(&st)
        };
        self.inner.events.broadcast(GalleryEvent::ErrorChanged {
            message: state.error.clone(),
        });
        self.inner
            .events
            .broadcast(GalleryEvent::UploadStateChanged { state });
        Err(e)
    }

    // ==================== 删除 ====================

    /// 按引用删除（存储键为最后一个路径段），成功后重新同步列表。
    pub async fn delete(&self, reference: &ImageReference) -> Result<Vec<ImageReference>> {
        let key = match reference.storage_key() {
            Some(k) => k,
            None => {
                let e = GalleryError::InvalidReference(reference.to_string());
                self.set_error(Some(e.user_message(Operation::Delete))).await;
                return Err(e);
            }
        };

        debug!(reference = %reference, key, "deleting image");
        if let Err(e) = self.inner.backend.delete_image(key).await {
            warn!(reference = %reference, "failed to delete image: {}", e);
            self.set_error(Some(e.user_message(Operation::Delete))).await;
            return Err(e);
        }
        self.list().await
    }

    // ==================== 内部 ====================

    fn check_size(&self, file: &SelectedFile) -> Result<()> {
        let max_bytes = self.inner.config.max_upload_bytes;
        if file.len() > max_bytes {
            return Err(GalleryError::FileTooLarge {
                size: file.len(),
                max_bytes,
            });
        }
        Ok(())
    }

    fn snapshot(&self, st: &GalleryState) -> UploadState {
        UploadState {
            selected_file: st.selected.as_ref().map(|f| f.file_name().to_string()),
            progress: self.inner.progress.load(Ordering::SeqCst),
            in_flight: st.in_flight,
            error: st.error.clone(),
        }
    }

    async fn set_error(&self, message: Option<String>) {
        {
            let mut st = self.inner.state.write().await;
            if st.error == message {
                return;
            }
            st.error = message.clone();
        }
        self.inner
            .events
            .broadcast(GalleryEvent::ErrorChanged { message });
    }

    fn progress_sink(&self) -> ProgressSink {
        let inner = Arc::clone(&self.inner);
        Arc::new(move |progress: UploadProgress| {
            inner.progress.store(progress.percent, Ordering::SeqCst);
            inner
                .events
                .broadcast(GalleryEvent::UploadProgress { progress });
        })
    }
}
