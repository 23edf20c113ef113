//! 画廊状态事件与广播器
//!
//! 客户端每次修改可见状态都会发布一个 [GalleryEvent]。每种事件对应一个
//! broadcast 通道，订阅方按种类订阅，或用 [EventBroadcaster::subscribe_filtered_stream]
//! 把多种事件合并成一个流。
//!
//! ```rust,ignore
//! let mut rx = client.events().subscribe(GalleryEventKind::ImagesChanged);
//! while let Ok((id, event)) = rx.recv().await {
//!     println!("#{id}: {:?}", event);
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::image_ref::ImageReference;
use crate::upload::{UploadProgress, UploadState};

/// 事件种类（不含 payload），用于做"事件 -> 广播通道"的固定映射。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GalleryEventKind {
    ImagesChanged,
    UploadStateChanged,
    UploadProgress,
    ErrorChanged,
}

impl GalleryEventKind {
    pub const COUNT: usize = 4;

    pub const ALL: [GalleryEventKind; Self::COUNT] = [
        GalleryEventKind::ImagesChanged,
        GalleryEventKind::UploadStateChanged,
        GalleryEventKind::UploadProgress,
        GalleryEventKind::ErrorChanged,
    ];

    #[inline]
    pub const fn as_usize(self) -> usize {
        match self {
            GalleryEventKind::ImagesChanged => 0,
            GalleryEventKind::UploadStateChanged => 1,
            GalleryEventKind::UploadProgress => 2,
            GalleryEventKind::ErrorChanged => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GalleryEvent {
    /// 显示列表被整体替换
    ImagesChanged { images: Vec<ImageReference> },

    /// 选中文件 / 上传中标记 / 错误 变化
    UploadStateChanged { state: UploadState },

    /// 上传进度（单调不减，成功时以 100 结束）
    UploadProgress { progress: UploadProgress },

    /// 面向用户的错误消息变化，None 表示清除
    ErrorChanged { message: Option<String> },
}

impl GalleryEvent {
    pub fn kind(&self) -> GalleryEventKind {
        match self {
            GalleryEvent::ImagesChanged { .. } => GalleryEventKind::ImagesChanged,
            GalleryEvent::UploadStateChanged { .. } => GalleryEventKind::UploadStateChanged,
            GalleryEvent::UploadProgress { .. } => GalleryEventKind::UploadProgress,
            GalleryEvent::ErrorChanged { .. } => GalleryEventKind::ErrorChanged,
        }
    }
}

pub type ArcGalleryEvent = Arc<GalleryEvent>;

/// 事件广播器，归属于单个客户端实例。
pub struct EventBroadcaster {
    next_id: AtomicU64,
    event_txs: Vec<broadcast::Sender<(u64, ArcGalleryEvent)>>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut event_txs = Vec::with_capacity(GalleryEventKind::COUNT);
        for _ in 0..GalleryEventKind::COUNT {
            let (tx, _) = broadcast::channel(capacity);
            event_txs.push(tx);
        }
        Self {
            next_id: AtomicU64::new(0),
            event_txs,
        }
    }

    /// 广播事件，返回分配的事件 ID。没有订阅者时直接丢弃。
    pub fn broadcast(&self, event: GalleryEvent) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let tx = &self.event_txs[event.kind().as_usize()];
        if tx.receiver_count() > 0 {
            let _ = tx.send((id, Arc::new(event)));
        }
        id
    }

    /// 订阅指定类型的事件
    pub fn subscribe(
        &self,
        kind: GalleryEventKind,
    ) -> broadcast::Receiver<(u64, ArcGalleryEvent)> {
        self.event_txs[kind.as_usize()].subscribe()
    }

    pub fn subscribe_all_stream(&self) -> mpsc::UnboundedReceiver<(u64, ArcGalleryEvent)> {
        self.subscribe_filtered_stream(&GalleryEventKind::ALL)
    }

    /// 订阅过滤后的事件流（空列表 = 全部事件）。需要在 tokio runtime 内调用。
    pub fn subscribe_filtered_stream(
        &self,
        kinds: &[GalleryEventKind],
    ) -> mpsc::UnboundedReceiver<(u64, ArcGalleryEvent)> {
        let kinds: &[GalleryEventKind] = if kinds.is_empty() {
            &GalleryEventKind::ALL
        } else {
            kinds
        };
        let (tx, rx) = mpsc::unbounded_channel::<(u64, ArcGalleryEvent)>();

        for kind in kinds {
            let mut brx = self.subscribe(*kind);
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    match brx.recv().await {
                        Ok(item) => {
                            if tx.send(item).is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "event subscriber lagged");
                            continue;
                        }
                    }
                }
            });
        }

        rx
    }

    /// 最新分配的事件 ID
    pub fn latest_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst).saturating_sub(1)
    }

    pub fn receiver_count(&self, kind: GalleryEventKind) -> usize {
        self.event_txs[kind.as_usize()].receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
