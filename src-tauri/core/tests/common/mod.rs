//! 进程内模拟存储服务（axum），行为与真实服务一致：
//! 列表返回 `/uploads/{name}`，上传返回 `{"url": ...}`，错误体为 `{"detail": ...}`。

#![allow(dead_code)]

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use gallery_core::GalleryConfig;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub len: usize,
}

#[derive(Default)]
pub struct ServiceState {
    pub files: Mutex<Vec<String>>,
    pub fail_list: AtomicBool,
    /// 设置后上传请求返回 400 + 该 detail
    pub reject_upload: Mutex<Option<String>>,
    pub requests: AtomicUsize,
    pub last_upload: Mutex<Option<ReceivedUpload>>,
}

impl ServiceState {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

pub struct TestService {
    pub base: String,
    pub state: Arc<ServiceState>,
}

impl TestService {
    pub fn config(&self) -> GalleryConfig {
        GalleryConfig::default()
            .with_api_base(&self.base)
            .expect("test service base url")
    }
}

pub async fn spawn_service() -> TestService {
    let state = Arc::new(ServiceState::default());
    let app = Router::new()
        .route("/api/images", get(list_images))
        .route("/api/images/{filename}", delete(delete_image))
        .route("/api/upload", post(upload_image))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestService {
        base: format!("http://{}", addr),
        state,
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

async fn list_images(State(state): State<Arc<ServiceState>>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if state.fail_list.load(Ordering::SeqCst) {
        return detail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error reading image directory",
        );
    }
    let files: Vec<String> = state
        .files
        .lock()
        .unwrap()
        .iter()
        .map(|f| format!("/uploads/{f}"))
        .collect();
    Json(files).into_response()
}

async fn upload_image(State(state): State<Arc<ServiceState>>, mut multipart: Multipart) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return detail(StatusCode::BAD_REQUEST, &e.to_string()),
        };
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = match field.bytes().await {
            Ok(b) => b,
            Err(e) => return detail(StatusCode::BAD_REQUEST, &e.to_string()),
        };

        let rejection = state.reject_upload.lock().unwrap().clone();
        if let Some(message) = rejection {
            return detail(StatusCode::BAD_REQUEST, &message);
        }
        if !content_type
            .as_deref()
            .is_some_and(|c| c.starts_with("image/"))
        {
            return detail(StatusCode::BAD_REQUEST, "Uploaded file is not an image.");
        }

        *state.last_upload.lock().unwrap() = Some(ReceivedUpload {
            file_name: file_name.clone(),
            content_type,
            len: bytes.len(),
        });
        state.files.lock().unwrap().push(file_name.clone());
        return Json(json!({ "url": format!("/uploads/{file_name}") })).into_response();
    }

    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "detail": [
                { "loc": ["body", "file"], "msg": "field required", "type": "value_error.missing" }
            ]
        })),
    )
        .into_response()
}

async fn delete_image(
    State(state): State<Arc<ServiceState>>,
    Path(filename): Path<String>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let removed = {
        let mut files = state.files.lock().unwrap();
        match files.iter().position(|f| *f == filename) {
            Some(idx) => {
                files.remove(idx);
                true
            }
            None => false,
        }
    };
    if removed {
        Json(json!({ "message": "File deleted successfully." })).into_response()
    } else {
        detail(StatusCode::NOT_FOUND, "File not found.")
    }
}
