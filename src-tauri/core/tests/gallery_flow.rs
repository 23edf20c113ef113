mod common;

use gallery_core::{
    GalleryClient, GalleryError, GalleryEvent, GalleryEventKind, ImageReference, SelectedFile,
};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_upload_and_delete_round_trip() {
    let service = common::spawn_service().await;
    let client = GalleryClient::new(service.config()).unwrap();
    let mut images_rx = client.subscribe(GalleryEventKind::ImagesChanged);

    assert!(client.list().await.unwrap().is_empty());

    let file = SelectedFile::from_bytes("cat.png", vec![1u8; 4096]).unwrap();
    client.select_file(file).await.unwrap();
    let outcome = client.upload().await.unwrap();
    assert!(outcome.resynced);

    let cat = ImageReference::from("/uploads/cat.png");
    let images = client.images().await;
    assert_eq!(images.iter().filter(|r| **r == cat).count(), 1);
    assert_eq!(images, vec![cat.clone()]);
    assert_eq!(
        client.display_url(&cat),
        format!("{}/uploads/cat.png", service.base)
    );

    client.delete(&cat).await.unwrap();
    assert!(client.images().await.is_empty());

    // 初始 list、上传后、删除后各一次
    let mut snapshots = Vec::new();
    while let Ok((_, event)) = images_rx.try_recv() {
        if let GalleryEvent::ImagesChanged { images } = &*event {
            snapshots.push(images.clone());
        }
    }
    assert_eq!(snapshots, vec![vec![], vec![cat], vec![]]);
}

#[tokio::test]
async fn test_progress_handle_ends_at_100() {
    let service = common::spawn_service().await;
    let mut config = service.config();
    config.upload_chunk_size = 512;
    let client = GalleryClient::new(config).unwrap();

    let file = SelectedFile::from_bytes("dog.png", vec![2u8; 8192]).unwrap();
    client.select_file(file).await.unwrap();

    let handle = client.start_upload().await.unwrap();
    let mut progress = handle.progress();
    let watcher = tokio::spawn(async move {
        let mut seen = vec![progress.borrow_and_update().percent];
        while seen.last() != Some(&100) && progress.changed().await.is_ok() {
            seen.push(progress.borrow_and_update().percent);
        }
        seen
    });

    handle.wait().await.unwrap();
    let seen = watcher.await.unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test]
async fn test_no_selection_issues_no_request() {
    let service = common::spawn_service().await;
    let client = GalleryClient::new(service.config()).unwrap();

    assert!(matches!(
        client.upload().await,
        Err(GalleryError::NoFileSelected)
    ));
    assert_eq!(service.state.requests(), 0);
}

#[tokio::test]
async fn test_rejected_upload_keeps_list() {
    let service = common::spawn_service().await;
    service
        .state
        .files
        .lock()
        .unwrap()
        .push("a.png".to_string());
    let client = GalleryClient::new(service.config()).unwrap();
    client.list().await.unwrap();

    *service.state.reject_upload.lock().unwrap() =
        Some("Uploaded file is not an image.".to_string());
    client
        .select_file(SelectedFile::from_bytes("b.png", vec![3u8; 32]).unwrap())
        .await
        .unwrap();
    assert!(client.upload().await.is_err());

    assert_eq!(
        client.images().await,
        vec![ImageReference::from("/uploads/a.png")]
    );
    assert_eq!(
        client.error().await.as_deref(),
        Some("Uploaded file is not an image.")
    );
    assert!(!client.upload_state().await.in_flight);
}

#[tokio::test]
async fn test_failing_list_keeps_previous_sequence() {
    let service = common::spawn_service().await;
    service
        .state
        .files
        .lock()
        .unwrap()
        .push("a.png".to_string());
    let client = GalleryClient::new(service.config()).unwrap();
    let before = client.list().await.unwrap();

    service.state.fail_list.store(true, Ordering::SeqCst);
    assert!(client.list().await.is_err());
    assert_eq!(client.images().await, before);
    assert_eq!(
        client.error().await.as_deref(),
        Some("Error reading image directory")
    );
}
