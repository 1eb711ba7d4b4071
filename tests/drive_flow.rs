//! Drive Flow Tests
//!
//! End-to-end upload, listing, download and delete through the HTTP channel
//! and an in-memory catalog.

mod common;

use axum::http::StatusCode;
use chunkdrive::{Database, DiscordChannel, Drive, DriveError, FolderPath, FolderScope, NewFile};
use common::{Endpoint, FakeDiscord, Scripted};

async fn create_drive(fake: &FakeDiscord, chunk_size: usize) -> Drive<DiscordChannel> {
    let db = Database::open_in_memory()
        .await
        .expect("Failed to create test database");
    Drive::connect(db, &fake.config(chunk_size)).expect("Failed to create drive")
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn file(name: &str, folder: &str) -> NewFile {
    NewFile::new(name, 0, "application/octet-stream", "user-1")
        .with_folder(FolderPath::parse(folder).expect("valid folder"))
}

#[tokio::test]
async fn test_upload_get_download() {
    let fake = FakeDiscord::start().await;
    let drive = create_drive(&fake, 16).await;
    let data = payload(40);

    drive.upload(file("video.mp4", "/media"), &data).await.unwrap();

    let stored = drive.get("video.mp4", "user-1").await.unwrap();
    assert_eq!(stored.file.size, 40);
    assert_eq!(stored.file.folder.as_deref(), Some("/media/"));
    let indices: Vec<i64> = stored.chunks.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(stored.chunks.iter().all(|c| c.message_id.is_some()));
    assert_eq!(fake.stored(), 3);

    assert_eq!(drive.download("video.mp4", "user-1").await.unwrap(), data);
}

#[tokio::test]
async fn test_failed_upload_leaves_nothing_behind() {
    let fake = FakeDiscord::start().await;
    let drive = create_drive(&fake, 8).await;
    let data = payload(24);
    fake.reject_uploads_after(2, StatusCode::PAYLOAD_TOO_LARGE);

    let err = drive.upload(file("a.bin", "/"), &data).await.unwrap_err();

    assert!(matches!(err, DriveError::Transport { attempts: 1, .. }));
    assert!(drive.get("a.bin", "user-1").await.unwrap_err().is_not_found());
    assert_eq!(fake.hits(Endpoint::Upload).len(), 3);
    assert_eq!(fake.hits(Endpoint::Delete).len(), 2);
    assert_eq!(fake.stored(), 0);
}

#[tokio::test]
async fn test_upload_survives_rate_limit() {
    let fake = FakeDiscord::start().await;
    let drive = create_drive(&fake, 4).await;
    fake.script(Endpoint::Upload, Scripted::rate_limited(0.1));

    drive.upload(file("a.bin", "/"), &payload(8)).await.unwrap();

    assert_eq!(fake.hits(Endpoint::Upload).len(), 3);
    assert_eq!(drive.download("a.bin", "user-1").await.unwrap(), payload(8));
}

#[tokio::test]
async fn test_delete_file_cleans_remote() {
    let fake = FakeDiscord::start().await;
    let drive = create_drive(&fake, 4).await;
    drive.upload(file("a.bin", "/"), &payload(10)).await.unwrap();
    drive.upload(file("b.bin", "/"), &payload(3)).await.unwrap();

    assert_eq!(drive.delete_file("a.bin", "user-1").await.unwrap(), 1);

    assert_eq!(fake.stored(), 1);
    assert_eq!(fake.hits(Endpoint::Delete).len(), 3);
    let left = drive.list(&FolderScope::All, "user-1").await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].name, "b.bin");
}

#[tokio::test]
async fn test_delete_folder_over_http() {
    let fake = FakeDiscord::start().await;
    let drive = create_drive(&fake, 4).await;
    drive.upload(file("keep.txt", "/"), &payload(4)).await.unwrap();
    drive.upload(file("a.jpg", "/photos"), &payload(8)).await.unwrap();
    drive.upload(file("b.jpg", "/photos/trip"), &payload(8)).await.unwrap();
    drive.upload(file("c.jpg", "/photos/trip/day1"), &payload(12)).await.unwrap();
    drive.upload(file("d.psd", "/photoshop"), &payload(4)).await.unwrap();

    let removed = drive.delete_folder("/photos", "user-1").await.unwrap();

    assert_eq!(removed, 3);
    // 2 + 2 + 3 chunk messages in three batches of at most three.
    let deletes = fake.hits(Endpoint::Delete);
    assert_eq!(deletes.len(), 7);
    assert_eq!(fake.stored(), 2);

    let view = drive.browse(&FolderPath::root(), "user-1").await.unwrap();
    assert_eq!(view.folders, vec!["photoshop"]);
    assert_eq!(view.files.len(), 1);
}

#[tokio::test]
async fn test_delete_folder_root_is_rejected() {
    let fake = FakeDiscord::start().await;
    let drive = create_drive(&fake, 4).await;
    drive.upload(file("keep.txt", "/"), &payload(4)).await.unwrap();

    let err = drive.delete_folder("/", "user-1").await.unwrap_err();

    assert!(matches!(err, DriveError::Validation(_)));
    assert!(fake.hits(Endpoint::Delete).is_empty());
    assert_eq!(fake.stored(), 1);
}

#[tokio::test]
async fn test_metadata_removed_even_if_remote_delete_fails() {
    let fake = FakeDiscord::start().await;
    let drive = create_drive(&fake, 4).await;
    drive.upload(file("a.bin", "/docs"), &payload(4)).await.unwrap();
    for _ in 0..3 {
        fake.script(Endpoint::Delete, Scripted::status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    assert_eq!(drive.delete_folder("/docs", "user-1").await.unwrap(), 1);

    assert!(drive.get("a.bin", "user-1").await.unwrap_err().is_not_found());
    assert_eq!(fake.stored(), 1);
}
