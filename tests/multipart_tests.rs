//! Tests for streamed file uploads

use std::io::Write;

use chainwave::{Client, FileField, StatusCode, with_files};
use serde_json::Value;
mod common;
use common::httpbin_uri;

fn temp_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::File::create(&path)
        .unwrap()
        .write_all(contents)
        .unwrap();
    path
}

#[async_std::test]
async fn test_upload_files() {
    let dir = tempfile::tempdir().unwrap();
    let first = temp_file(&dir, "testdata1.txt", b"first file");
    let second = temp_file(&dir, "testdata2.txt", b"second file");

    let body: Value = Client::new()
        .post(
            httpbin_uri("/post"),
            [with_files([
                FileField::new("file1", &first),
                FileField::new("file2", &second).with_file_name("renamed.txt"),
            ])],
        )
        .await
        .ensure_status_ok()
        .json()
        .await
        .unwrap();

    let content_type = body["headers"]["content-type"].as_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    let boundary = &content_type["multipart/form-data; boundary=".len()..];

    let text = body["body"].as_str().unwrap();
    assert!(text.contains("name=\"file1\"; filename=\"testdata1.txt\""));
    assert!(text.contains("name=\"file2\"; filename=\"renamed.txt\""));
    assert!(text.contains("first file"));
    assert!(text.contains("second file"));
    assert!(text.ends_with(&format!("--{boundary}--\r\n")));
}

#[async_std::test]
async fn test_upload_large_file() {
    let dir = tempfile::tempdir().unwrap();
    let contents: Vec<u8> = (0..500_000u32).map(|i| b'a' + (i % 26) as u8).collect();
    let path = temp_file(&dir, "large.txt", &contents);

    let body: Value = Client::new()
        .put(httpbin_uri("/put"), [with_files([FileField::new("file", &path)])])
        .await
        .ensure_status_ok()
        .json()
        .await
        .unwrap();
    let text = body["body"].as_str().unwrap();
    assert!(text.contains(std::str::from_utf8(&contents).unwrap()));
}

#[async_std::test]
async fn test_duplicate_field_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_file(&dir, "a.txt", b"a");

    let err = Client::new()
        .post(
            httpbin_uri("/post"),
            [with_files([
                FileField::new("file", &path),
                FileField::new("file", &path),
            ])],
        )
        .await
        .resolve()
        .unwrap_err();
    assert!(err.is_option_failure());
}

#[async_std::test]
async fn test_missing_file_and_directory_are_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let err = Client::new()
        .post(
            httpbin_uri("/post"),
            [with_files([FileField::new("file", dir.path().join("missing"))])],
        )
        .await
        .resolve()
        .unwrap_err();
    assert!(err.is_option_failure());

    let err = Client::new()
        .post(
            httpbin_uri("/post"),
            [with_files([FileField::new("file", dir.path())])],
        )
        .await
        .resolve()
        .unwrap_err();
    assert!(err.is_option_failure());
}

#[async_std::test]
async fn test_streamed_body_is_not_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_file(&dir, "a.txt", b"a");

    let response = Client::new()
        .post(
            httpbin_uri("/redirect-to?url=/post&status_code=307"),
            [with_files([FileField::new("file", &path)])],
        )
        .await;
    assert_eq!(response.status(), Some(StatusCode::TEMPORARY_REDIRECT));
}
