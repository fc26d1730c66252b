//! Tests for authentication options

use chainwave::{Client, StatusCode, with_basic_auth, with_bearer_token};
use serde_json::Value;
mod common;
use common::httpbin_uri;

#[async_std::test]
async fn test_basic_auth() {
    let body: Value = Client::new()
        .get(
            httpbin_uri("/basic-auth/user/passwd"),
            [with_basic_auth("user", "passwd")],
        )
        .await
        .ensure_status_ok()
        .json()
        .await
        .unwrap();
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"], "user");
}

#[async_std::test]
async fn test_basic_auth_wrong_password() {
    let err = Client::new()
        .get(
            httpbin_uri("/basic-auth/user/passwd"),
            [with_basic_auth("user", "wrong")],
        )
        .await
        .ensure_status_ok()
        .text()
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
}

#[async_std::test]
async fn test_bearer_token() {
    let body: Value = Client::new()
        .get(httpbin_uri("/bearer"), [with_bearer_token("token-123")])
        .await
        .ensure_status_ok()
        .json()
        .await
        .unwrap();
    assert_eq!(body["token"], "token-123");
}

#[async_std::test]
async fn test_last_auth_option_wins() {
    let body: Value = Client::new()
        .get(
            httpbin_uri("/bearer"),
            [with_basic_auth("user", "passwd"), with_bearer_token("late")],
        )
        .await
        .ensure_status_ok()
        .json()
        .await
        .unwrap();
    assert_eq!(body["token"], "late");
}

#[async_std::test]
async fn test_missing_token_is_rejected() {
    let response = Client::new().get(httpbin_uri("/bearer"), []).await;
    assert_eq!(response.status(), Some(StatusCode::UNAUTHORIZED));
}
