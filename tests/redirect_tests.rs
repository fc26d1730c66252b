//! Tests for redirect handling against the local server

use chainwave::{Client, RedirectPolicy, StatusCode, with_bearer_token, with_text};
use serde_json::Value;
mod common;
use common::httpbin_uri;

fn redirect_to(target: &str, status: u16) -> String {
    httpbin_uri(&format!("/redirect-to?url={target}&status_code={status}"))
}

#[async_std::test]
async fn test_follows_redirect_chain() {
    let raw = Client::new()
        .get(httpbin_uri("/redirect/3"), [])
        .await
        .ensure_status_ok()
        .resolve()
        .unwrap();
    assert!(raw.url().path().ends_with("/redirect/0"));
}

#[async_std::test]
async fn test_redirect_limit() {
    let client = Client::builder()
        .redirect(RedirectPolicy::limited(2))
        .build();
    let err = client
        .get(httpbin_uri("/redirect/5"), [])
        .await
        .resolve()
        .unwrap_err();
    assert!(err.is_transport_failure());

    let raw = client
        .get(httpbin_uri("/redirect/2"), [])
        .await
        .ensure_status_ok()
        .resolve()
        .unwrap();
    assert!(raw.url().path().ends_with("/redirect/0"));
}

#[async_std::test]
async fn test_redirects_disabled() {
    let client = Client::builder().redirect(RedirectPolicy::none()).build();
    let response = client.get(httpbin_uri("/redirect/1"), []).await;
    assert_eq!(response.status(), Some(StatusCode::FOUND));
}

#[async_std::test]
async fn test_custom_policy_sees_history() {
    let client = Client::builder()
        .redirect(RedirectPolicy::custom(|attempt| {
            if attempt.previous().len() >= 2 {
                anyhow::bail!("stop at {}", attempt.next());
            }
            Ok(true)
        }))
        .build();
    let err = client
        .get(httpbin_uri("/redirect/4"), [])
        .await
        .resolve()
        .unwrap_err();
    assert!(err.is_transport_failure());
    assert!(err.to_string().contains("/redirect/2"));
}

#[async_std::test]
async fn test_see_other_switches_to_get() {
    let body: Value = Client::new()
        .post(redirect_to("/anything", 303), [with_text("payload")])
        .await
        .ensure_status_ok()
        .json()
        .await
        .unwrap();
    assert_eq!(body["method"], "GET");
    assert_eq!(body["body"], "");
    assert!(body["headers"].get("content-type").is_none());
}

#[async_std::test]
async fn test_temporary_redirect_replays_body() {
    let body: Value = Client::new()
        .post(redirect_to("/anything", 307), [with_text("payload")])
        .await
        .ensure_status_ok()
        .json()
        .await
        .unwrap();
    assert_eq!(body["method"], "POST");
    assert_eq!(body["body"], "payload");
    assert_eq!(body["headers"]["content-type"], "text/plain; charset=utf-8");
}

#[async_std::test]
async fn test_same_host_keeps_authorization() {
    let body: Value = Client::new()
        .get(redirect_to("/headers", 302), [with_bearer_token("kept")])
        .await
        .ensure_status_ok()
        .json()
        .await
        .unwrap();
    assert_eq!(body["headers"]["authorization"], "Bearer kept");
}
