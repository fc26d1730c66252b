//! Tests for the cookie jar and cookie options

use std::sync::Arc;

use chainwave::{Client, Cookie, CookieJar, with_cookies};
use serde_json::Value;
mod common;
use common::{httpbin_base, httpbin_uri};

async fn sent_cookies(client: &Client, options: Vec<chainwave::RequestOption>) -> String {
    let body: Value = client
        .get(httpbin_uri("/cookies"), options)
        .await
        .ensure_status_ok()
        .json()
        .await
        .unwrap();
    body["cookie"].as_str().unwrap().to_owned()
}

#[async_std::test]
async fn test_response_cookies() {
    let response = Client::new()
        .get(httpbin_uri("/cookies/set?name1=value1&name2=value2"), [])
        .await
        .ensure_status_ok();
    let cookie = response.cookie("name2").unwrap();
    assert_eq!(cookie.value(), "value2");

    let err = Client::new()
        .get(httpbin_uri("/cookies/set?name1=value1"), [])
        .await
        .cookie("absent")
        .unwrap_err();
    assert!(err.is_body_read_failure());
}

#[async_std::test]
async fn test_jar_replays_cookies() {
    let client = Client::new();
    client
        .get(httpbin_uri("/cookies/set?name1=value1&name2=value2"), [])
        .await
        .ensure_status_ok()
        .resolve()
        .unwrap();

    let cookies = client.filter_cookies(&httpbin_base()).await.unwrap();
    assert_eq!(cookies.len(), 2);
    let cookie = client.filter_cookie(&httpbin_base(), "name1").await.unwrap();
    assert_eq!(cookie.value(), "value1");
    assert!(
        client
            .filter_cookie(&httpbin_base(), "name3")
            .await
            .is_err()
    );

    let sent = sent_cookies(&client, Vec::new()).await;
    assert!(sent.contains("name1=value1"));
    assert!(sent.contains("name2=value2"));
}

#[async_std::test]
async fn test_explicit_cookies_come_first() {
    let client = Client::new();
    client
        .get(httpbin_uri("/cookies/set?stored=1"), [])
        .await
        .resolve()
        .unwrap();

    let sent = sent_cookies(
        &client,
        vec![with_cookies([Cookie::new("a", "1"), Cookie::new("b", "2")])],
    )
    .await;
    assert_eq!(sent, "a=1; b=2; stored=1");
}

#[async_std::test]
async fn test_disabled_jar_sends_nothing() {
    let client = Client::builder().cookie_store(false).build();
    client
        .get(httpbin_uri("/cookies/set?name1=value1"), [])
        .await
        .resolve()
        .unwrap();

    assert_eq!(sent_cookies(&client, Vec::new()).await, "");
    assert!(client.filter_cookies(&httpbin_base()).await.unwrap().is_empty());
}

#[async_std::test]
async fn test_shared_jar() {
    let jar = Arc::new(CookieJar::new());
    let first = Client::builder().cookie_jar(Arc::clone(&jar)).build();
    let second = Client::builder().cookie_jar(Arc::clone(&jar)).build();

    first
        .get(httpbin_uri("/cookies/set?shared=yes"), [])
        .await
        .resolve()
        .unwrap();
    assert_eq!(sent_cookies(&second, Vec::new()).await, "shared=yes");

    jar.clear().await;
    assert_eq!(sent_cookies(&second, Vec::new()).await, "");
}
