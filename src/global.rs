//! Shortcuts bound to a process-wide default client.

use cookie::Cookie;
use once_cell::sync::Lazy;

use crate::{Client, Request, RequestOption, Response, Result};

static DEFAULT_CLIENT: Lazy<Client> = Lazy::new(Client::new);

/// The process-wide client used by the free functions of this crate.
///
/// It is built with default settings on first use.
pub fn default_client() -> &'static Client {
    &DEFAULT_CLIENT
}

/// Prepare and send a request with the default client.
pub async fn request(
    method: impl AsRef<str>,
    url: impl AsRef<str>,
    options: impl IntoIterator<Item = RequestOption>,
) -> Response {
    default_client().request(method, url, options).await
}

/// Send a prepared request with the default client.
pub async fn send(request: Request) -> Response {
    default_client().send(request).await
}

/// Send a `GET` request with the default client.
pub async fn get(
    url: impl AsRef<str>,
    options: impl IntoIterator<Item = RequestOption>,
) -> Response {
    default_client().get(url, options).await
}

/// Send a `HEAD` request with the default client.
pub async fn head(
    url: impl AsRef<str>,
    options: impl IntoIterator<Item = RequestOption>,
) -> Response {
    default_client().head(url, options).await
}

/// Send a `POST` request with the default client.
pub async fn post(
    url: impl AsRef<str>,
    options: impl IntoIterator<Item = RequestOption>,
) -> Response {
    default_client().post(url, options).await
}

/// Send a `PUT` request with the default client.
pub async fn put(
    url: impl AsRef<str>,
    options: impl IntoIterator<Item = RequestOption>,
) -> Response {
    default_client().put(url, options).await
}

/// Send a `PATCH` request with the default client.
pub async fn patch(
    url: impl AsRef<str>,
    options: impl IntoIterator<Item = RequestOption>,
) -> Response {
    default_client().patch(url, options).await
}

/// Send a `DELETE` request with the default client.
pub async fn delete(
    url: impl AsRef<str>,
    options: impl IntoIterator<Item = RequestOption>,
) -> Response {
    default_client().delete(url, options).await
}

/// Send a `CONNECT` request with the default client.
pub async fn connect(
    url: impl AsRef<str>,
    options: impl IntoIterator<Item = RequestOption>,
) -> Response {
    default_client().connect(url, options).await
}

/// Send an `OPTIONS` request with the default client.
pub async fn options(
    url: impl AsRef<str>,
    options: impl IntoIterator<Item = RequestOption>,
) -> Response {
    default_client().options(url, options).await
}

/// Send a `TRACE` request with the default client.
pub async fn trace(
    url: impl AsRef<str>,
    options: impl IntoIterator<Item = RequestOption>,
) -> Response {
    default_client().trace(url, options).await
}

/// Replace the default client's default options.
pub async fn set_default_options(options: impl IntoIterator<Item = RequestOption>) {
    default_client().set_default_options(options).await;
}

/// Append to the default client's default options.
pub async fn add_default_options(options: impl IntoIterator<Item = RequestOption>) {
    default_client().add_default_options(options).await;
}

/// Remove the default client's default options.
pub async fn clear_default_options() {
    default_client().clear_default_options().await;
}

/// Cookies the default client would send to `url`.
///
/// # Errors
///
/// Fails when `url` is not a valid URL.
pub async fn filter_cookies(url: &str) -> Result<Vec<Cookie<'static>>> {
    default_client().filter_cookies(url).await
}

/// The cookie named `name` the default client would send to `url`.
///
/// # Errors
///
/// Fails when `url` is invalid or no such cookie is stored.
pub async fn filter_cookie(url: &str, name: &str) -> Result<Cookie<'static>> {
    default_client().filter_cookie(url, name).await
}
