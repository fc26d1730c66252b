//! Client-side cookie jar.

use cookie::Cookie;
use http::{HeaderMap, header};
use once_cell::sync::Lazy;
use publicsuffix::List;
use tracing::warn;
use url::Url;

/// Public suffixes a `Domain` attribute may not name, parsed on first use.
static PUBLIC_SUFFIXES: Lazy<Option<List>> = Lazy::new(|| {
    match include_str!("public_suffix_list.dat").parse::<List>() {
        Ok(list) => Some(list),
        Err(err) => {
            warn!("public suffix list unusable, domain cookies are unchecked: {err}");
            None
        }
    }
});

/// Thread-safe cookie jar shared by every request of a client.
///
/// Cookies are scoped by domain and path the way browsers scope them, so a
/// request only sees the cookies set for its URL. Cookies whose `Domain`
/// names a public suffix such as `co.uk` are refused.
#[derive(Debug)]
pub struct CookieJar {
    store: async_lock::Mutex<::cookie_store::CookieStore>,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieJar {
    /// Create an empty jar.
    #[must_use]
    pub fn new() -> Self {
        let store = ::cookie_store::CookieStore::new_with_public_suffix(PUBLIC_SUFFIXES.clone());
        Self {
            store: async_lock::Mutex::new(store),
        }
    }

    /// Cookies that would be sent to `url`.
    pub async fn cookies(&self, url: &Url) -> Vec<Cookie<'static>> {
        let store = self.store.lock().await;
        store
            .matches(url)
            .into_iter()
            .map(|cookie| Cookie::from(cookie.clone()))
            .collect()
    }

    /// The `Cookie` header value for `url`, if any cookie matches.
    pub async fn header_value(&self, url: &Url) -> Option<String> {
        let store = self.store.lock().await;
        let pairs: Vec<String> = store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    /// Store every parseable `Set-Cookie` header of a response from `url`.
    pub async fn store_from_headers(&self, url: &Url, headers: &HeaderMap) {
        let cookies: Vec<Cookie<'static>> = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| Cookie::parse(value.to_owned()).ok())
            .collect();
        if cookies.is_empty() {
            return;
        }
        self.store
            .lock()
            .await
            .store_response_cookies(cookies.into_iter(), url);
    }

    /// Insert a cookie as if `url` had set it. Returns whether it was kept.
    pub async fn insert(&self, cookie: &Cookie<'_>, url: &Url) -> bool {
        self.store.lock().await.insert_raw(cookie, url).is_ok()
    }

    /// Remove every cookie.
    pub async fn clear(&self) {
        self.store.lock().await.clear();
    }
}
