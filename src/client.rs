//! The HTTP client and its builder.

use core::fmt;
use std::{sync::Arc, time::Duration};

use cookie::Cookie;
use http::{HeaderValue, Method};
use url::Url;

use crate::{
    CookieJar, CurlBackend, RedirectPolicy, Request, RequestOption, Response, Result, Transport,
    TransportConfig,
    dispatch::dispatch,
    error::{BodyErrorKind, InvalidRequestKind},
    request::prepare,
};

const DEFAULT_USER_AGENT: &str = concat!("chainwave/", env!("CARGO_PKG_VERSION"));

/// HTTP client holding a connection pool, a cookie jar and default options.
///
/// Cloning is cheap; clones share all state.
///
/// ```no_run
/// use chainwave::{Client, Params, with_query};
///
/// # async fn run() -> chainwave::Result<()> {
/// let client = Client::new();
/// let text = client
///     .get("http://httpbin.org/get", [with_query(Params::from([("key1", "value1")]))])
///     .await
///     .ensure_status_2xx()
///     .text()
///     .await?;
/// # let _ = text;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Box<dyn Transport>,
    jar: Option<Arc<CookieJar>>,
    redirect: RedirectPolicy,
    user_agent: HeaderValue,
    defaults: async_lock::RwLock<Vec<RequestOption>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("cookie_store", &self.inner.jar.is_some())
            .field("redirect", &self.inner.redirect)
            .field("user_agent", &self.inner.user_agent)
            .finish_non_exhaustive()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// A client with default settings and an empty cookie jar.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a client.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Prepare and send a request.
    ///
    /// The client's default options run first, then `options` in order. The
    /// first failure is latched on the returned [`Response`] and nothing is
    /// sent.
    pub async fn request(
        &self,
        method: impl AsRef<str>,
        url: impl AsRef<str>,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Response {
        let options: Vec<RequestOption> = options.into_iter().collect();
        let prepared = prepare(
            method.as_ref(),
            url.as_ref(),
            &self.inner.user_agent,
            &self.inner.defaults,
            &options,
        )
        .await;
        match prepared {
            Ok(request) => self.send(request).await,
            Err(err) => Response::from(err),
        }
    }

    /// Send a request prepared by hand. Default options are not applied.
    pub async fn send(&self, request: Request) -> Response {
        let inner = &*self.inner;
        Response::from(
            dispatch(
                inner.transport.as_ref(),
                inner.jar.as_deref(),
                &inner.redirect,
                request,
            )
            .await,
        )
    }

    /// Send a `GET` request.
    pub async fn get(
        &self,
        url: impl AsRef<str>,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Response {
        self.request(Method::GET, url, options).await
    }

    /// Send a `HEAD` request.
    pub async fn head(
        &self,
        url: impl AsRef<str>,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Response {
        self.request(Method::HEAD, url, options).await
    }

    /// Send a `POST` request.
    pub async fn post(
        &self,
        url: impl AsRef<str>,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Response {
        self.request(Method::POST, url, options).await
    }

    /// Send a `PUT` request.
    pub async fn put(
        &self,
        url: impl AsRef<str>,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Response {
        self.request(Method::PUT, url, options).await
    }

    /// Send a `PATCH` request.
    pub async fn patch(
        &self,
        url: impl AsRef<str>,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Response {
        self.request(Method::PATCH, url, options).await
    }

    /// Send a `DELETE` request.
    pub async fn delete(
        &self,
        url: impl AsRef<str>,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Response {
        self.request(Method::DELETE, url, options).await
    }

    /// Send a `CONNECT` request.
    pub async fn connect(
        &self,
        url: impl AsRef<str>,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Response {
        self.request(Method::CONNECT, url, options).await
    }

    /// Send an `OPTIONS` request.
    pub async fn options(
        &self,
        url: impl AsRef<str>,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Response {
        self.request(Method::OPTIONS, url, options).await
    }

    /// Send a `TRACE` request.
    pub async fn trace(
        &self,
        url: impl AsRef<str>,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Response {
        self.request(Method::TRACE, url, options).await
    }

    /// Replace the default options.
    pub async fn set_default_options(&self, options: impl IntoIterator<Item = RequestOption>) {
        let options: Vec<RequestOption> = options.into_iter().collect();
        *self.inner.defaults.write().await = options;
    }

    /// Append to the default options.
    pub async fn add_default_options(&self, options: impl IntoIterator<Item = RequestOption>) {
        let options: Vec<RequestOption> = options.into_iter().collect();
        self.inner.defaults.write().await.extend(options);
    }

    /// Remove every default option.
    pub async fn clear_default_options(&self) {
        self.inner.defaults.write().await.clear();
    }

    /// Snapshot of the default options.
    pub async fn default_options(&self) -> Vec<RequestOption> {
        self.inner.defaults.read().await.clone()
    }

    /// The cookie jar, unless cookies are disabled.
    #[must_use]
    pub fn cookie_jar(&self) -> Option<&Arc<CookieJar>> {
        self.inner.jar.as_ref()
    }

    /// Cookies the jar would send to `url`. Empty when cookies are disabled.
    ///
    /// # Errors
    ///
    /// Fails when `url` is not a valid URL.
    pub async fn filter_cookies(&self, url: &str) -> Result<Vec<Cookie<'static>>> {
        let url = Url::parse(url).map_err(|source| InvalidRequestKind::Url {
            url: url.to_owned(),
            source,
        })?;
        match &self.inner.jar {
            Some(jar) => Ok(jar.cookies(&url).await),
            None => Ok(Vec::new()),
        }
    }

    /// The cookie named `name` the jar would send to `url`.
    ///
    /// # Errors
    ///
    /// Fails when `url` is invalid or no such cookie is stored.
    pub async fn filter_cookie(&self, url: &str, name: &str) -> Result<Cookie<'static>> {
        self.filter_cookies(url)
            .await?
            .into_iter()
            .find(|cookie| cookie.name() == name)
            .ok_or_else(|| BodyErrorKind::MissingCookie(name.to_owned()).into())
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    config: TransportConfig,
    transport: Option<Box<dyn Transport>>,
    cookie_store: bool,
    jar: Option<Arc<CookieJar>>,
    redirect: RedirectPolicy,
    user_agent: HeaderValue,
    defaults: Vec<RequestOption>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .field("cookie_store", &self.cookie_store)
            .field("redirect", &self.redirect)
            .field("user_agent", &self.user_agent)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Default settings: cookies enabled, at most 10 redirects.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
            transport: None,
            cookie_store: true,
            jar: None,
            redirect: RedirectPolicy::default(),
            user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
            defaults: Vec::new(),
        }
    }

    /// Replace all transport settings.
    #[must_use]
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Send through a custom transport. Transport settings are then ignored.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// See [`TransportConfig::dial_timeout`].
    #[must_use]
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.dial_timeout(timeout);
        self
    }

    /// See [`TransportConfig::keep_alive`].
    #[must_use]
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.config = self.config.keep_alive(interval);
        self
    }

    /// See [`TransportConfig::max_idle_connections`].
    #[must_use]
    pub fn max_idle_connections(mut self, max: usize) -> Self {
        self.config = self.config.max_idle_connections(max);
        self
    }

    /// See [`TransportConfig::idle_timeout`].
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.idle_timeout(timeout);
        self
    }

    /// See [`TransportConfig::tls_handshake_timeout`].
    #[must_use]
    pub fn tls_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.tls_handshake_timeout(timeout);
        self
    }

    /// See [`TransportConfig::request_timeout`].
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.request_timeout(timeout);
        self
    }

    /// Enable or disable the cookie jar.
    #[must_use]
    pub const fn cookie_store(mut self, enable: bool) -> Self {
        self.cookie_store = enable;
        self
    }

    /// Use `jar`, possibly shared with other clients. Enables cookies.
    #[must_use]
    pub fn cookie_jar(mut self, jar: Arc<CookieJar>) -> Self {
        self.jar = Some(jar);
        self.cookie_store = true;
        self
    }

    /// Redirect policy.
    #[must_use]
    pub fn redirect(mut self, policy: RedirectPolicy) -> Self {
        self.redirect = policy;
        self
    }

    /// Baseline `User-Agent` header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: HeaderValue) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Options applied to every request before the per-call ones.
    #[must_use]
    pub fn default_options(mut self, options: impl IntoIterator<Item = RequestOption>) -> Self {
        self.defaults.extend(options);
        self
    }

    /// Build the client.
    #[must_use]
    pub fn build(self) -> Client {
        let transport = self
            .transport
            .unwrap_or_else(|| Box::new(CurlBackend::new(self.config)));
        let jar = self
            .cookie_store
            .then(|| self.jar.unwrap_or_default());
        Client {
            inner: Arc::new(Inner {
                transport,
                jar,
                redirect: self.redirect,
                user_agent: self.user_agent,
                defaults: async_lock::RwLock::new(self.defaults),
            }),
        }
    }
}
