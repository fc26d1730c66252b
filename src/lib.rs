//! # Fluent HTTP requests
//! Chainwave is a small HTTP client built around two chains:
//! - Request options: independent, fallible mutations of an outgoing request
//!   (query, headers, cookies, text/form/JSON/multipart bodies, auth,
//!   cancellation), applied in order after the client's default options.
//! - Response decoding: status assertions and body materialization on a
//!   carrier that latches the first error, so a failing chain never panics
//!   and never does work past its first failure.
//!
//! Requests go through libcurl on the blocking thread pool; the futures
//! returned here run on any executor.
//!
//! # Quick start
//! ```rust,no_run
//! # async fn example() -> chainwave::Result<()> {
//! use chainwave::{Data, Params, with_json, with_query};
//!
//! let text = chainwave::get(
//!     "http://httpbin.org/get",
//!     [with_query(Params::from([("key1", "value1")]))],
//! )
//! .await
//! .ensure_status_ok()
//! .text()
//! .await?;
//! println!("{text}");
//!
//! let payload = Data::from([("msg", "hi&hello")]);
//! let echoed: serde_json::Value = chainwave::post("http://httpbin.org/post", [with_json(&payload, true)])
//!     .await
//!     .ensure_status_2xx()
//!     .json()
//!     .await?;
//! println!("{echoed}");
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod client;
mod context;
mod cookie_store;
mod dispatch;
pub mod error;
mod global;
mod json;
mod multipart;
mod option;
pub mod redirect;
mod request;
mod response;
mod value;

pub use backend::{CurlBackend, Transport, TransportConfig};
pub use bytes::Bytes;
pub use client::{Client, ClientBuilder};
pub use context::{Context, ContextError};
pub use cookie::Cookie;
pub use self::cookie_store::CookieJar;
pub use error::{Error, Result};
pub use global::{
    add_default_options, clear_default_options, connect, default_client, delete, filter_cookie,
    filter_cookies, get, head, options, patch, post, put, request, send, set_default_options,
    trace,
};
pub use http::{self, HeaderMap, HeaderValue, Method, StatusCode};
pub use option::{
    CustomOption, RequestOption, with_basic_auth, with_bearer_token, with_context, with_cookies,
    with_files, with_form, with_headers, with_host, with_json, with_query, with_raw, with_text,
};
pub use redirect::{RedirectAttempt, RedirectPolicy};
pub use request::{Body, BodyFactory, Request};
pub use response::{BlockingBody, RawResponse, Response, ResponseBody};
pub use url::Url;
pub use value::{Data, FileField, Params, check_file};

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
