//! Request options.
//!
//! A [`RequestOption`] is one independently-fallible mutation of an outgoing
//! [`Request`]. Options are plain data: they can be cloned, stored as client
//! defaults and applied to any number of requests.
//!
//! Header and query options overwrite per key, so applying one twice has the
//! same effect as applying it once. Body options replace whatever body was
//! set before them.

use core::fmt;
use std::{collections::HashSet, sync::Arc};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use cookie::Cookie;
use http::{
    HeaderValue,
    header::{self, HeaderName},
};
use serde::Serialize;

use crate::{
    Context, FileField, Params, Request, Result,
    error::OptionErrorKind,
    json, multipart,
    value::check_file,
};

/// User-defined option body.
#[derive(Clone)]
pub struct CustomOption(Arc<dyn Fn(&mut Request) -> anyhow::Result<()> + Send + Sync>);

impl fmt::Debug for CustomOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomOption(..)")
    }
}

/// A transformation applied to an outgoing request.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum RequestOption {
    /// Override the `Host` header.
    Host(String),
    /// Set each header.
    Headers(Params),
    /// Set each query parameter.
    Query(Params),
    /// Raw body with an optional content type.
    Raw {
        /// Payload
        body: Bytes,
        /// `Content-Type`, skipped when empty
        content_type: String,
    },
    /// Plain text body.
    Text(String),
    /// URL-encoded form body.
    Form(Params),
    /// JSON body, encoded when the option is built.
    Json(Result<Bytes, Arc<serde_json::Error>>),
    /// Streamed multipart body of files.
    Files(Vec<FileField>),
    /// Append cookies to the `Cookie` header.
    Cookies(Vec<Cookie<'static>>),
    /// HTTP basic authentication.
    BasicAuth {
        /// User name
        username: String,
        /// Password
        password: String,
    },
    /// Bearer token authentication.
    BearerToken(String),
    /// Attach a cancellation context. `None` is rejected.
    Context(Option<Context>),
    /// User-defined mutation.
    Custom(CustomOption),
}

impl RequestOption {
    /// Wrap a closure as an option. Errors it returns surface as
    /// [`OptionErrorKind::Custom`].
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&mut Request) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Custom(CustomOption(Arc::new(f)))
    }

    /// Short label used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Host(_) => "host",
            Self::Headers(_) => "headers",
            Self::Query(_) => "query",
            Self::Raw { .. } => "raw",
            Self::Text(_) => "text",
            Self::Form(_) => "form",
            Self::Json(_) => "json",
            Self::Files(_) => "files",
            Self::Cookies(_) => "cookies",
            Self::BasicAuth { .. } => "basic_auth",
            Self::BearerToken(_) => "bearer_token",
            Self::Context(_) => "context",
            Self::Custom(_) => "custom",
        }
    }

    /// Apply the option to `request`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Option`](crate::Error::Option) when a precondition
    /// of the option does not hold. `request` may be partially modified.
    pub async fn apply(&self, request: &mut Request) -> Result<()> {
        match self {
            Self::Host(host) => set_header(request, header::HOST, host)?,
            Self::Headers(headers) => {
                for (name, value) in headers.iter() {
                    let name = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|_| OptionErrorKind::InvalidHeader(name.to_owned()))?;
                    set_header(request, name, value)?;
                }
            }
            Self::Query(params) => request.set_query(params),
            Self::Raw { body, content_type } => {
                request.set_body_snapshot(body.clone());
                if !content_type.is_empty() {
                    set_header(request, header::CONTENT_TYPE, content_type)?;
                }
            }
            Self::Text(text) => {
                request.set_body_snapshot(text.clone());
                set_header(request, header::CONTENT_TYPE, "text/plain; charset=utf-8")?;
            }
            Self::Form(form) => {
                request.set_body_snapshot(form.encode());
                set_header(
                    request,
                    header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )?;
            }
            Self::Json(encoded) => {
                let body = encoded
                    .as_ref()
                    .map_err(|err| OptionErrorKind::Encode(err.clone()))?;
                request.set_body_snapshot(body.clone());
                set_header(request, header::CONTENT_TYPE, "application/json")?;
            }
            Self::Files(files) => {
                validate_files(files).await?;
                let boundary = multipart::boundary();
                set_header(
                    request,
                    header::CONTENT_TYPE,
                    &multipart::content_type(&boundary),
                )?;
                request.set_body(multipart::stream(files.clone(), boundary));
            }
            Self::Cookies(cookies) => add_cookies(request, cookies)?,
            Self::BasicAuth { username, password } => {
                let credentials = BASE64.encode(format!("{username}:{password}"));
                set_header(request, header::AUTHORIZATION, &format!("Basic {credentials}"))?;
            }
            Self::BearerToken(token) => {
                set_header(request, header::AUTHORIZATION, &format!("Bearer {token}"))?;
            }
            Self::Context(context) => {
                let context = context.clone().ok_or(OptionErrorKind::MissingContext)?;
                request.set_context(context);
            }
            Self::Custom(CustomOption(f)) => f(request).map_err(OptionErrorKind::Custom)?,
        }
        Ok(())
    }
}

fn set_header(request: &mut Request, name: HeaderName, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| OptionErrorKind::InvalidHeader(name.to_string()))?;
    request.headers_mut().insert(name, value);
    Ok(())
}

fn add_cookies(request: &mut Request, cookies: &[Cookie<'static>]) -> Result<()> {
    if cookies.is_empty() {
        return Ok(());
    }
    let mut pairs: Vec<String> = request
        .headers()
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(|value| vec![value.to_owned()])
        .unwrap_or_default();
    pairs.extend(
        cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name(), cookie.value())),
    );
    set_header(request, header::COOKIE, &pairs.join("; "))
}

async fn validate_files(files: &[FileField]) -> Result<()> {
    let mut seen = HashSet::with_capacity(files.len());
    for file in files {
        if !seen.insert(file.field_name()) {
            return Err(OptionErrorKind::DuplicateField(file.field_name().to_owned()).into());
        }
        check_file(file.path())
            .await
            .map_err(|source| OptionErrorKind::InvalidFile {
                field: file.field_name().to_owned(),
                source,
            })?;
    }
    Ok(())
}

/// Override the `Host` header.
pub fn with_host(host: impl Into<String>) -> RequestOption {
    RequestOption::Host(host.into())
}

/// Set request headers.
pub fn with_headers(headers: impl Into<Params>) -> RequestOption {
    RequestOption::Headers(headers.into())
}

/// Set query parameters.
pub fn with_query(params: impl Into<Params>) -> RequestOption {
    RequestOption::Query(params.into())
}

/// Send `body` as is, with `content_type` unless it is empty.
pub fn with_raw(body: impl Into<Bytes>, content_type: impl Into<String>) -> RequestOption {
    RequestOption::Raw {
        body: body.into(),
        content_type: content_type.into(),
    }
}

/// Send a plain text body.
pub fn with_text(text: impl Into<String>) -> RequestOption {
    RequestOption::Text(text.into())
}

/// Send a URL-encoded form body.
pub fn with_form(form: impl Into<Params>) -> RequestOption {
    RequestOption::Form(form.into())
}

/// Send `data` as a JSON body.
///
/// With `escape_html`, `<`, `>` and `&` inside strings are written as
/// unicode escapes. Encoding failures surface when the option is applied.
pub fn with_json<T: Serialize + ?Sized>(data: &T, escape_html: bool) -> RequestOption {
    RequestOption::Json(
        json::to_vec(data, escape_html)
            .map(Bytes::from)
            .map_err(Arc::new),
    )
}

/// Upload files as a streamed `multipart/form-data` body.
///
/// Field names must be distinct and every path must name a readable
/// regular file; both are checked before the body starts streaming.
pub fn with_files(files: impl IntoIterator<Item = FileField>) -> RequestOption {
    RequestOption::Files(files.into_iter().collect())
}

/// Append cookies to the `Cookie` header.
pub fn with_cookies<I, C>(cookies: I) -> RequestOption
where
    I: IntoIterator<Item = C>,
    C: Into<Cookie<'static>>,
{
    RequestOption::Cookies(cookies.into_iter().map(Into::into).collect())
}

/// Authenticate with HTTP basic authentication.
pub fn with_basic_auth(username: impl Into<String>, password: impl Into<String>) -> RequestOption {
    RequestOption::BasicAuth {
        username: username.into(),
        password: password.into(),
    }
}

/// Authenticate with a bearer token.
pub fn with_bearer_token(token: impl Into<String>) -> RequestOption {
    RequestOption::BearerToken(token.into())
}

/// Attach a cancellation context. Passing `None` fails the request.
pub fn with_context(context: impl Into<Option<Context>>) -> RequestOption {
    RequestOption::Context(context.into())
}
