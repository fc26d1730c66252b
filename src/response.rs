//! Responses and the deferred-error decoding chain.
//!
//! Sending a request never fails eagerly. Whatever happened is latched on a
//! [`Response`], and every chained operation first checks for a latched
//! error. The first error wins; later steps do no work and hand it back.
//!
//! ```no_run
//! # async fn run() -> chainwave::Result<()> {
//! let body: serde_json::Value = chainwave::get("http://httpbin.org/get", [])
//!     .await
//!     .ensure_status_ok()
//!     .json()
//!     .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

use core::{
    fmt,
    pin::Pin,
    task::{Context as TaskContext, Poll},
};
use std::{
    io::{self, Read},
    path::Path,
};

use bytes::{Bytes, BytesMut};
use cookie::Cookie;
use futures_channel::mpsc;
use futures_util::{AsyncWrite, AsyncWriteExt, Stream, StreamExt};
use http::{HeaderMap, StatusCode, header};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    Result,
    error::{BodyErrorKind, Error, ExpectedStatus},
};

/// Streamed body of a response.
///
/// Dropping the body before it is exhausted aborts the transfer.
pub struct ResponseBody {
    receiver: mpsc::Receiver<Result<Bytes>>,
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

impl ResponseBody {
    pub(crate) const fn new(receiver: mpsc::Receiver<Result<Bytes>>) -> Self {
        Self { receiver }
    }

    /// A body with no content.
    #[must_use]
    pub fn empty() -> Self {
        let (_, receiver) = mpsc::channel(0);
        Self { receiver }
    }

    /// Read the whole body into memory.
    ///
    /// # Errors
    ///
    /// Fails when the transfer breaks before the body is complete.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Copy the body into `writer`, returning the number of bytes copied.
    ///
    /// # Errors
    ///
    /// Read failures are body read errors; write failures are save errors.
    pub async fn copy_to<W>(mut self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut copied = 0;
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .await
                .map_err(BodyErrorKind::Save)?;
            copied += chunk.len() as u64;
        }
        writer.flush().await.map_err(BodyErrorKind::Save)?;
        Ok(copied)
    }

    /// Blocking reader over the body.
    ///
    /// Reads park the current thread, so use it from a blocking context only.
    #[must_use]
    pub fn into_blocking_reader(self) -> BlockingBody {
        BlockingBody {
            body: self,
            pending: Bytes::new(),
            error: None,
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        let (mut sender, receiver) = mpsc::channel(1);
        if !bytes.is_empty() {
            // A fresh channel always has room for one message.
            let _ = sender.try_send(Ok(bytes));
        }
        Self { receiver }
    }
}

impl Stream for ResponseBody {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}

/// Blocking [`Read`] adapter returned by [`ResponseBody::into_blocking_reader`].
#[derive(Debug)]
pub struct BlockingBody {
    body: ResponseBody,
    pending: Bytes,
    error: Option<Error>,
}

impl BlockingBody {
    /// The error that broke the stream, if a read failed.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }
}

impl Read for BlockingBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match async_io::block_on(self.body.next()) {
                Some(Ok(chunk)) => self.pending = chunk,
                Some(Err(err)) => {
                    let message = err.to_string();
                    self.error = Some(err);
                    return Err(io::Error::other(message));
                }
                None => return Ok(0),
            }
        }
        let len = self.pending.len().min(buf.len());
        buf[..len].copy_from_slice(&self.pending.split_to(len));
        Ok(len)
    }
}

/// Status line, headers and streamed body of a response.
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    body: ResponseBody,
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl RawResponse {
    /// Assemble a response. Used by [`Transport`](crate::Transport) implementations.
    #[must_use]
    pub const fn new(status: StatusCode, headers: HeaderMap, url: Url, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            url,
            body,
        }
    }

    /// Response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// URL of the request that produced this response, after redirects.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Declared body length.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(header::CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    }

    /// Cookies set by this response. Malformed `Set-Cookie` headers are skipped.
    #[must_use]
    pub fn cookies(&self) -> Vec<Cookie<'static>> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| Cookie::parse(value.to_owned()).ok())
            .collect()
    }

    /// The cookie named `name`, if this response set one.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<Cookie<'static>> {
        self.cookies()
            .into_iter()
            .find(|cookie| cookie.name() == name)
    }

    /// Take the body out of the response.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}

/// Outcome of a request: a response handle, a latched error, or both.
///
/// Both are present only after a failed status assertion, which keeps the
/// handle so the caller can still inspect it.
#[derive(Debug)]
#[must_use = "a response does nothing until it is decoded or resolved"]
pub struct Response {
    response: Option<RawResponse>,
    error: Option<Error>,
}

impl From<Result<RawResponse>> for Response {
    fn from(result: Result<RawResponse>) -> Self {
        match result {
            Ok(response) => Self {
                response: Some(response),
                error: None,
            },
            Err(error) => Self {
                response: None,
                error: Some(error),
            },
        }
    }
}

impl From<Error> for Response {
    fn from(error: Error) -> Self {
        Self::from(Err::<RawResponse, _>(error))
    }
}

impl From<RawResponse> for Response {
    fn from(response: RawResponse) -> Self {
        Self::from(Ok(response))
    }
}

impl Response {
    /// The response handle, or the latched error.
    ///
    /// # Errors
    ///
    /// Returns the latched error when there is one.
    pub fn resolve(self) -> Result<RawResponse> {
        match (self.response, self.error) {
            (_, Some(error)) => Err(error),
            (Some(response), None) => Ok(response),
            (None, None) => Err(BodyErrorKind::Consumed.into()),
        }
    }

    /// The response handle and the latched error, unchanged.
    #[must_use]
    pub fn into_parts(self) -> (Option<RawResponse>, Option<Error>) {
        (self.response, self.error)
    }

    /// The latched error.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// The response handle.
    #[must_use]
    pub const fn raw_response(&self) -> Option<&RawResponse> {
        self.response.as_ref()
    }

    /// Whether no error is latched.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Status of the response handle, if there is one.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(RawResponse::status)
    }

    /// Read the whole body.
    ///
    /// # Errors
    ///
    /// Returns the latched error, or a body read failure.
    pub async fn raw(self) -> Result<Bytes> {
        self.resolve()?.into_body().bytes().await
    }

    /// Read the whole body as text. Invalid UTF-8 is replaced, never rejected.
    ///
    /// # Errors
    ///
    /// Returns the latched error, or a body read failure.
    pub async fn text(self) -> Result<String> {
        let bytes = self.raw().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decode the body as JSON while it streams in.
    ///
    /// # Errors
    ///
    /// Returns the latched error, a body read failure, or a decode failure.
    pub async fn json<T>(self) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let body = self.resolve()?.into_body();
        blocking::unblock(move || {
            let mut reader = body.into_blocking_reader();
            serde_json::from_reader(&mut reader).map_err(|err| {
                reader
                    .take_error()
                    .unwrap_or_else(|| BodyErrorKind::Json(err).into())
            })
        })
        .await
    }

    /// Latch a status mismatch unless the status is exactly `code`.
    pub fn ensure_status(self, code: StatusCode) -> Self {
        self.ensure(ExpectedStatus::Code(code))
    }

    /// Latch a status mismatch unless the status is `200 OK`.
    pub fn ensure_status_ok(self) -> Self {
        self.ensure_status(StatusCode::OK)
    }

    /// Latch a status mismatch unless the status is a 2xx.
    pub fn ensure_status_2xx(self) -> Self {
        self.ensure(ExpectedStatus::Success)
    }

    fn ensure(mut self, expected: ExpectedStatus) -> Self {
        if self.error.is_some() {
            return self;
        }
        if let Some(actual) = self.status()
            && !expected.matches(actual)
        {
            self.error = Some(Error::StatusMismatch { expected, actual });
        }
        self
    }

    /// Write the body to `path`, creating or truncating the file.
    ///
    /// # Errors
    ///
    /// Returns the latched error, a body read failure, or a save failure.
    pub async fn save(self, path: impl AsRef<Path>) -> Result<()> {
        let body = self.resolve()?.into_body();
        let mut file = async_fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(BodyErrorKind::Save)?;
        body.copy_to(&mut file).await?;
        Ok(())
    }

    /// Cookies set by the response.
    ///
    /// # Errors
    ///
    /// Returns the latched error.
    pub fn cookies(self) -> Result<Vec<Cookie<'static>>> {
        Ok(self.resolve()?.cookies())
    }

    /// The cookie named `name`.
    ///
    /// # Errors
    ///
    /// Returns the latched error, or a body error when no such cookie was set.
    pub fn cookie(self, name: &str) -> Result<Cookie<'static>> {
        self.resolve()?
            .cookie(name)
            .ok_or_else(|| BodyErrorKind::MissingCookie(name.to_owned()).into())
    }
}
