//! Outgoing requests and the option pipeline that prepares them.

use core::fmt;
use std::{
    io::{self, Cursor, Read},
    sync::Arc,
};

use bytes::Bytes;
use futures_channel::mpsc;
use futures_util::{StreamExt, future::BoxFuture};
use http::{HeaderMap, HeaderValue, Method, header};
use tracing::trace;
use url::Url;

use crate::{
    Context, Params, RequestOption, Result,
    error::{Error, InvalidRequestKind},
};

/// Function producing a fresh copy of a request body.
pub type BodyFactory = Arc<dyn Fn() -> Body + Send + Sync>;

/// Future that fills a streamed body.
pub(crate) type Producer = BoxFuture<'static, io::Result<()>>;

/// Receiving end of a streamed body.
pub(crate) type PipeReceiver = mpsc::Receiver<io::Result<Bytes>>;

/// Body of an outgoing request.
///
/// A body is either empty, an in-memory snapshot, or a pipe filled by a
/// producer future while the transport reads it.
pub struct Body {
    kind: BodyKind,
}

enum BodyKind {
    Empty,
    Bytes(Bytes),
    Pipe {
        receiver: PipeReceiver,
        producer: Option<Producer>,
    },
}

impl Body {
    /// An empty body.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            kind: BodyKind::Empty,
        }
    }

    pub(crate) fn pipe(receiver: PipeReceiver, producer: Producer) -> Self {
        Self {
            kind: BodyKind::Pipe {
                receiver,
                producer: Some(producer),
            },
        }
    }

    /// Whether the body is known to be empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            BodyKind::Empty => true,
            BodyKind::Bytes(bytes) => bytes.is_empty(),
            BodyKind::Pipe { .. } => false,
        }
    }

    /// Length of the body, when known up front.
    #[must_use]
    pub fn len(&self) -> Option<u64> {
        match &self.kind {
            BodyKind::Empty => Some(0),
            BodyKind::Bytes(bytes) => Some(bytes.len() as u64),
            BodyKind::Pipe { .. } => None,
        }
    }

    /// Split into a blocking reader for the transport and the producer that
    /// must be driven concurrently, if any.
    pub(crate) fn into_reader(self) -> (BodyReader, Option<Producer>) {
        match self.kind {
            BodyKind::Empty => (BodyReader::Empty, None),
            BodyKind::Bytes(bytes) => (BodyReader::Bytes(Cursor::new(bytes)), None),
            BodyKind::Pipe { receiver, producer } => (
                BodyReader::Pipe {
                    receiver,
                    pending: Bytes::new(),
                },
                producer,
            ),
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BodyKind::Empty => f.write_str("Body::Empty"),
            BodyKind::Bytes(bytes) => f.debug_tuple("Body::Bytes").field(&bytes.len()).finish(),
            BodyKind::Pipe { .. } => f.write_str("Body::Pipe"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self {
            kind: BodyKind::Bytes(bytes),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

/// Blocking reader over a request body, used from the transport thread.
pub(crate) enum BodyReader {
    Empty,
    Bytes(Cursor<Bytes>),
    Pipe {
        receiver: PipeReceiver,
        pending: Bytes,
    },
}

impl BodyReader {
    /// Restart from the first byte. Streamed bodies cannot rewind.
    pub(crate) fn rewind(&mut self) -> bool {
        match self {
            Self::Empty => true,
            Self::Bytes(cursor) => {
                cursor.set_position(0);
                true
            }
            Self::Pipe { .. } => false,
        }
    }
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Empty => Ok(0),
            Self::Bytes(cursor) => cursor.read(buf),
            Self::Pipe { receiver, pending } => {
                while pending.is_empty() {
                    match async_io::block_on(receiver.next()) {
                        Some(Ok(chunk)) => *pending = chunk,
                        Some(Err(err)) => return Err(err),
                        None => return Ok(0),
                    }
                }
                let len = pending.len().min(buf.len());
                buf[..len].copy_from_slice(&pending.split_to(len));
                Ok(len)
            }
        }
    }
}

/// An outgoing HTTP request, mutated in place by request options.
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Body,
    content_length: Option<u64>,
    get_body: Option<BodyFactory>,
    context: Option<Context>,
}

impl Request {
    /// Create a request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::empty(),
            content_length: Some(0),
            get_body: None,
            context: None,
        }
    }

    /// Parse `method` and `url` into a request.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidRequest`] when the method is not a valid
    /// token, or the URL is not an absolute `http`/`https` URL with a host.
    pub fn parse(method: &str, url: &str) -> Result<Self> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| InvalidRequestKind::Method(method.to_owned()))?;
        let parsed = Url::parse(url).map_err(|source| InvalidRequestKind::Url {
            url: url.to_owned(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(InvalidRequestKind::UnsupportedUrl(url.to_owned()).into());
        }
        Ok(Self::new(method, parsed))
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Replace the HTTP method.
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    /// Target URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Mutable access to the target URL.
    pub const fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub const fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set each query parameter in `params`, replacing existing values for
    /// the same keys. The query is re-encoded sorted by key.
    pub fn set_query(&mut self, params: &Params) {
        let mut pairs: Vec<(String, String)> = self
            .url
            .query_pairs()
            .into_owned()
            .filter(|(key, _)| params.get(key).is_none())
            .collect();
        pairs.extend(params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        if pairs.is_empty() {
            self.url.set_query(None);
        } else {
            self.url.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }

    /// Current body.
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Take the body out, leaving an empty one.
    pub fn take_body(&mut self) -> Body {
        self.content_length = Some(0);
        core::mem::take(&mut self.body)
    }

    /// Declared body length. `None` means the body is streamed.
    #[must_use]
    pub const fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Replace the body with a one-shot stream.
    ///
    /// Any previously installed body factory is removed, since the new body
    /// cannot be replayed.
    pub fn set_body(&mut self, body: Body) {
        self.content_length = body.len();
        self.body = body;
        self.get_body = None;
    }

    /// Replace the body with an in-memory snapshot that can be replayed.
    pub fn set_body_snapshot(&mut self, bytes: impl Into<Bytes>) {
        let bytes = bytes.into();
        self.content_length = Some(bytes.len() as u64);
        self.body = Body::from(bytes.clone());
        self.get_body = Some(Arc::new(move || Body::from(bytes.clone())));
    }

    /// Install the function used to replay the body.
    pub fn set_body_factory(&mut self, factory: Option<BodyFactory>) {
        self.get_body = factory;
    }

    /// Function used to replay the body, if any.
    #[must_use]
    pub fn body_factory(&self) -> Option<&BodyFactory> {
        self.get_body.as_ref()
    }

    /// A fresh copy of the body, or `None` when the body cannot be replayed.
    #[must_use]
    pub fn regenerate_body(&self) -> Option<Body> {
        self.get_body.as_ref().map(|factory| factory())
    }

    /// Attached cancellation context.
    #[must_use]
    pub const fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Attach a cancellation context.
    pub fn set_context(&mut self, context: Context) {
        self.context = Some(context);
    }

    /// Copy everything but the body, which is left empty.
    pub(crate) fn clone_head(&self) -> Self {
        Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: Body::empty(),
            content_length: self.content_length,
            get_body: self.get_body.clone(),
            context: self.context.clone(),
        }
    }

    pub(crate) fn into_body(self) -> Body {
        self.body
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("content_length", &self.content_length)
            .field("replayable", &self.get_body.is_some())
            .field("context", &self.context)
            .finish()
    }
}

/// Run the option pipeline.
///
/// The method and URL are validated first, then the user agent is set, then
/// `defaults` are applied in order, then `options` in order. The first
/// failing option aborts the pipeline.
pub(crate) async fn prepare(
    method: &str,
    url: &str,
    user_agent: &HeaderValue,
    defaults: &async_lock::RwLock<Vec<RequestOption>>,
    options: &[RequestOption],
) -> Result<Request> {
    let mut request = Request::parse(method, url)?;
    request
        .headers_mut()
        .insert(header::USER_AGENT, user_agent.clone());

    {
        let defaults = defaults.read().await;
        apply_all(&mut request, &defaults).await?;
    }
    apply_all(&mut request, options).await?;
    Ok(request)
}

async fn apply_all(request: &mut Request, options: &[RequestOption]) -> Result<(), Error> {
    for option in options {
        trace!(option = option.name(), "applying request option");
        option.apply(request).await?;
    }
    Ok(())
}
