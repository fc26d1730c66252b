use std::{
    fmt,
    io::{self, Read, SeekFrom},
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use curl::easy::{Easy2, Handler, List, ReadError, SeekResult, WriteError};
use futures_channel::{mpsc, oneshot};
use futures_util::{SinkExt, future::BoxFuture};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use tracing::{debug, trace, warn};

use super::{Transport, TransportConfig};
use crate::{
    Context, RawResponse, Request, Result,
    error::{BodyErrorKind, Error, TransportErrorKind},
    request::BodyReader,
    response::ResponseBody,
};

/// Response chunks buffered ahead of the reader.
const BODY_CAPACITY: usize = 16;

/// HTTP transport implemented with libcurl.
///
/// Each exchange runs on the blocking thread pool. Easy handles are pooled
/// so that their connection caches are reused across requests.
pub struct CurlBackend {
    config: TransportConfig,
    pool: Arc<Pool>,
}

impl fmt::Debug for CurlBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurlBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for CurlBackend {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl CurlBackend {
    /// Create a backend with the given settings.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        let pool = Pool {
            idle: async_lock::Mutex::new(Vec::new()),
            max_idle: config.get_max_idle_connections(),
            idle_timeout: config.get_idle_timeout(),
        };
        Self {
            config,
            pool: Arc::new(pool),
        }
    }

    /// Settings of this backend.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn send(&self, request: Request) -> Result<RawResponse> {
        let context = request.context().cloned();
        if let Some(err) = context.as_ref().and_then(Context::err) {
            return Err(TransportErrorKind::from(err).into());
        }

        let url = request.url().clone();
        let prepared = Prepared::new(&request, &self.config, context.as_ref());
        let (reader, producer) = request.into_body().into_reader();
        let producer =
            producer.map(|producer| blocking::unblock(move || async_io::block_on(producer)));

        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_CAPACITY);
        let transfer = Transfer {
            reader,
            read_error: None,
            context,
            deadline_bound: prepared.deadline_bound,
            decode: prepared.decode,
            status: None,
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_tx,
        };

        let easy = self.pool.checkout().await;
        trace!(reused = easy.is_some(), "checked out curl handle");
        let pool = Arc::clone(&self.pool);
        blocking::unblock(move || {
            let mut easy = easy.unwrap_or_else(|| Easy2::new(Exchange::default()));
            perform(&mut easy, &prepared, transfer);
            pool.checkin(easy);
        })
        .detach();

        let head = head_rx.await.unwrap_or_else(|_| {
            let reason = "transfer ended without a response".to_owned();
            Err(TransportErrorKind::MalformedResponse(reason).into())
        });

        match (head, producer) {
            (Ok(head), producer) => {
                if let Some(producer) = producer {
                    producer.detach();
                }
                Ok(RawResponse::new(
                    head.status,
                    head.headers,
                    url,
                    ResponseBody::new(body_rx),
                ))
            }
            // The producer knows why the body broke better than curl does.
            (Err(err), Some(producer)) => match producer.await {
                Err(source) => {
                    warn!(error = %source, "request body producer failed");
                    Err(TransportErrorKind::BodyWrite(source).into())
                }
                Ok(()) => Err(err),
            },
            (Err(err), None) => Err(err),
        }
    }
}

impl Transport for CurlBackend {
    fn execute(&self, request: Request) -> BoxFuture<'_, Result<RawResponse>> {
        Box::pin(self.send(request))
    }
}

struct Pool {
    idle: async_lock::Mutex<Vec<Idle>>,
    max_idle: usize,
    idle_timeout: Duration,
}

struct Idle {
    easy: Easy2<Exchange>,
    since: Instant,
}

impl Pool {
    async fn checkout(&self) -> Option<Easy2<Exchange>> {
        let mut idle = self.idle.lock().await;
        let timeout = self.idle_timeout;
        idle.retain(|entry| entry.since.elapsed() < timeout);
        idle.pop().map(|entry| entry.easy)
    }

    /// Called from the blocking pool once a transfer is over.
    fn checkin(&self, easy: Easy2<Exchange>) {
        if self.max_idle == 0 {
            return;
        }
        let mut idle = self.idle.lock_blocking();
        if idle.len() < self.max_idle {
            idle.push(Idle {
                easy,
                since: Instant::now(),
            });
        }
    }
}

/// Everything the blocking side needs to configure a handle.
struct Prepared {
    method: Method,
    url: String,
    header_lines: Vec<String>,
    upload: bool,
    content_length: Option<u64>,
    connect_timeout: Duration,
    timeout: Option<Duration>,
    deadline_bound: bool,
    decode: bool,
    keep_alive: Duration,
    idle_timeout: Duration,
}

impl Prepared {
    fn new(request: &Request, config: &TransportConfig, context: Option<&Context>) -> Self {
        let mut connect_timeout = config.get_dial_timeout();
        if request.url().scheme() == "https" {
            connect_timeout += config.get_tls_handshake_timeout();
        }

        let request_timeout = config.get_request_timeout();
        let mut timeout = (!request_timeout.is_zero()).then_some(request_timeout);
        let mut deadline_bound = false;
        if let Some(remaining) = context.and_then(Context::remaining)
            && timeout.is_none_or(|limit| remaining < limit)
        {
            timeout = Some(remaining);
            deadline_bound = true;
        }
        // libcurl treats zero as "no limit".
        let timeout = timeout.map(|limit| limit.max(Duration::from_millis(1)));

        let mut header_lines: Vec<String> = request
            .headers()
            .iter()
            .filter(|(name, _)| **name != header::CONTENT_LENGTH)
            .map(|(name, value)| header_line(name, value))
            .collect();
        header_lines.push("Expect:".to_owned());

        let method = request.method().clone();
        let content_length = request.content_length();
        let upload = content_length != Some(0)
            || method == Method::POST
            || method == Method::PUT
            || method == Method::PATCH;

        Self {
            method,
            url: request.url().to_string(),
            header_lines,
            upload,
            content_length,
            connect_timeout,
            timeout,
            deadline_bound,
            decode: !request.headers().contains_key(header::ACCEPT_ENCODING),
            keep_alive: config.get_keep_alive(),
            idle_timeout: config.get_idle_timeout(),
        }
    }
}

fn header_line(name: &HeaderName, value: &HeaderValue) -> String {
    let value = String::from_utf8_lossy(value.as_bytes());
    if value.is_empty() {
        // `Name:` would remove the header from the request.
        format!("{name};")
    } else {
        format!("{name}: {value}")
    }
}

fn configure(easy: &mut Easy2<Exchange>, prepared: &Prepared) -> Result<(), curl::Error> {
    easy.reset();
    easy.url(&prepared.url)?;

    if prepared.method == Method::HEAD {
        easy.nobody(true)?;
    } else if prepared.method == Method::GET && !prepared.upload {
        easy.get(true)?;
    } else {
        easy.custom_request(prepared.method.as_str())?;
    }

    if prepared.upload {
        easy.upload(true)?;
        if let Some(len) = prepared.content_length {
            easy.in_filesize(len)?;
        }
    }

    let mut list = List::new();
    for line in &prepared.header_lines {
        list.append(line)?;
    }
    easy.http_headers(list)?;

    if prepared.decode {
        easy.accept_encoding("")?;
    }

    easy.follow_location(false)?;
    easy.connect_timeout(prepared.connect_timeout)?;
    if let Some(timeout) = prepared.timeout {
        easy.timeout(timeout)?;
    }
    if !prepared.keep_alive.is_zero() {
        easy.tcp_keepalive(true)?;
        easy.tcp_keepidle(prepared.keep_alive)?;
        easy.tcp_keepintvl(prepared.keep_alive)?;
    }
    if !prepared.idle_timeout.is_zero() {
        easy.maxage_conn(prepared.idle_timeout)?;
    }
    easy.progress(true)?;
    Ok(())
}

fn perform(easy: &mut Easy2<Exchange>, prepared: &Prepared, transfer: Transfer) {
    easy.get_mut().transfer = Some(transfer);
    let result = configure(easy, prepared).and_then(|()| easy.perform());
    if let Some(transfer) = easy.get_mut().transfer.take() {
        transfer.finish(result);
    }
}

#[derive(Debug)]
struct Head {
    status: StatusCode,
    headers: HeaderMap,
}

/// State of the exchange currently running on a handle.
struct Transfer {
    reader: BodyReader,
    read_error: Option<io::Error>,
    context: Option<Context>,
    deadline_bound: bool,
    decode: bool,
    status: Option<StatusCode>,
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<Result<Head>>>,
    body_tx: mpsc::Sender<Result<Bytes>>,
}

impl Transfer {
    fn header_line(&mut self, data: &[u8]) {
        let line = data.trim_ascii_end();

        if line.is_empty() {
            match self.status {
                Some(status) if status.is_informational() => {
                    self.status = None;
                    self.headers.clear();
                }
                Some(status) => self.send_head(status),
                None => {}
            }
            return;
        }

        if let Some(rest) = line.strip_prefix(b"HTTP/") {
            self.status = rest
                .split(|byte| *byte == b' ')
                .filter(|part| !part.is_empty())
                .nth(1)
                .and_then(|code| StatusCode::from_bytes(code).ok());
            self.headers.clear();
            return;
        }

        if let Some(colon) = line.iter().position(|byte| *byte == b':')
            && let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(line[..colon].trim_ascii()),
                HeaderValue::from_bytes(line[colon + 1..].trim_ascii()),
            )
        {
            self.headers.append(name, value);
        }
    }

    fn send_head(&mut self, status: StatusCode) {
        let Some(head_tx) = self.head_tx.take() else {
            return;
        };
        let mut headers = std::mem::take(&mut self.headers);
        // libcurl decodes the body it asked to be compressed.
        if self.decode && headers.remove(header::CONTENT_ENCODING).is_some() {
            headers.remove(header::CONTENT_LENGTH);
        }
        let _ = head_tx.send(Ok(Head { status, headers }));
    }

    fn should_abort(&self) -> bool {
        self.context.as_ref().is_some_and(Context::is_done)
            || self.head_tx.as_ref().is_some_and(oneshot::Sender::is_canceled)
    }

    fn classify(&mut self, err: curl::Error) -> Error {
        if let Some(source) = self.read_error.take() {
            return TransportErrorKind::BodyWrite(source).into();
        }
        if let Some(done) = self.context.as_ref().and_then(Context::err) {
            return TransportErrorKind::from(done).into();
        }
        let kind = if err.is_operation_timedout() {
            if self.deadline_bound {
                TransportErrorKind::DeadlineExceeded
            } else {
                TransportErrorKind::Timeout
            }
        } else if err.is_couldnt_connect()
            || err.is_couldnt_resolve_host()
            || err.is_couldnt_resolve_proxy()
        {
            TransportErrorKind::Connect(err)
        } else if err.is_ssl_connect_error()
            || err.is_peer_failed_verification()
            || err.is_ssl_certproblem()
            || err.is_ssl_cacert()
        {
            TransportErrorKind::Tls(err)
        } else {
            TransportErrorKind::Curl(err)
        };
        kind.into()
    }

    fn finish(mut self, result: Result<(), curl::Error>) {
        let error: Error = match result {
            Ok(()) if self.head_tx.is_some() => {
                TransportErrorKind::MalformedResponse("missing status line".into()).into()
            }
            Ok(()) => return,
            Err(err) => self.classify(err),
        };
        debug!(error = %error, "curl transfer failed");

        if let Some(head_tx) = self.head_tx.take() {
            let _ = head_tx.send(Err(error));
        } else {
            let error: Error = BodyErrorKind::Read(io::Error::other(error)).into();
            let _ = async_io::block_on(self.body_tx.send(Err(error)));
        }
    }
}

/// Handler installed on pooled easy handles.
#[derive(Default)]
struct Exchange {
    transfer: Option<Transfer>,
}

impl Handler for Exchange {
    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        let Some(transfer) = self.transfer.as_mut() else {
            return Ok(0);
        };
        let chunk = Bytes::copy_from_slice(data);
        if async_io::block_on(transfer.body_tx.send(Ok(chunk))).is_err() {
            // Reader is gone; a short write aborts the transfer.
            return Ok(0);
        }
        Ok(data.len())
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize, ReadError> {
        let Some(transfer) = self.transfer.as_mut() else {
            return Ok(0);
        };
        match transfer.reader.read(data) {
            Ok(len) => Ok(len),
            Err(err) => {
                transfer.read_error = Some(err);
                Err(ReadError::Abort)
            }
        }
    }

    fn seek(&mut self, whence: SeekFrom) -> SeekResult {
        match (whence, self.transfer.as_mut()) {
            (SeekFrom::Start(0), Some(transfer)) => {
                if transfer.reader.rewind() {
                    SeekResult::Ok
                } else {
                    SeekResult::CantSeek
                }
            }
            _ => SeekResult::CantSeek,
        }
    }

    fn header(&mut self, data: &[u8]) -> bool {
        if let Some(transfer) = self.transfer.as_mut() {
            transfer.header_line(data);
        }
        true
    }

    fn progress(&mut self, _dltotal: f64, _dlnow: f64, _ultotal: f64, _ulnow: f64) -> bool {
        self.transfer
            .as_ref()
            .is_none_or(|transfer| !transfer.should_abort())
    }
}
