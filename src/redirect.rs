//! Redirect handling.
//!
//! The transport never follows redirects itself. After each response the
//! dispatcher asks [`follow`] for the next hop and the client's
//! [`RedirectPolicy`] whether to take it.

use core::fmt;
use std::sync::Arc;

use http::{
    HeaderMap, Method, StatusCode,
    header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, LOCATION},
};
use url::Url;

use crate::{Request, Result, error::TransportErrorKind};

/// A redirect about to be followed.
#[derive(Debug, Clone, Copy)]
pub struct RedirectAttempt<'a> {
    status: StatusCode,
    next: &'a Url,
    previous: &'a [Url],
}

impl<'a> RedirectAttempt<'a> {
    pub(crate) const fn new(status: StatusCode, next: &'a Url, previous: &'a [Url]) -> Self {
        Self {
            status,
            next,
            previous,
        }
    }

    /// Status of the redirect response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Where the redirect points.
    #[must_use]
    pub const fn next(&self) -> &Url {
        self.next
    }

    /// URLs requested so far, oldest first.
    #[must_use]
    pub const fn previous(&self) -> &[Url] {
        self.previous
    }
}

type Check = dyn Fn(&RedirectAttempt<'_>) -> anyhow::Result<bool> + Send + Sync;

/// Decides whether redirects are followed.
#[derive(Clone)]
pub struct RedirectPolicy(Policy);

#[derive(Clone)]
enum Policy {
    None,
    Limited(usize),
    Custom(Arc<Check>),
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::limited(10)
    }
}

impl fmt::Debug for RedirectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Policy::None => f.write_str("RedirectPolicy::None"),
            Policy::Limited(max) => write!(f, "RedirectPolicy::Limited({max})"),
            Policy::Custom(_) => f.write_str("RedirectPolicy::Custom(..)"),
        }
    }
}

impl RedirectPolicy {
    /// Never follow; the redirect response is returned as is.
    #[must_use]
    pub const fn none() -> Self {
        Self(Policy::None)
    }

    /// Follow at most `max` redirects, failing on the next one.
    #[must_use]
    pub const fn limited(max: usize) -> Self {
        Self(Policy::Limited(max))
    }

    /// Ask `check` before every hop. `Ok(false)` stops and returns the
    /// redirect response; an error fails the request.
    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&RedirectAttempt<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self(Policy::Custom(Arc::new(check)))
    }

    pub(crate) fn check(&self, attempt: &RedirectAttempt<'_>) -> Result<bool> {
        match &self.0 {
            Policy::None => Ok(false),
            Policy::Limited(max) => {
                // `previous` includes the original request.
                if attempt.previous().len() > *max {
                    Err(TransportErrorKind::TooManyRedirects(*max).into())
                } else {
                    Ok(true)
                }
            }
            Policy::Custom(check) => check(attempt).map_err(|err| TransportErrorKind::Redirect(err).into()),
        }
    }
}

/// Build the request for the next hop, or `None` when `status` and
/// `headers` do not describe a redirect that can be followed.
///
/// `previous` must still carry its body factory; its own body is not used.
pub(crate) fn follow(
    previous: &Request,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<Option<Request>> {
    let method = previous.method();
    let (next_method, keep_body) = match status {
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => {
            if *method == Method::GET || *method == Method::HEAD {
                (method.clone(), false)
            } else {
                (Method::GET, false)
            }
        }
        StatusCode::SEE_OTHER => {
            if *method == Method::HEAD {
                (Method::HEAD, false)
            } else {
                (Method::GET, false)
            }
        }
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => (method.clone(), true),
        _ => return Ok(None),
    };

    let Some(location) = headers.get(LOCATION) else {
        return Ok(None);
    };
    let location = location.to_str().map_err(|_| {
        TransportErrorKind::MalformedResponse("non-ASCII Location header".to_owned())
    })?;
    let next_url = previous.url().join(location).map_err(|err| {
        TransportErrorKind::MalformedResponse(format!("invalid Location `{location}`: {err}"))
    })?;
    if !matches!(next_url.scheme(), "http" | "https") {
        return Err(TransportErrorKind::MalformedResponse(format!(
            "unsupported redirect target `{next_url}`"
        ))
        .into());
    }

    let host_changed = previous.url().host_str() != next_url.host_str();
    let mut next = Request::new(next_method, next_url);
    *next.headers_mut() = previous.headers().clone();
    if let Some(context) = previous.context() {
        next.set_context(context.clone());
    }

    if keep_body && previous.content_length() != Some(0) {
        let Some(body) = previous.regenerate_body() else {
            return Ok(None);
        };
        next.set_body(body);
        next.set_body_factory(previous.body_factory().cloned());
    } else if !keep_body {
        let headers = next.headers_mut();
        headers.remove(CONTENT_TYPE);
        headers.remove(CONTENT_LENGTH);
    }

    if host_changed {
        let headers = next.headers_mut();
        headers.remove(AUTHORIZATION);
        headers.remove(COOKIE);
        headers.remove(HOST);
    }
    Ok(Some(next))
}
