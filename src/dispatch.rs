//! Sends a prepared request, following redirects and keeping the cookie jar
//! in sync.

use http::{HeaderValue, header};
use tracing::debug;
use url::Url;

use crate::{
    CookieJar, RawResponse, Request, Result, Transport,
    error::OptionErrorKind,
    redirect::{self, RedirectAttempt, RedirectPolicy},
};

/// Send `request` once per hop. Transport failures end the exchange; there
/// are no retries.
pub(crate) async fn dispatch(
    transport: &dyn Transport,
    jar: Option<&CookieJar>,
    policy: &RedirectPolicy,
    mut request: Request,
) -> Result<RawResponse> {
    let mut visited: Vec<Url> = Vec::new();
    loop {
        // Redirects are built from the request as the caller prepared it,
        // before jar cookies were merged in.
        let template = request.clone_head();
        if let Some(jar) = jar {
            attach_cookies(jar, &mut request).await?;
        }

        debug!(method = %request.method(), url = %request.url(), "sending request");
        let response = transport.execute(request).await?;
        debug!(status = %response.status(), url = %response.url(), "received response");

        if let Some(jar) = jar {
            jar.store_from_headers(response.url(), response.headers())
                .await;
        }

        let Some(next) = redirect::follow(&template, response.status(), response.headers())? else {
            return Ok(response);
        };
        visited.push(template.url().clone());
        let attempt = RedirectAttempt::new(response.status(), next.url(), &visited);
        if !policy.check(&attempt)? {
            return Ok(response);
        }

        debug!(
            status = %response.status(),
            from = %template.url(),
            to = %next.url(),
            "following redirect"
        );
        request = next;
    }
}

async fn attach_cookies(jar: &CookieJar, request: &mut Request) -> Result<()> {
    let Some(stored) = jar.header_value(request.url()).await else {
        return Ok(());
    };
    let merged = match request
        .headers()
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
    {
        Some(own) if !own.is_empty() => format!("{own}; {stored}"),
        _ => stored,
    };
    let value = HeaderValue::from_str(&merged)
        .map_err(|_| OptionErrorKind::InvalidHeader(header::COOKIE.to_string()))?;
    request.headers_mut().insert(header::COOKIE, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use futures_util::future::BoxFuture;
    use http::{HeaderMap, Method, StatusCode};

    use super::*;
    use crate::ResponseBody;

    /// Replies from a script and records what it was sent.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<Vec<(StatusCode, Vec<(&'static str, &'static str)>)>>,
        seen: Mutex<Vec<(Method, String, Option<String>)>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<(StatusCode, Vec<(&'static str, &'static str)>)>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::default(),
            }
        }
    }

    impl Transport for Scripted {
        fn execute(&self, request: Request) -> BoxFuture<'_, Result<RawResponse>> {
            let cookie = request
                .headers()
                .get(header::COOKIE)
                .map(|v| v.to_str().unwrap().to_owned());
            self.seen.lock().unwrap().push((
                request.method().clone(),
                request.url().to_string(),
                cookie,
            ));
            let (status, pairs) = self.replies.lock().unwrap().pop().unwrap();
            let mut headers = HeaderMap::new();
            for (name, value) in pairs {
                headers.append(
                    http::HeaderName::from_static(name),
                    HeaderValue::from_static(value),
                );
            }
            let url = request.url().clone();
            Box::pin(async move {
                Ok(RawResponse::new(
                    status,
                    headers,
                    url,
                    ResponseBody::from(Bytes::from_static(b"done")),
                ))
            })
        }
    }

    #[test]
    fn follows_redirects_and_collects_cookies() {
        let transport = Scripted::new(vec![
            (
                StatusCode::FOUND,
                vec![("location", "/landing"), ("set-cookie", "session=abc; Path=/")],
            ),
            (StatusCode::OK, vec![]),
        ]);
        let jar = CookieJar::new();
        let mut request = Request::parse("POST", "http://example.com/login").unwrap();
        request
            .headers_mut()
            .insert(header::COOKIE, HeaderValue::from_static("own=1"));

        let response = async_io::block_on(dispatch(
            &transport,
            Some(&jar),
            &RedirectPolicy::default(),
            request,
        ))
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.url().as_str(), "http://example.com/landing");

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].0, Method::GET);
        assert_eq!(seen[1].2.as_deref(), Some("own=1; session=abc"));
    }

    #[test]
    fn policy_can_stop_at_redirect() {
        let transport = Scripted::new(vec![(StatusCode::MOVED_PERMANENTLY, vec![("location", "/x")])]);
        let request = Request::parse("GET", "http://example.com/").unwrap();
        let response =
            async_io::block_on(dispatch(&transport, None, &RedirectPolicy::none(), request))
                .unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn redirect_loops_hit_the_limit() {
        let loops = (0..4)
            .map(|_| (StatusCode::FOUND, vec![("location", "/again")]))
            .collect();
        let transport = Arc::new(Scripted::new(loops));
        let request = Request::parse("GET", "http://example.com/").unwrap();
        let err = async_io::block_on(dispatch(
            transport.as_ref(),
            None,
            &RedirectPolicy::limited(2),
            request,
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "transport error: stopped after 2 redirects");
        assert_eq!(transport.seen.lock().unwrap().len(), 3);
    }
}
