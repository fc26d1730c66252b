//! Shared test utilities for running against a local httpbin-like server.
//!
//! The server implements just the endpoints the suite needs and answers every
//! request on its own thread, so slow endpoints never block the others.
//! `CHAINWAVE_TEST_BASE_URL` points the suite at another server.

#![allow(dead_code)]

use std::{
    io::{Cursor, Read},
    thread,
    time::Duration,
};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use once_cell::sync::OnceCell;
use serde_json::{Map, Value, json};
use tiny_http::{Header, Request, Response, Server, StatusCode};
use url::Url;

type Reply = Response<Cursor<Vec<u8>>>;

#[derive(Debug)]
pub struct TestServer {
    base: String,
    _thread: thread::JoinHandle<()>,
}

/// Base URL of the test server.
pub fn httpbin_base() -> String {
    if let Ok(base) = std::env::var("CHAINWAVE_TEST_BASE_URL") {
        return base.trim_end_matches('/').to_string();
    }
    test_server().base.clone()
}

/// Full URL of `path` on the test server.
pub fn httpbin_uri(path: &str) -> String {
    format!("{}/{}", httpbin_base(), path.trim_start_matches('/'))
}

pub fn test_server() -> &'static TestServer {
    static INSTANCE: OnceCell<TestServer> = OnceCell::new();
    INSTANCE.get_or_init(TestServer::start)
}

impl TestServer {
    fn start() -> Self {
        let server = Server::http("127.0.0.1:0").expect("start test server");
        let base = format!("http://{}", server.server_addr());
        let thread = thread::spawn(move || {
            for request in server.incoming_requests() {
                thread::spawn(move || serve(request));
            }
        });
        Self {
            base,
            _thread: thread,
        }
    }
}

fn serve(mut request: Request) {
    let url = Url::parse(&format!("http://localhost{}", request.url())).unwrap();
    let mut body = Vec::new();
    let _ = request.as_reader().read_to_end(&mut body);
    let response = route(&request, &url, &body);
    let _ = request.respond(response);
}

fn route(request: &Request, url: &Url, body: &[u8]) -> Reply {
    let path = url.path();
    match path {
        "/get" | "/anything" | "/post" | "/put" | "/patch" | "/delete" | "/head" => {
            json_response(StatusCode(200), &echo(request, url, body))
        }
        "/headers" => json_response(StatusCode(200), &json!({ "headers": headers(request) })),
        "/cookies" => {
            let cookie = header_value(request, "cookie").unwrap_or_default();
            json_response(StatusCode(200), &json!({ "cookie": cookie }))
        }
        "/cookies/set" => {
            let mut response = text_response(StatusCode(200), "cookies set");
            for (name, value) in url.query_pairs() {
                let header =
                    Header::from_bytes("Set-Cookie", format!("{name}={value}; Path=/")).unwrap();
                response = response.with_header(header);
            }
            response
        }
        "/bearer" => match header_value(request, "authorization") {
            Some(auth) if auth.starts_with("Bearer ") => json_response(
                StatusCode(200),
                &json!({ "authenticated": true, "token": &auth["Bearer ".len()..] }),
            ),
            _ => text_response(StatusCode(401), "unauthorized"),
        },
        "/redirect-to" => {
            let mut target = "/get".to_owned();
            let mut status = 302;
            for (key, value) in url.query_pairs() {
                match key.as_ref() {
                    "url" => target = value.into_owned(),
                    "status_code" => status = value.parse().unwrap_or(302),
                    _ => {}
                }
            }
            redirect_response(status, &target)
        }
        "/html" => text_response(StatusCode(200), "<html><body>not json</body></html>"),
        _ => {
            if let Some(rest) = path.strip_prefix("/basic-auth/") {
                return basic_auth(request, rest);
            }
            if let Some(code) = path.strip_prefix("/status/") {
                let status = code.parse::<u16>().unwrap_or(400);
                if status == 204 {
                    return Response::new(StatusCode(204), vec![], Cursor::new(Vec::new()), None, None);
                }
                return text_response(StatusCode(status), format!("status {status}"));
            }
            if let Some(steps) = path.strip_prefix("/redirect/") {
                let steps = steps.parse::<u32>().unwrap_or(0);
                if steps == 0 {
                    return json_response(StatusCode(200), &echo(request, url, body));
                }
                return redirect_response(302, &format!("/redirect/{}", steps - 1));
            }
            if let Some(millis) = path.strip_prefix("/delay/") {
                thread::sleep(Duration::from_millis(millis.parse().unwrap_or(0)));
                return text_response(StatusCode(200), "delayed");
            }
            if let Some(size) = path.strip_prefix("/bytes/") {
                let size = size.parse::<usize>().unwrap_or(0);
                let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
                return Response::from_data(data);
            }
            text_response(StatusCode(404), format!("no route for {path}"))
        }
    }
}

fn echo(request: &Request, url: &Url, body: &[u8]) -> Value {
    let mut args = Map::new();
    for (key, value) in url.query_pairs() {
        let entry = args
            .entry(key.into_owned())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = entry {
            values.push(Value::String(value.into_owned()));
        }
    }
    json!({
        "method": request.method().to_string(),
        "url": url.as_str(),
        "args": args,
        "headers": headers(request),
        "body": String::from_utf8_lossy(body),
        "body_len": body.len(),
    })
}

/// Request headers keyed by lower-case name; repeated headers are joined with ", ".
fn headers(request: &Request) -> Value {
    let mut map = Map::new();
    for header in request.headers() {
        let name = header.field.to_string().to_ascii_lowercase();
        let value = String::from_utf8_lossy(header.value.as_ref()).into_owned();
        match map.get_mut(&name) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                map.insert(name, Value::String(value));
            }
        }
    }
    Value::Object(map)
}

fn basic_auth(request: &Request, path: &str) -> Reply {
    let mut parts = path.split('/');
    let user = parts.next().unwrap_or_default();
    let pass = parts.next().unwrap_or_default();
    let expected = format!("Basic {}", BASE64.encode(format!("{user}:{pass}")));

    if header_value(request, "authorization").as_deref() == Some(expected.as_str()) {
        return json_response(
            StatusCode(200),
            &json!({ "authenticated": true, "user": user }),
        );
    }
    text_response(StatusCode(401), "unauthorized")
}

fn redirect_response(status: u16, location: &str) -> Reply {
    let location = Header::from_bytes("Location", location).unwrap();
    Response::from_string("redirect")
        .with_status_code(StatusCode(status))
        .with_header(location)
}

fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|header| header.field.to_string().eq_ignore_ascii_case(name))
        .map(|header| String::from_utf8_lossy(header.value.as_ref()).into_owned())
}

fn json_response(status: StatusCode, body: &Value) -> Reply {
    let content_type = Header::from_bytes("Content-Type", "application/json").unwrap();
    Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(content_type)
}

fn text_response(status: StatusCode, body: impl Into<String>) -> Reply {
    Response::from_string(body.into()).with_status_code(status)
}
