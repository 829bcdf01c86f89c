//! HTTP front end: the live event stream, state endpoints and static files.

use std::convert::Infallible;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CACHE_CONTROL, CONNECTION, CONTENT_TYPE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::monitor::Monitor;

type Body = UnsyncBoxBody<Bytes, Infallible>;

/// Path of the live event stream.
pub const EVENTS_PATH: &str = "/events";
/// Path of the JSON history snapshot.
pub const STATE_PATH: &str = "/api/state";

/// Shared request context.
#[derive(Debug)]
struct Context {
    monitor: Arc<Monitor>,
    static_dir: PathBuf,
}

/// Serve HTTP on `listener` until the task is dropped.
///
/// Returns a `JoinHandle` that can be used to await the server or abort it.
pub fn start_server(
    listener: TcpListener,
    monitor: Arc<Monitor>,
    static_dir: PathBuf,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(listener, monitor, static_dir).await {
            error!(error = %e, "http server stopped");
        }
    })
}

/// Accept connections on `listener` and serve each on its own task.
pub async fn serve(listener: TcpListener, monitor: Arc<Monitor>, static_dir: PathBuf) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, static_dir = %static_dir.display(), "http server listening");
    }
    let context = Arc::new(Context {
        monitor,
        static_dir,
    });

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let context = context.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let context = context.clone();
                async move { Ok::<_, Infallible>(handle_request(req, &context).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}

async fn handle_request(req: Request<hyper::body::Incoming>, context: &Context) -> Response<Body> {
    if req.method() != Method::GET {
        let mut response = text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("GET"));
        return response;
    }

    match req.uri().path() {
        EVENTS_PATH => event_stream(&context.monitor),
        "/health" | "/healthz" => text(StatusCode::OK, "OK"),
        STATE_PATH => state(&context.monitor),
        path => static_file(&context.static_dir, path).await,
    }
}

fn event_stream(monitor: &Monitor) -> Response<Body> {
    let subscription = match monitor.subscribe() {
        Ok(subscription) => subscription,
        Err(e) => {
            error!(error = %e, "failed to open event stream");
            return text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };
    debug!(subscriber = subscription.id(), "event stream opened");

    let frames = subscription.map(|frame| Ok::<_, Infallible>(Frame::data(frame)));
    let mut response = Response::new(StreamBody::new(frames).boxed_unsync());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

fn state(monitor: &Monitor) -> Response<Body> {
    match serde_json::to_vec(&monitor.history()) {
        Ok(json) => {
            let mut response = full(StatusCode::OK, "application/json", json);
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            response
        }
        Err(e) => {
            error!(error = %e, "failed to encode state");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

async fn static_file(root: &Path, uri_path: &str) -> Response<Body> {
    let Some(mut path) = resolve_static(root, uri_path) else {
        return not_found();
    };
    if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
        path.push("index.html");
    }

    match tokio::fs::read(&path).await {
        Ok(contents) => full(StatusCode::OK, content_type(&path), contents),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "static file not served");
            not_found()
        }
    }
}

/// Map a request path onto a file under `root`.
///
/// Returns `None` for paths that would leave `root`.
fn resolve_static(root: &Path, uri_path: &str) -> Option<PathBuf> {
    let relative = uri_path.trim_start_matches('/');
    if relative.is_empty() {
        return Some(root.join("index.html"));
    }
    if relative.contains('\\') || relative.contains('\0') {
        return None;
    }

    let mut path = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(path)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn full(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Body> {
    let mut response = Response::new(Full::new(body.into()).boxed_unsync());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    full(status, "text/plain", Bytes::from_static(body.as_bytes()))
}

fn not_found() -> Response<Body> {
    text(StatusCode::NOT_FOUND, "Not Found")
}
