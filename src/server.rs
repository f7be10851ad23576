//! HTTP serving layer over the pool store.
//!
//! Every method and path reaches one handler:
//!   POP  /dir/        → claim one file in `dir` and serve it in the same response
//!   GET  /dir/        → HTML listing of unclaimed entries
//!   GET  /dir/file    → file bytes, claimed or not, with Range support
//!   HEAD …            → as GET, headers only
//!
//! A claim never answers with a redirect. Some clients turn a custom method
//! into GET when following 3xx, so the claimed file is served by building a
//! fresh internal GET request and running it through the same serving path.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Router;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tracing::{debug, error, info, warn};

use crate::error::{PopError, Result};
use crate::listing;
use crate::storage::logical_path::LogicalPath;
use crate::storage::pool_store::{Located, PoolStore};

/// Non-standard method that claims a file from the target directory.
pub const POP_METHOD: &str = "POP";

/// Shared state passed to the handler.
pub struct AppState {
    pub store: PoolStore,
}

// ──────────────── router ──────────────────────────────────────────────────

/// Build the axum router. A single fallback sees every method, including `POP`.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until CTRL+C. Only bind and accept failures surface
/// here; request-level errors are answered and logged by the handler.
pub async fn start_server(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received CTRL+C, shutting down…"),
        Err(e) => {
            error!(error = %e, "Signal error");
            std::future::pending::<()>().await;
        }
    }
}

// ──────────────── handlers ────────────────────────────────────────────────

async fn handle_request(State(state): State<Arc<AppState>>, req: Request) -> Response {
    info!(method = %req.method(), path = req.uri().path(), "Request");

    if req.method().as_str() == POP_METHOD {
        return handle_pop(&state, req).await;
    }
    serve(&state, req).await
}

/// Claim, then rewrite the request in place into a GET of the claimed entry.
async fn handle_pop(state: &Arc<AppState>, req: Request) -> Response {
    let dir = match LogicalPath::from_url_path(req.uri().path()) {
        Ok(dir) => dir,
        Err(e) => {
            warn!(error = %e, "Rejected claim path");
            return internal_error();
        }
    };

    let claimed = match run_blocking(state, move |store| store.claim(&dir)).await {
        Ok(claimed) => claimed,
        Err(e @ PopError::PoolExhausted(_)) => {
            info!(error = %e, "Nothing to claim");
            return internal_error();
        }
        Err(e) => {
            error!(error = %e, "Claim failed");
            return internal_error();
        }
    };

    let rewritten = match rewrite_to_get(&req, &claimed) {
        Ok(r) => r,
        Err(e) => {
            error!(entry = %claimed, error = %e, "Cannot build retrieval request");
            return internal_error();
        }
    };
    info!(method = %rewritten.method(), path = %claimed, "Serving claimed entry");

    let mut response = serve(state, rewritten).await;
    if response.status().is_success() {
        set_attachment_headers(response.headers_mut(), &claimed);
    }
    response
}

/// Fresh internal GET for `claimed`, carrying the original request headers
/// (Range, conditionals) but no body.
fn rewrite_to_get(original: &Request, claimed: &LogicalPath) -> std::result::Result<Request, axum::http::Error> {
    let uri: Uri = claimed.to_url_path().parse()?;
    let mut headers = original.headers().clone();
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);

    let mut req = Request::new(Body::empty());
    *req.method_mut() = Method::GET;
    *req.uri_mut() = uri;
    *req.headers_mut() = headers;
    Ok(req)
}

fn set_attachment_headers(headers: &mut HeaderMap, claimed: &LogicalPath) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let name = claimed.file_name().unwrap_or_default();
    match HeaderValue::from_str(&content_disposition(name)) {
        Ok(v) => {
            headers.insert(header::CONTENT_DISPOSITION, v);
        }
        Err(e) => warn!(entry = %claimed, error = %e, "Unrepresentable Content-Disposition"),
    }
}

/// `attachment; filename="…"`, plus an RFC 5987 `filename*` when the name is
/// not plain printable ASCII.
pub fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    if fallback == name {
        format!("attachment; filename=\"{name}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            utf8_percent_encode(name, NON_ALPHANUMERIC)
        )
    }
}

/// Standard retrieval of a logical path, claimed or not.
async fn serve(state: &Arc<AppState>, req: Request) -> Response {
    let logical = match LogicalPath::from_url_path(req.uri().path()) {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, "Rejected path");
            return not_found();
        }
    };
    let (parts, _body) = req.into_parts();

    match locate(state, &logical).await {
        Ok(located) => serve_located(state, &parts, &logical, located).await,
        Err(e) => store_error(e),
    }
}

async fn locate(state: &Arc<AppState>, logical: &LogicalPath) -> Result<Located> {
    let logical = logical.clone();
    run_blocking(state, move |store| store.locate(&logical)).await
}

/// Serve an already-resolved entry. An unclaimed file may be claimed between
/// locate and open; a 404 from its literal form then re-locates once and
/// serves the claimed form.
async fn serve_located(
    state: &Arc<AppState>,
    parts: &Parts,
    logical: &LogicalPath,
    located: Located,
) -> Response {
    match located {
        Located::Dir(_) => serve_dir(state, parts, logical).await,
        Located::Claimed(path) => serve_file(path, parts).await,
        Located::Unclaimed(path) => {
            let response = serve_file(path, parts).await;
            if response.status() != StatusCode::NOT_FOUND {
                return response;
            }
            debug!(entry = %logical, "Entry moved while opening, locating again");
            match locate(state, logical).await {
                Ok(Located::Claimed(path)) => serve_file(path, parts).await,
                Ok(_) => response,
                Err(e) => store_error(e),
            }
        }
    }
}

/// Delegate to `ServeFile`, which handles Range, conditionals, HEAD and MIME.
async fn serve_file(path: PathBuf, parts: &Parts) -> Response {
    let mut req = Request::new(Body::empty());
    *req.method_mut() = parts.method.clone();
    *req.uri_mut() = parts.uri.clone();
    *req.headers_mut() = parts.headers.clone();

    match ServeFile::new(path).oneshot(req).await {
        Ok(res) => res.map(Body::new),
        Err(never) => match never {},
    }
}

async fn serve_dir(state: &Arc<AppState>, parts: &Parts, dir: &LogicalPath) -> Response {
    if parts.method != Method::GET && parts.method != Method::HEAD {
        return (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "GET,HEAD")]).into_response();
    }

    let path = parts.uri.path();
    if !path.ends_with('/') {
        let mut location = format!("{path}/");
        if let Some(q) = parts.uri.query() {
            location.push('?');
            location.push_str(q);
        }
        return Redirect::temporary(&location).into_response();
    }

    let entries = {
        let dir = dir.clone();
        match run_blocking(state, move |store| store.list(&dir)).await {
            Ok(e) => e,
            Err(e) => return store_error(e),
        }
    };
    Html(listing::render(dir, &entries)).into_response()
}

// ──────────────── helpers ─────────────────────────────────────────────────

/// Run a store operation on the blocking pool.
async fn run_blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T>
where
    F: FnOnce(&PoolStore) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| PopError::Task(e.to_string()))?
}

fn store_error(e: PopError) -> Response {
    match e {
        PopError::NotFound(_) | PopError::InvalidPath(_) => not_found(),
        e => {
            error!(error = %e, "Store failure");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "500 internal server error").into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found").into_response()
}
