//! HTTP layer tests: POP rewrite, transparent reads, listings.
//!
//! Run with: `cargo test`

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use popq::server::{build_router, AppState, POP_METHOD};
use popq::storage::pool_store::{PoolStore, MARKER_DIR};

fn tmp_dir() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    fs::write(path, content).expect("write");
}

fn router(root: &Path) -> Router {
    let store = PoolStore::new(root).expect("store");
    build_router(Arc::new(AppState { store }))
}

fn pop() -> Method {
    Method::from_bytes(POP_METHOD.as_bytes()).unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, range: Option<&str>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(r) = range {
        builder = builder.header(header::RANGE, r);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .expect("router is infallible")
}

async fn body_string(res: Response) -> String {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

#[tokio::test]
async fn test_pop_serves_claimed_file_inline() {
    let dir = tmp_dir();
    write(dir.path(), "a/b.txt", "hello pool");
    let app = router(dir.path());

    let res = send(&app, pop(), "/a/", None).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(
        res.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"b.txt\""
    );
    assert_eq!(body_string(res).await, "hello pool");
    assert!(!dir.path().join("a/b.txt").exists());
    assert!(dir.path().join("a").join(MARKER_DIR).join("b.txt").exists());
}

#[tokio::test]
async fn test_pop_on_empty_pool_is_server_error_without_redirect() {
    let dir = tmp_dir();
    fs::create_dir_all(dir.path().join("empty/sub")).unwrap();
    write(dir.path(), "empty/.dotfile", "skip");
    let app = router(dir.path());

    // No trailing slash either: a claim must never bounce through a 3xx.
    for uri in ["/empty/", "/empty"] {
        let res = send(&app, pop(), uri, None).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!res.status().is_redirection());
        assert!(res.headers().get(header::LOCATION).is_none());
    }
}

#[tokio::test]
async fn test_pop_missing_directory_is_server_error() {
    let dir = tmp_dir();
    let app = router(dir.path());

    let res = send(&app, pop(), "/nowhere/", None).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_pop_progress_then_exhaustion() {
    let dir = tmp_dir();
    write(dir.path(), "q/1", "one");
    write(dir.path(), "q/2", "two");
    let app = router(dir.path());

    let mut bodies = Vec::new();
    for _ in 0..2 {
        let res = send(&app, pop(), "/q/", None).await;
        assert_eq!(res.status(), StatusCode::OK);
        bodies.push(body_string(res).await);
    }
    bodies.sort();
    assert_eq!(bodies, vec!["one", "two"]);

    let res = send(&app, pop(), "/q/", None).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_get_after_claim_is_transparent_and_ranged() {
    let dir = tmp_dir();
    write(dir.path(), "a/b.txt", "0123456789");
    let app = router(dir.path());

    let res = send(&app, pop(), "/a/", None).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = send(&app, Method::GET, "/a/b.txt", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_string(res).await, "0123456789");

    let res = send(&app, Method::GET, "/a/b.txt", Some("bytes=4-7")).await;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(res.headers()[header::CONTENT_RANGE], "bytes 4-7/10");
    assert_eq!(body_string(res).await, "4567");
}

#[tokio::test]
async fn test_pop_honours_range_header() {
    let dir = tmp_dir();
    write(dir.path(), "r/data.bin", "abcdefghij");
    let app = router(dir.path());

    let res = send(&app, pop(), "/r/", Some("bytes=5-")).await;
    assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_string(res).await, "fghij");
}

#[tokio::test]
async fn test_head_after_claim_reports_length() {
    let dir = tmp_dir();
    write(dir.path(), "a/b.txt", "12345");
    let app = router(dir.path());
    send(&app, pop(), "/a/", None).await;

    let res = send(&app, Method::HEAD, "/a/b.txt", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_LENGTH], "5");
}

#[tokio::test]
async fn test_listing_hides_claimed_entries() {
    let dir = tmp_dir();
    write(dir.path(), "a/b.txt", "claimed");
    let app = router(dir.path());
    send(&app, pop(), "/a/", None).await;
    write(dir.path(), "a/c.txt", "fresh");

    let res = send(&app, Method::GET, "/a/", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let html = body_string(res).await;
    assert!(html.contains("c.txt"));
    assert!(!html.contains("b.txt"));
    assert!(!html.contains(MARKER_DIR));
}

#[tokio::test]
async fn test_directory_without_slash_redirects_for_get() {
    let dir = tmp_dir();
    fs::create_dir(dir.path().join("a")).unwrap();
    let app = router(dir.path());

    let res = send(&app, Method::GET, "/a", None).await;
    assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(res.headers()[header::LOCATION], "/a/");
}

#[tokio::test]
async fn test_missing_and_marker_paths_are_not_found() {
    let dir = tmp_dir();
    write(dir.path(), "a/b.txt", "x");
    let app = router(dir.path());
    send(&app, pop(), "/a/", None).await;

    let res = send(&app, Method::GET, "/a/nope.txt", None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = send(&app, Method::GET, "/a/.pop/b.txt", None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = send(&app, Method::GET, "/a/../../etc/passwd", None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_percent_encoded_names_round_trip() {
    let dir = tmp_dir();
    write(dir.path(), "sp/a file.txt", "spaced");
    let app = router(dir.path());

    let res = send(&app, pop(), "/sp/", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_string(res).await, "spaced");

    let res = send(&app, Method::GET, "/sp/a%20file.txt", None).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_pop_store_failure_is_server_error() {
    let dir = tmp_dir();
    write(dir.path(), "q/x.bin", "payload");
    write(dir.path(), "q/.pop", "not a directory");
    let app = router(dir.path());

    let res = send(&app, pop(), "/q/", None).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.headers().get(header::LOCATION).is_none());
    assert!(dir.path().join("q/x.bin").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_pop_serves_backslash_names() {
    let dir = tmp_dir();
    write(dir.path(), "q/a\\b.bin", "odd name");
    let app = router(dir.path());

    let res = send(&app, pop(), "/q/", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_string(res).await, "odd name");

    let res = send(&app, Method::GET, "/q/a%5Cb.bin", None).await;
    assert_eq!(res.status(), StatusCode::OK);
}
