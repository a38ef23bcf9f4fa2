//! HTTP front end for the record index.
//!
//! | Route | Operation |
//! |---|---|
//! | `POST /record` | create |
//! | `GET /record/:id` | fetch by id |
//! | `GET /search?key=value&...` | search |
//! | `GET /health` | liveness and record count |
//!
//! SQLite work is blocking, so handlers hand it to the blocking pool.

mod handlers;

pub use handlers::*;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::engine::RecordEngine;
use crate::errors::{ErrorKind, IndexError, Result};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<RecordEngine>,
    started: Instant,
}

impl AppState {
    pub fn new(engine: RecordEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            started: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Build the router with all routes and layers.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/record", post(create_record))
        .route("/record/:id", get(get_record))
        .route("/search", get(search_records))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    config: &ServiceConfig,
    engine: RecordEngine,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    info!(addr = %listener.local_addr()?, "listening");
    let app = router(AppState::new(engine), config.max_body_bytes);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("server stopped");
    Ok(())
}

/// Tag every request with a v7 UUID, in the log span and the response header.
async fn request_id(req: Request, next: Next) -> Response {
    let id = Uuid::now_v7().to_string();
    let span = info_span!(
        "request",
        id = %id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let mut response = async move {
        let response = next.run(req).await;
        debug!(status = response.status().as_u16(), "request complete");
        response
    }
    .instrument(span)
    .await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

// =============================================================================
// Wire types
// =============================================================================

/// Body of a successful create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub success: bool,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub records: usize,
}

/// An error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        let status = match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match err {
            IndexError::Validation(msg) => msg,
            IndexError::NotFound(_) => "Record not found".to_string(),
            other => other.to_string(),
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), error = %self.message, "request failed");
        } else {
            debug!(status = self.status.as_u16(), error = %self.message, "request rejected");
        }
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}


#[cfg(test)]
mod router_tests {
    use super::*;
    use crate::storage::SqliteStore;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    struct Reply {
        status: u16,
        head: String,
        body: String,
    }

    impl Reply {
        fn json(&self) -> Value {
            serde_json::from_str(&self.body).expect("body should be JSON")
        }
    }

    async fn spawn_app(dir: &tempfile::TempDir, max_body_bytes: usize) -> SocketAddr {
        let store = SqliteStore::open(dir.path().join("records.db"), Duration::from_secs(1))
            .expect("store should open");
        let engine = RecordEngine::new(store).expect("engine should start");
        let app = router(AppState::new(engine), max_body_bytes);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server should run");
        });
        addr
    }

    async fn send(addr: SocketAddr, method: &str, target: &str, body: &str) -> Reply {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        let request = format!(
            "{method} {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(request.as_bytes()).await.expect("write request");

        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => raw.extend_from_slice(&buf[..n]),
            }
        }
        let text = String::from_utf8(raw).expect("utf-8 response");
        let (head, body) = text.split_once("\r\n\r\n").expect("response head");
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("status code");
        Reply {
            status,
            head: head.to_ascii_lowercase(),
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_fetch_and_search_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_app(&dir, 1024 * 1024).await;

        let created = send(
            addr,
            "POST",
            "/record",
            r#"{"data_filename":"d.bin","metadata_filename":"m.json","extra_metadata":{"user":"alex"}}"#,
        )
        .await;
        assert_eq!(created.status, 201);
        assert!(created.head.contains(REQUEST_ID_HEADER));
        let id = created.json()["id"].as_i64().expect("integer id");

        let fetched = send(addr, "GET", &format!("/record/{id}"), "").await;
        assert_eq!(fetched.status, 200);
        assert_eq!(fetched.json()["extra_metadata"], json!({"user": "alex"}));

        let found = send(addr, "GET", "/search?user=alex", "").await;
        assert_eq!(found.status, 200);
        assert_eq!(found.json().as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_app(&dir, 1024 * 1024).await;

        for body in [
            "not json",
            "[1,2]",
            r#"{"data_filename":"d","metadata_filename":"m","extra_metadata":"str"}"#,
            r#"{"data_filename":5,"metadata_filename":"m"}"#,
            r#"{"data_filename":"d"}"#,
        ] {
            let reply = send(addr, "POST", "/record", body).await;
            assert_eq!(reply.status, 400, "body {body:?}");
            assert!(reply.json()["error"].is_string(), "body {body:?}");
        }

        let health = send(addr, "GET", "/health", "").await;
        assert_eq!(health.json()["records"], json!(0));
    }

    #[tokio::test]
    async fn test_oversized_body_is_payload_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_app(&dir, 64).await;

        let body = format!(
            r#"{{"data_filename":"{}","metadata_filename":"m"}}"#,
            "d".repeat(200)
        );
        let reply = send(addr, "POST", "/record", &body).await;
        assert_eq!(reply.status, 413);
    }

    #[tokio::test]
    async fn test_record_path_errors() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_app(&dir, 1024 * 1024).await;

        let bad_id = send(addr, "GET", "/record/abc", "").await;
        assert_eq!(bad_id.status, 400);
        assert!(bad_id.json()["error"].is_string());

        let missing = send(addr, "GET", "/record/999", "").await;
        assert_eq!(missing.status, 404);
        assert_eq!(missing.json(), json!({"error": "Record not found"}));
    }

    #[tokio::test]
    async fn test_search_query_string_errors() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_app(&dir, 1024 * 1024).await;

        let repeated = send(addr, "GET", "/search?user=alex&user=sam", "").await;
        assert_eq!(repeated.status, 400);
        assert_eq!(
            repeated.json(),
            json!({"error": "repeated search parameter: user"})
        );

        let empty = send(addr, "GET", "/search", "").await;
        assert_eq!(empty.status, 400);
        assert_eq!(empty.json(), json!({"error": "no search parameters provided"}));
    }
}
