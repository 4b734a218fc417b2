//! Shared helpers for API integration tests.
//!
//! A [`Backend`] holds the collaborators every process of a deployment
//! shares (record store, user store, queue, blob store, fan-out bus), all
//! in memory.
//! Each call to [`Backend::state`] builds the state of one more API process,
//! with its own Live Connection Registry.

#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::{DynamicImage, Rgba, RgbaImage};
use pixelforge_api::app::build_app;
use pixelforge_api::auth::jwt::{generate_access_token, JwtConfig};
use pixelforge_api::config::ServerConfig;
use pixelforge_api::service::JobService;
use pixelforge_api::state::AppState;
use pixelforge_api::ws::{start_fanout_listener, LiveRegistry};
use pixelforge_core::formats::ImageFormat;
use pixelforge_core::keys::generate_upload_key;
use pixelforge_core::types::DbId;
use pixelforge_db::models::job::{Job, NewJob};
use pixelforge_db::queue::{MemoryTaskQueue, RetryPolicy};
use pixelforge_db::store::{JobStore, MemoryJobStore, MemoryUserStore};
use pixelforge_events::LocalBus;
use pixelforge_storage::MemoryBlobGateway;
use pixelforge_worker::converter::ConversionWorker;
use pixelforge_worker::publisher::StatusPublisher;
use pixelforge_worker::runner::Runner;
use tokio_util::sync::CancellationToken;

pub const BOUNDARY: &str = "pixelforge-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 1024 * 1024,
        download_url_ttl: Duration::from_secs(900),
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 30,
        },
    }
}

/// A valid access token for `user_id`.
pub fn token(user_id: DbId) -> String {
    generate_access_token(user_id, &test_config().jwt).unwrap()
}

pub struct Backend {
    pub config: ServerConfig,
    pub store: Arc<MemoryJobStore>,
    pub users: Arc<MemoryUserStore>,
    pub queue: Arc<MemoryTaskQueue>,
    pub blobs: Arc<MemoryBlobGateway>,
    pub bus: Arc<LocalBus>,
}

impl Backend {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            store: Arc::new(MemoryJobStore::new()),
            users: Arc::new(MemoryUserStore::new()),
            queue: Arc::new(MemoryTaskQueue::new(RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::ZERO,
            })),
            blobs: Arc::new(MemoryBlobGateway::new()),
            bus: Arc::new(LocalBus::default()),
        }
    }

    /// State for one more API process over the shared collaborators.
    pub fn state(&self) -> AppState {
        AppState {
            config: Arc::new(self.config.clone()),
            jobs: Arc::new(JobService::new(
                self.store.clone(),
                self.queue.clone(),
                self.blobs.clone(),
                self.config.download_url_ttl,
            )),
            users: self.users.clone(),
            registry: Arc::new(LiveRegistry::new()),
        }
    }

    /// The full router for one API process.
    pub fn app(&self) -> Router {
        build_app(self.state())
    }

    /// A conversion worker draining the shared queue.
    pub fn runner(&self) -> Runner {
        let worker = Arc::new(ConversionWorker::new(
            self.store.clone(),
            self.blobs.clone(),
            StatusPublisher::new(self.bus.clone()),
        ));
        Runner::new(self.queue.clone(), worker, Duration::from_millis(10))
    }

    /// Insert a `Pending` job directly, bypassing the HTTP surface.
    pub async fn insert_job(&self, user_id: DbId) -> Job {
        self.store
            .create(&NewJob {
                user_id,
                filename: "seed.png".to_string(),
                input_path: generate_upload_key(ImageFormat::Png),
                original_format: ImageFormat::Png,
                target_format: ImageFormat::Webp,
            })
            .await
            .unwrap()
    }

    pub async fn job(&self, id: DbId) -> Job {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }
}

/// A running API process: served on an ephemeral port with its own
/// fan-out listener.
pub struct Process {
    pub addr: SocketAddr,
    pub state: AppState,
    pub app: Router,
    cancel: CancellationToken,
}

impl Process {
    pub async fn spawn(backend: &Backend) -> Self {
        let state = backend.state();
        let cancel = CancellationToken::new();
        start_fanout_listener(backend.bus.clone(), state.registry.clone(), cancel.clone())
            .await
            .unwrap();

        let app = build_app(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let served = app.clone();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, served)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            app,
            cancel,
        }
    }

    pub fn ws_url(&self, job_id: DbId, token: &str) -> String {
        format!("ws://{}/api/v1/ws/jobs/{job_id}?token={token}", self.addr)
    }

    /// Wait until this process holds `expected` subscribers for `job_id`.
    pub async fn wait_for_subscribers(&self, job_id: DbId, expected: usize) {
        let registry = self.state.registry.clone();
        tokio::time::timeout(Duration::from_secs(2), async move {
            while registry.subscriber_count(job_id) != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscriber count never reached the expected value");
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Authenticated GET.
pub fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

/// Authenticated multipart POST with an optional `target_format` field and
/// a `file` part.
pub fn convert_request(
    uri: &str,
    token: &str,
    filename: &str,
    bytes: &[u8],
    target_format: Option<&str>,
) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(target) = target_format {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"target_format\"\r\n\r\n{target}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Unauthenticated JSON POST.
pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Unauthenticated `application/x-www-form-urlencoded` POST. `body` must
/// already be encoded.
pub fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn png_bytes() -> Bytes {
    let img = RgbaImage::from_fn(4, 4, |x, y| Rgba([x as u8 * 60, y as u8 * 60, 200, 255]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    Bytes::from(out)
}
