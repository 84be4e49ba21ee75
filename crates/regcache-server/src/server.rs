use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, routing::get};
use regcache_config::Config;
use regcache_storage::{ArtifactStore, FileSystemStorage, StorageOptions};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};

use crate::forward::{Forwarder, HttpForwarder};
use crate::handler::{package_file, scoped_package_file};

/// Shared, read-only state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ArtifactStore>,
    pub forwarder: Arc<dyn Forwarder>,
    /// Serve hits as chunked streams rather than buffered bodies
    pub stream_hits: bool,
}

impl AppState {
    pub fn new(storage: Arc<dyn ArtifactStore>, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            storage,
            forwarder,
            stream_hits: true,
        }
    }

    pub fn with_stream_hits(mut self, stream_hits: bool) -> Self {
        self.stream_hits = stream_hits;
        self
    }

    /// Build storage and the origin forwarder from a validated config
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;

        let span = info_span!(
            "storage",
            context = "file-system",
            base_directory = %config.storage.base_directory.display()
        );
        let storage = FileSystemStorage::new(
            StorageOptions::new(&config.storage.base_directory).with_span(span),
        )?;
        let timeout = (config.origin.timeout_secs > 0)
            .then(|| Duration::from_secs(config.origin.timeout_secs));
        let forwarder = HttpForwarder::new(config.origin_url()?, timeout)?;

        Ok(Self::new(Arc::new(storage), Arc::new(forwarder))
            .with_stream_hits(config.storage.stream))
    }
}

pub fn router(state: AppState) -> Router {
    // Both file routes share the `:package` name in the first segment.
    Router::new()
        .route("/-/health", get(handle_health))
        .route("/:package/-/:file", get(package_file))
        .route("/:package/:name/-/:file", get(scoped_package_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Validate the config, bind, and serve until Ctrl-C
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(
        addr = %addr,
        base_directory = %config.storage.base_directory.display(),
        origin = %config.origin.url,
        "regcache listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

/// GET /-/health
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "regcache",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::ForwardRequest;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::response::{IntoResponse, Response};
    use regcache_storage::{ArtifactKey, ArtifactStream, Lookup, StorageError};
    use std::io;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Records every forwarded path and answers with a fixed marker
    #[derive(Default)]
    struct RecordingForwarder {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingForwarder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Forwarder for RecordingForwarder {
        async fn forward(&self, request: ForwardRequest) -> Response {
            self.calls.lock().unwrap().push(request.path_and_query);
            (StatusCode::OK, "from-origin").into_response()
        }
    }

    /// Store whose every read fails with the given I/O error kind
    struct FailingStore {
        kind: io::ErrorKind,
    }

    impl FailingStore {
        fn failure(&self, key: &ArtifactKey) -> StorageError {
            StorageError::Io {
                path: PathBuf::from("/cache").join(key.relative_path()),
                source: io::Error::from(self.kind),
            }
        }
    }

    #[async_trait]
    impl ArtifactStore for FailingStore {
        async fn read_artifact(
            &self,
            key: &ArtifactKey,
        ) -> regcache_storage::Result<Lookup<Vec<u8>>> {
            Err(self.failure(key))
        }

        async fn stream_artifact(
            &self,
            key: &ArtifactKey,
        ) -> regcache_storage::Result<Lookup<ArtifactStream>> {
            Err(self.failure(key))
        }

        async fn write_artifact(
            &self,
            key: &ArtifactKey,
            _data: &[u8],
        ) -> regcache_storage::Result<()> {
            Err(self.failure(key))
        }
    }

    fn create_test_state(stream_hits: bool) -> (TempDir, Arc<RecordingForwarder>, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemStorage::new(StorageOptions::new(dir.path())).unwrap();
        let forwarder = Arc::new(RecordingForwarder::default());
        let state =
            AppState::new(Arc::new(storage), forwarder.clone()).with_stream_hits(stream_hits);
        (dir, forwarder, state)
    }

    async fn put(state: &AppState, package: &str, file: &str, data: &[u8]) {
        state
            .storage
            .write_artifact(&ArtifactKey::new(package, file), data)
            .await
            .unwrap();
    }

    async fn send_get(state: &AppState, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_hit_served_locally() {
        for stream_hits in [true, false] {
            let (_dir, forwarder, state) = create_test_state(stream_hits);
            put(&state, "left-pad", "left-pad-1.0.0.tgz", b"X").await;

            let (status, body) = send_get(&state, "/left-pad/-/left-pad-1.0.0.tgz").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, b"X");
            assert!(forwarder.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_miss_forwards_exactly_once() {
        let (_dir, forwarder, state) = create_test_state(true);

        let (status, body) = send_get(&state, "/left-pad/-/left-pad-1.0.0.tgz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"from-origin");
        assert_eq!(forwarder.calls(), vec!["/left-pad/-/left-pad-1.0.0.tgz"]);
    }

    #[tokio::test]
    async fn test_scoped_package_hit_and_miss() {
        let (_dir, forwarder, state) = create_test_state(true);
        put(&state, "@types/node", "node-20.1.0.tgz", b"types").await;

        let (status, body) = send_get(&state, "/@types/node/-/node-20.1.0.tgz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"types");

        let (status, _) = send_get(&state, "/@types/react/-/react-18.0.0.tgz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(forwarder.calls(), vec!["/@types/react/-/react-18.0.0.tgz"]);
    }

    #[tokio::test]
    async fn test_unscoped_three_segment_path_not_routed() {
        let (_dir, forwarder, state) = create_test_state(true);
        let (status, _) = send_get(&state, "/types/node/-/node-20.1.0.tgz").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(forwarder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_storage_error_is_failure_not_forward() {
        let (_dir, forwarder, state) = create_test_state(false);
        // A directory where the file should be is a storage failure.
        put(&state, "broken/broken-1.0.0.tgz", "inner", b"x").await;

        let (status, _) = send_get(&state, "/broken/-/broken-1.0.0.tgz").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(forwarder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (_dir, forwarder, state) = create_test_state(true);
        let (status, _) = send_get(&state, "/%2e%2e/-/passwd").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(forwarder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, _forwarder, state) = create_test_state(true);
        let (status, body) = send_get(&state, "/-/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = Config::default();
        config.origin.url = "ftp://nope".to_string();
        assert!(AppState::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_from_config_valid() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.base_directory = dir.path().to_path_buf();
        config.storage.stream = false;
        let state = AppState::from_config(&config).unwrap();
        assert!(!state.stream_hits);

        put(&state, "left-pad", "left-pad-1.0.0.tgz", b"X").await;
        assert!(dir.path().join("left-pad/left-pad-1.0.0.tgz").is_file());
    }

    #[tokio::test]
    async fn test_permission_denied_is_forbidden_not_forward() {
        for stream_hits in [true, false] {
            let forwarder = Arc::new(RecordingForwarder::default());
            let store = FailingStore {
                kind: io::ErrorKind::PermissionDenied,
            };
            let state = AppState::new(Arc::new(store), forwarder.clone())
                .with_stream_hits(stream_hits);

            let (status, _) = send_get(&state, "/left-pad/-/left-pad-1.0.0.tgz").await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert!(forwarder.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_other_io_failure_is_server_error() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let store = FailingStore {
            kind: io::ErrorKind::Other,
        };
        let state = AppState::new(Arc::new(store), forwarder.clone());

        let (status, _) = send_get(&state, "/@types/node/-/node-20.1.0.tgz").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(forwarder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_streamed_hit_content_length() {
        let (_dir, _forwarder, state) = create_test_state(true);
        let content = vec![7u8; 100_000];
        put(&state, "big", "big-1.0.0.tgz", &content).await;

        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/big/-/big-1.0.0.tgz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_LENGTH],
            "100000"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), content.len());
    }
}
