//! HTTP surface over [`ImageHost`]

pub mod handlers;

use crate::lifecycle::ImageHost;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and part headers on top of the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub host: Arc<ImageHost>,
    /// Prefix for `Location` headers, without a trailing slash.
    pub public_base_url: Arc<str>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(host: Arc<ImageHost>, public_base_url: &str, max_upload_bytes: usize) -> Self {
        Self {
            host,
            public_base_url: Arc::from(public_base_url.trim_end_matches('/')),
            max_upload_bytes,
        }
    }

    pub fn image_url(&self, id: &str) -> String {
        format!("{}/{}", self.public_base_url, id)
    }
}

/// Build the router with all routes and request tracing.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route(
            "/upload",
            post(handlers::upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/{identifier}", get(handlers::fetch))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MockBlobStore;
    use crate::clock::SystemClock;
    use crate::id::RandomIdGenerator;
    use crate::lifecycle::{HostServices, LifecycleConfig};
    use crate::metadata::MockMetadataStore;

    fn state(base: &str) -> AppState {
        let host = ImageHost::with_services(
            HostServices {
                blobs: Arc::new(MockBlobStore::new()),
                metadata: Arc::new(MockMetadataStore::new()),
                ids: Box::new(RandomIdGenerator),
                clock: Arc::new(SystemClock),
            },
            LifecycleConfig::default(),
        );
        AppState::new(Arc::new(host), base, 1024)
    }

    #[test]
    fn test_image_url_joins_base_and_identifier() {
        assert_eq!(
            state("https://img.example.com/").image_url("abc12345"),
            "https://img.example.com/abc12345"
        );
        assert_eq!(
            state("http://localhost:8080").image_url("abc12345"),
            "http://localhost:8080/abc12345"
        );
    }
}
