use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use expiring_image_host::{
    blob::MockBlobStore,
    clock::FixedClock,
    id::RandomIdGenerator,
    lifecycle::{HostServices, ImageHost, LifecycleConfig},
    metadata::MockMetadataStore,
    server::{self, AppState},
};
use pretty_assertions::assert_eq;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::sync::Arc;

const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];
const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00";
const MAX_UPLOAD: usize = 1024;

struct TestServer {
    base: String,
    client: reqwest::Client,
    blobs: MockBlobStore,
    metadata: MockMetadataStore,
    clock: FixedClock,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(MockBlobStore::new(), MockMetadataStore::new()).await
    }

    async fn start_with(blobs: MockBlobStore, metadata: MockMetadataStore) -> Self {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap());
        let blobs = blobs.with_clock(Arc::new(clock.clone()));
        let host = ImageHost::with_services(
            HostServices {
                blobs: Arc::new(blobs.clone()),
                metadata: Arc::new(metadata.clone()),
                ids: Box::new(RandomIdGenerator),
                clock: Arc::new(clock.clone()),
            },
            LifecycleConfig::default(),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = server::router(AppState::new(Arc::new(host), &base, MAX_UPLOAD));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base,
            client: reqwest::Client::new(),
            blobs,
            metadata,
            clock,
        }
    }

    async fn upload(&self, field: &str, bytes: &[u8]) -> reqwest::Response {
        let part = Part::bytes(bytes.to_vec()).file_name("upload.bin");
        self.client
            .post(format!("{}/upload", self.base))
            .multipart(Form::new().part(field.to_string(), part))
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_upload_then_download() {
    let server = TestServer::start().await;

    let response = server.upload("image", PNG).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response
        .headers()
        .get(reqwest::header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let id = response.text().await.unwrap();

    assert_eq!(id.len(), 8);
    assert_eq!(location, format!("{}/{}", server.base, id));

    let download = server.client.get(&location).send().await.unwrap();
    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(
        download.headers()[reqwest::header::CONTENT_TYPE],
        "image/png"
    );
    assert_eq!(download.bytes().await.unwrap().to_vec(), PNG.to_vec());
}

#[tokio::test]
async fn test_each_format_keeps_its_content_type() {
    let server = TestServer::start().await;

    let id = server.upload("image", GIF).await.text().await.unwrap();
    let download = server.get(&format!("/{}", id)).await;

    assert_eq!(
        download.headers()[reqwest::header::CONTENT_TYPE],
        "image/gif"
    );
}

#[tokio::test]
async fn test_malformed_identifier_is_bad_request() {
    let server = TestServer::start().await;

    for path in ["/abc1234", "/abc123456", "/ABC12345", "/abc-1234"] {
        let response = server.get(path).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", path);
    }
    assert_eq!(server.metadata.get_call_count(), 0);
    assert_eq!(server.blobs.get_call_count(), 0);
}

#[tokio::test]
async fn test_unknown_identifier_is_not_found() {
    let server = TestServer::start().await;

    assert_eq!(server.get("/zzzz0000").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_image_is_not_found() {
    let server = TestServer::start().await;
    let id = server.upload("image", PNG).await.text().await.unwrap();

    server.clock.advance(ChronoDuration::days(10));

    assert_eq!(
        server.get(&format!("/{}", id)).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_non_image_upload_rejected() {
    let server = TestServer::start().await;

    let response = server.upload("image", b"just some text").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.blobs.is_empty());
    assert!(server.metadata.is_empty());
}

#[tokio::test]
async fn test_missing_image_field_rejected() {
    let server = TestServer::start().await;

    let response = server.upload("file", PNG).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await.unwrap().contains("image"));
    assert!(server.blobs.is_empty());
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let server = TestServer::start().await;
    let mut bytes = PNG.to_vec();
    bytes.resize(MAX_UPLOAD + 1, 0);

    let response = server.upload("image", &bytes).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.blobs.is_empty());
}

#[tokio::test]
async fn test_non_multipart_body_rejected() {
    let server = TestServer::start().await;

    let response = server
        .client
        .post(format!("{}/upload", server.base))
        .body(PNG.to_vec())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_storage_failure_is_bad_gateway() {
    let server =
        TestServer::start_with(MockBlobStore::new().with_put_failure(true), MockMetadataStore::new())
            .await;

    let response = server.upload("image", PNG).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(server.metadata.is_empty());
}

#[tokio::test]
async fn test_metadata_failure_is_server_error_without_orphan() {
    let server = TestServer::start_with(
        MockBlobStore::new(),
        MockMetadataStore::new().with_insert_failure(true),
    )
    .await;

    let response = server.upload("image", PNG).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(server.blobs.is_empty());
}

#[tokio::test]
async fn test_health_and_index() {
    let server = TestServer::start().await;

    let health: serde_json::Value = server.get("/health").await.json().await.unwrap();
    assert_eq!(health, serde_json::json!({ "status": "ok" }));

    let index = server.get("/").await;
    assert_eq!(index.status(), StatusCode::OK);
    assert!(index.text().await.unwrap().contains("multipart/form-data"));
}

#[tokio::test]
async fn test_sweep_after_expiry_removes_both_halves() {
    let server = TestServer::start().await;
    let host = ImageHost::with_services(
        HostServices {
            blobs: Arc::new(server.blobs.clone()),
            metadata: Arc::new(server.metadata.clone()),
            ids: Box::new(RandomIdGenerator),
            clock: Arc::new(server.clock.clone()),
        },
        LifecycleConfig::default(),
    );
    let id = server.upload("image", PNG).await.text().await.unwrap();

    server.clock.advance(ChronoDuration::days(11));
    let report = host.sweep().await.unwrap();

    assert_eq!(report.purged, 1);
    assert!(report.is_clean());
    assert!(server.blobs.is_empty());
    assert!(server.metadata.is_empty());
    assert_eq!(
        server.get(&format!("/{}", id)).await.status(),
        StatusCode::NOT_FOUND
    );
}
