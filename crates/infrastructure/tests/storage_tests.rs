use mediagen_config::StorageConfig;
use mediagen_domain::MediaStorage;
use mediagen_infrastructure::{build_storage, HttpObjectStorage, PassthroughStorage};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn storage_config(server: &MockServer) -> StorageConfig {
    StorageConfig {
        endpoint: Some(server.uri()),
        bucket: "media".to_string(),
        access_token: Some("secret".to_string()),
        public_domain: Some("https://cdn.test".to_string()),
        download_timeout_seconds: Some(5),
    }
}

#[tokio::test]
async fn test_downloads_and_uploads_remote_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/backend/out.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(vec![0u8, 1, 2, 3]),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/media/generations/[0-9a-f-]{36}\.mp4$"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let storage = HttpObjectStorage::new(storage_config(&server)).unwrap();
    let source = format!("{}/backend/out.mp4", server.uri());
    let url = storage.persist(&source, "generations").await;

    assert!(url.starts_with("https://cdn.test/generations/"));
    assert!(url.ends_with(".mp4"));
}

#[tokio::test]
async fn test_data_uri_is_decoded_before_upload() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/media/generations/.+\.jpg$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = storage_config(&server);
    config.public_domain = None;
    let storage = HttpObjectStorage::new(config).unwrap();
    let url = storage
        .persist("data:image/jpeg;base64,aGVsbG8=", "generations")
        .await;

    assert!(url.starts_with(&format!("{}/media/generations/", server.uri())));
    assert!(url.ends_with(".jpg"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, b"hello");
}

#[tokio::test]
async fn test_upload_failure_falls_back_to_source() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500).set_body_string("disk full"))
        .mount(&server)
        .await;

    let storage = HttpObjectStorage::new(storage_config(&server)).unwrap();
    let source = "data:image/png;base64,aGVsbG8=";
    assert_eq!(storage.persist(source, "generations").await, source);
}

#[tokio::test]
async fn test_download_failure_falls_back_to_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let storage = HttpObjectStorage::new(storage_config(&server)).unwrap();
    let source = format!("{}/expired.png", server.uri());
    assert_eq!(storage.persist(&source, "generations").await, source);
    assert!(server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .all(|r| r.method.to_string() == "GET"));
}

#[tokio::test]
async fn test_unconfigured_storage_keeps_urls() {
    let storage = build_storage(&StorageConfig::default()).unwrap();
    assert_eq!(
        storage.persist("https://fal.media/x.png", "generations").await,
        "https://fal.media/x.png"
    );
    assert_eq!(
        PassthroughStorage.persist("data:image/png;base64,AA==", "x").await,
        "data:image/png;base64,AA=="
    );
}
