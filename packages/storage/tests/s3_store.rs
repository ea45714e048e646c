// ABOUTME: Integration tests for the S3 artifact store against a mocked S3 endpoint
// ABOUTME: Verifies NotFound vs TransientError classification and lazy key listing

use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::Client;
use fnbox_storage::{ArtifactStore, ArtifactUpload, S3ArtifactStore, StoreError};
use futures::TryStreamExt;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUCKET: &str = "faas-code";

fn store_for(server: &MockServer) -> S3ArtifactStore {
    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("test", "test", None, None, "test"))
        .endpoint_url(server.uri())
        .force_path_style(true)
        .retry_config(RetryConfig::disabled())
        .build();
    S3ArtifactStore::with_client(Client::from_conf(config))
}

fn s3_error(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Error><Code>{}</Code><Message>{}</Message><RequestId>req-1</RequestId></Error>"#,
        code, message
    )
}

#[tokio::test]
async fn test_fetch_returns_object_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/faas-code/hello.py"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"print(\"hi\")\n".to_vec()))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let bytes = store.fetch(BUCKET, "hello.py").await.unwrap();

    assert_eq!(&bytes[..], b"print(\"hi\")\n");
}

#[tokio::test]
async fn test_fetch_missing_key_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/faas-code/missing.py"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_raw(s3_error("NoSuchKey", "The specified key does not exist."), "application/xml"),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.fetch(BUCKET, "missing.py").await.unwrap_err();

    match err {
        StoreError::NotFound { namespace, key } => {
            assert_eq!(namespace, BUCKET);
            assert_eq!(key, "missing.py");
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/faas-code/hello.py"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_raw(s3_error("InternalError", "We encountered an internal error."), "application/xml"),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.fetch(BUCKET, "hello.py").await.unwrap_err();

    assert!(matches!(err, StoreError::TransientError(_)), "got {:?}", err);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_fetch_access_denied_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/faas-code/hello.py"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_raw(s3_error("AccessDenied", "Access Denied"), "application/xml"),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.fetch(BUCKET, "hello.py").await.unwrap_err();

    assert!(matches!(err, StoreError::TransientError(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_fetch_unreachable_endpoint_is_transient() {
    let server = MockServer::start().await;
    let store = store_for(&server);
    drop(server);

    let err = store.fetch(BUCKET, "hello.py").await.unwrap_err();
    assert!(matches!(err, StoreError::TransientError(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_put_rejects_invalid_artifact_before_network() {
    let server = MockServer::start().await;
    let store = store_for(&server);

    let upload = ArtifactUpload::from_filename("hello.py", "print(1)")
        .unwrap()
        .with_key("/etc/passwd");
    let err = store.put(BUCKET, upload).await.unwrap_err();

    assert!(matches!(err, StoreError::InvalidArtifact(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_streams_keys() {
    let server = MockServer::start().await;
    let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>faas-code</Name>
  <Prefix></Prefix>
  <KeyCount>2</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>a.py</Key><Size>1</Size></Contents>
  <Contents><Key>b.py</Key><Size>1</Size></Contents>
</ListBucketResult>"#;
    Mock::given(method("GET"))
        .and(path_regex(r"^/faas-code/?$"))
        .and(query_param("list-type", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/xml"))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let keys: Vec<String> = store.list(BUCKET).try_collect().await.unwrap();

    assert_eq!(keys, vec!["a.py".to_string(), "b.py".to_string()]);
}
