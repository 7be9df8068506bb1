//! Blob container creation, uploads and the upload pathway

use pixvec_ingest::config::{BlobSettings, PoolSettings};
use pixvec_ingest::error::IngestError;
use pixvec_ingest::services::{BlobContainerClient, ItemSource, LocatorStrategy};
use pixvec_ingest::types::FailureReason;
use pixvec_ingest::workflow::{BatchedWorkerPool, UploadPipeline};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> BlobContainerClient {
    BlobContainerClient::new(BlobSettings {
        account_url: server.uri(),
        container: "semart".to_string(),
        sas_token: "sv=2021-08-06&sig=test".to_string(),
        content_type: "image/jpeg".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

async fn mount_container(server: &MockServer, status: u16) {
    Mock::given(method("PUT"))
        .and(path("/semart"))
        .and(query_param("restype", "container"))
        .and(query_param("sig", "test"))
        .and(header("x-ms-blob-public-access", "blob"))
        .respond_with(ResponseTemplate::new(status))
        .expect(1)
        .mount(server)
        .await;
}

fn upload_pipeline(dataset: &Path, images: &Path) -> UploadPipeline {
    UploadPipeline::new(
        ItemSource::new("image_file", b'\t', LocatorStrategy::LocalFolder(images.to_path_buf())),
        BatchedWorkerPool::new(PoolSettings {
            batch_size: 2,
            concurrency: 4,
            call_timeout: Duration::from_secs(5),
        }),
        dataset,
    )
}

fn write_fixture(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let images = dir.join("images");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::write(images.join("img1.jpg"), "one").unwrap();
    std::fs::write(images.join("img3.jpg"), "three").unwrap();

    let dataset = dir.join("dataset_embeddings.csv");
    std::fs::write(
        &dataset,
        "image_file\ttitle\tvector\n\
         img1.jpg\tEvening\t[0.1]\n\
         img2.jpg\tLady\t[0.2]\n\
         img3.jpg\tFruit\t[0.3]\n",
    )
    .unwrap();
    (dataset, images)
}

#[tokio::test]
async fn test_create_container() {
    let server = MockServer::start().await;
    mount_container(&server, 201).await;

    client(&server).create_container().await.unwrap();
}

#[tokio::test]
async fn test_existing_container_is_fatal() {
    let server = MockServer::start().await;
    mount_container(&server, 409).await;

    let err = client(&server).create_container().await.unwrap_err();
    assert!(matches!(err, IngestError::ContainerExists(ref name) if name == "semart"));
    assert_eq!(err.to_string(), "A container with name semart already exists");
}

#[tokio::test]
async fn test_upload_file_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/semart/img1.jpg"))
        .and(query_param("sv", "2021-08-06"))
        .and(header("x-ms-blob-type", "BlockBlob"))
        .and(header("content-type", "image/jpeg"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("img1.jpg");
    std::fs::write(&file, "jpeg-bytes").unwrap();

    let receipt = client(&server).upload_file(&file).await.unwrap();
    assert_eq!(receipt.blob_name, "img1.jpg");
    assert_eq!(receipt.bytes, 10);
    assert_eq!(receipt.url, format!("{}/semart/img1.jpg", server.uri()));
}

#[tokio::test]
async fn test_upload_rejected_is_non_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/semart/img1.jpg"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("img1.jpg");
    std::fs::write(&file, "x").unwrap();

    assert_eq!(
        client(&server).upload_file(&file).await.unwrap_err(),
        FailureReason::NonSuccessStatus(403)
    );
}

#[tokio::test]
async fn test_upload_pathway_counts_missing_file_as_failure() {
    let server = MockServer::start().await;
    mount_container(&server, 201).await;
    Mock::given(method("PUT"))
        .and(path("/semart/img1.jpg"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/semart/img3.jpg"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let (dataset, images) = write_fixture(temp_dir.path());

    let summary = upload_pipeline(&dataset, &images)
        .run(&client(&server))
        .await
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.batches, 2);
}

#[tokio::test]
async fn test_upload_pathway_stops_when_container_exists() {
    let server = MockServer::start().await;
    mount_container(&server, 409).await;
    Mock::given(method("PUT"))
        .and(path("/semart/img1.jpg"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let (dataset, images) = write_fixture(temp_dir.path());

    let err = upload_pipeline(&dataset, &images)
        .run(&client(&server))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::ContainerExists(_)));
}

#[tokio::test]
async fn test_upload_pathway_missing_dataset_creates_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let err = upload_pipeline(&temp_dir.path().join("missing.csv"), temp_dir.path())
        .run(&client(&server))
        .await
        .unwrap_err();
    assert!(err.is_startup());
}
