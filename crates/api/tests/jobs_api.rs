//! End-to-end tests for the `/jobs` and `/formats` endpoints over in-memory
//! collaborators, with a real conversion worker draining the queue.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{body_json, convert_request, get, png_bytes, test_config, token, Backend};
use pixelforge_db::models::status::JobStatus;
use pixelforge_storage::BlobKind;
use tower::ServiceExt;

const CONVERT: &str = "/api/v1/jobs/convert";

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn png_to_jpeg_succeeds_and_can_be_downloaded() {
    let backend = Backend::new();
    let app = backend.app();
    let token = token(1);

    let response = app
        .clone()
        .oneshot(convert_request(CONVERT, &token, "cat.png", &png_bytes(), Some("jpeg")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let job = &json["data"];
    assert_eq!(job["status"], "PENDING");
    assert_eq!(job["filename"], "cat.png");
    assert_eq!(job["original_format"], "png");
    assert_eq!(job["target_format"], "jpeg");
    assert_eq!(job["user_id"], 1);
    assert!(job["output_path"].is_null());
    assert!(job.get("error_message").is_none());
    let job_id = job["id"].as_i64().unwrap();
    assert_eq!(backend.queue.len(), 1);

    assert_eq!(backend.runner().drain().await.unwrap(), 1);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/jobs/status/{job_id}"), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["data"]["status"], "SUCCESS");
    assert!(!status["data"]["started_at"].is_null());
    assert!(!status["data"]["finished_at"].is_null());

    let stored = backend.job(job_id).await;
    let output_path = stored.output_path.clone().unwrap();
    assert!(stored.invariants_hold());
    let converted = backend
        .blobs
        .object(BlobKind::Converted, &output_path)
        .unwrap();
    assert_eq!(converted.content_type, "image/jpeg");

    let response = app
        .oneshot(get(&format!("/api/v1/jobs/download/{job_id}"), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let download = body_json(response).await;
    let url = download["data"]["url"].as_str().unwrap();
    assert!(url.starts_with(&format!("memory://converted/{output_path}")));
    assert_eq!(download["data"]["filename"], "cat.jpeg");
    assert!(download["data"]["expires_at"].is_string());
}

#[tokio::test]
async fn unsupported_target_is_rejected_before_anything_is_written() {
    let backend = Backend::new();

    let response = backend
        .app()
        .oneshot(convert_request(CONVERT, &token(1), "cat.png", &png_bytes(), Some("exe")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "UNSUPPORTED_FORMAT");
    assert!(backend.store.all().is_empty());
    assert!(backend.blobs.is_empty());
    assert!(backend.queue.is_empty());
}

#[tokio::test]
async fn unsupported_source_extension_is_rejected() {
    let backend = Backend::new();

    let response = backend
        .app()
        .oneshot(convert_request(CONVERT, &token(1), "notes.txt", b"hello", Some("png")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "UNSUPPORTED_FORMAT");
    assert!(backend.store.all().is_empty());
}

#[tokio::test]
async fn missing_target_format_is_a_validation_error() {
    let backend = Backend::new();

    let response = backend
        .app()
        .oneshot(convert_request(CONVERT, &token(1), "cat.png", &png_bytes(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    assert!(backend.store.all().is_empty());
}

#[tokio::test]
async fn target_format_may_come_from_the_query_string() {
    let backend = Backend::new();

    let response = backend
        .app()
        .oneshot(convert_request(
            &format!("{CONVERT}?target_format=WEBP"),
            &token(1),
            "cat.png",
            &png_bytes(),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["data"]["target_format"], "webp");
}

#[tokio::test]
async fn empty_upload_is_rejected() {
    let backend = Backend::new();

    let response = backend
        .app()
        .oneshot(convert_request(CONVERT, &token(1), "cat.png", b"", Some("jpeg")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(backend.store.all().is_empty());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let mut config = test_config();
    config.max_upload_bytes = 1024;
    let backend = Backend::with_config(config);

    let response = backend
        .app()
        .oneshot(convert_request(CONVERT, &token(1), "big.png", &vec![0u8; 8 * 1024], Some("jpeg")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(backend.store.all().is_empty());
}

#[tokio::test]
async fn blob_store_outage_on_submit_is_503_and_creates_nothing() {
    let backend = Backend::new();
    backend.blobs.set_unavailable(true);

    let response = backend
        .app()
        .oneshot(convert_request(CONVERT, &token(1), "cat.png", &png_bytes(), Some("gif")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "UPSTREAM_UNAVAILABLE");
    assert!(backend.store.all().is_empty());
    assert!(backend.queue.is_empty());
}

#[tokio::test]
async fn missing_source_blob_fails_the_job() {
    let backend = Backend::new();
    let app = backend.app();
    let token = token(1);

    let response = app
        .clone()
        .oneshot(convert_request(CONVERT, &token, "cat.png", &png_bytes(), Some("bmp")))
        .await
        .unwrap();
    let job_id = body_json(response).await["data"]["id"].as_i64().unwrap();
    let input_path = backend.job(job_id).await.input_path;
    backend.blobs.remove(BlobKind::Upload, &input_path).unwrap();

    backend.runner().drain().await.unwrap();

    let job = backend.job(job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.finished_at.is_some());
    assert!(job.output_path.is_none());

    let response = app
        .oneshot(get(&format!("/api/v1/jobs/download/{job_id}"), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "NOT_READY");
}

// ---------------------------------------------------------------------------
// Status / download ownership
// ---------------------------------------------------------------------------

#[tokio::test]
async fn another_users_job_is_not_found() {
    let backend = Backend::new();
    let job = backend.insert_job(1).await;
    let app = backend.app();

    for uri in [
        format!("/api/v1/jobs/status/{}", job.id),
        format!("/api/v1/jobs/download/{}", job.id),
    ] {
        let response = app.clone().oneshot(get(&uri, &token(2))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body_json(response).await["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let backend = Backend::new();

    let response = backend
        .app()
        .oneshot(get("/api/v1/jobs/status/999", &token(1)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn download_before_success_is_not_ready() {
    let backend = Backend::new();
    let job = backend.insert_job(1).await;

    let response = backend
        .app()
        .oneshot(get(&format!("/api/v1/jobs/download/{}", job.id), &token(1)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "NOT_READY");
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_pages_over_owned_jobs_only() {
    let backend = Backend::new();
    for _ in 0..25 {
        backend.insert_job(1).await;
    }
    for _ in 0..4 {
        backend.insert_job(2).await;
    }
    let app = backend.app();

    let response = app
        .clone()
        .oneshot(get("/api/v1/jobs?page=2&size=10", &token(1)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await["data"].clone();

    assert_eq!(page["count"], 25);
    assert_eq!(page["pages"], 3);
    assert_eq!(page["page"], 2);
    assert_eq!(page["size"], 10);
    assert_eq!(page["prev_url"], "/api/v1/jobs?page=1&size=10");
    assert_eq!(page["next_url"], "/api/v1/jobs?page=3&size=10");

    let results = page["results"].as_array().unwrap();
    assert_eq!(results.len(), 10);
    assert!(results.iter().all(|j| j["user_id"] == 1));
    let ids: Vec<i64> = results.iter().map(|j| j["id"].as_i64().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] > w[1]), "newest first: {ids:?}");

    let response = app
        .oneshot(get("/api/v1/jobs?page=3&size=10", &token(1)))
        .await
        .unwrap();
    let last = body_json(response).await["data"].clone();
    assert_eq!(last["results"].as_array().unwrap().len(), 5);
    assert!(last["next_url"].is_null());
}

#[tokio::test]
async fn list_clamps_page_size() {
    let backend = Backend::new();
    backend.insert_job(1).await;

    let response = backend
        .app()
        .oneshot(get("/api/v1/jobs?size=5000", &token(1)))
        .await
        .unwrap();

    let page = body_json(response).await["data"].clone();
    assert_eq!(page["size"], 100);
    assert_eq!(page["pages"], 1);
    assert!(page["prev_url"].is_null());
}

// ---------------------------------------------------------------------------
// Formats and auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn formats_lists_every_supported_format() {
    let backend = Backend::new();

    let response = backend
        .app()
        .oneshot(get("/api/v1/formats/image", &token(1)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["data"],
        serde_json::json!(["png", "jpg", "jpeg", "bmp", "gif", "tiff", "webp"])
    );
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let backend = Backend::new();
    let app = backend.app();

    for uri in ["/api/v1/formats/image", "/api/v1/jobs", "/api/v1/jobs/status/1"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
    }
}

#[tokio::test]
async fn invalid_token_is_unauthorized() {
    let backend = Backend::new();

    let response = backend
        .app()
        .oneshot(get("/api/v1/jobs", "not-a-token"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let backend = Backend::new();

    let response = backend
        .app()
        .oneshot(get("/api/v1/formats/image", &token(1)))
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}
