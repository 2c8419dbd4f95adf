//! In-process router tests driven through `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use common::TestHarness;
use http_body_util::BodyExt;
use tower::ServiceExt;

use mf_core::config::Config;
use mf_core::JobStatus;
use mf_pipeline::testing::{mp4_bytes, mp4_of_size, Mp4Fixture};

async fn body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let h = TestHarness::new().await;
    let response = h
        .router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn api_requires_identity() {
    let h = TestHarness::new().await;
    let response = h
        .router()
        .oneshot(Request::get("/api/jobs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn error_bodies_carry_the_request_id() {
    let h = TestHarness::new().await;
    let job = h.queued_job("alice", &mp4_bytes(&Mp4Fixture::default())).await;

    let response = h
        .router()
        .oneshot(
            Request::get(format!("/api/jobs/{}", job.id))
                .header("x-owner-id", "mallory")
                .header("x-request-id", "req-404")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["code"], "not_found");
    assert_eq!(json["request_id"], "req-404");

    let response = h
        .router()
        .oneshot(Request::get("/api/jobs").header("x-request-id", "req-401").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["request_id"], "req-401");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = TestHarness::new().await;
    let response = h
        .router()
        .oneshot(Request::get("/api/nope").header("x-owner-id", "alice").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_utf8_range_is_unsatisfiable() {
    let h = TestHarness::new().await;
    let job = h.completed_job("alice", &mp4_of_size(1000)).await;

    let response = h
        .router()
        .oneshot(
            Request::get(format!("/api/jobs/{}/stream", job.id))
                .header("x-owner-id", "alice")
                .header(header::RANGE, HeaderValue::from_bytes(b"bytes=0-0\xff").unwrap())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
}

#[tokio::test]
async fn chunked_upload_over_limit_is_rejected_while_streaming() {
    let mut config = Config::default();
    config.server.max_upload_bytes = 100;
    let h = TestHarness::with_config(config).await;

    // No Content-Length: the limit is enforced as bytes arrive.
    let response = h
        .router()
        .oneshot(
            Request::post("/api/uploads")
                .header("x-owner-id", "alice")
                .header(header::CONTENT_TYPE, "video/mp4")
                .body(Body::from(mp4_bytes(&Mp4Fixture::default())))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["code"], "validation_error");

    let (jobs, total) = mf_db::queries::jobs::list_jobs_for_owner(
        &h.conn(),
        &"alice".into(),
        &Default::default(),
        1,
        10,
    )
    .unwrap();
    assert!(jobs.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn upload_without_length_is_accepted() {
    let h = TestHarness::new().await;
    let clip = mp4_bytes(&Mp4Fixture::default());

    let response = h
        .router()
        .oneshot(
            Request::post("/api/uploads?title=Clip&description=first%20take")
                .header("x-owner-id", "alice")
                .header(header::CONTENT_TYPE, "video/quicktime")
                .body(Body::from(clip.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response.into_body()).await;
    assert_eq!(json["size_bytes"], clip.len() as u64);
    assert_eq!(json["content_type"], "video/quicktime");
    assert_eq!(json["description"], "first take");

    let id = json["id"].as_str().unwrap().parse().unwrap();
    let job = mf_db::queries::jobs::get_job(&h.conn(), id).unwrap().unwrap();
    let job = h.wait_for_status(&job, JobStatus::Completed).await;
    assert_eq!(job.size_bytes, clip.len() as u64);
}
