//! Integration tests for the SSE events endpoint.

mod common;

use std::time::Duration;

use common::TestHarness;
use futures::StreamExt;

use mf_core::events::JobEvent;
use mf_core::{JobId, OwnerId, SafetyVerdict};
use mf_pipeline::testing::{mp4_bytes, Mp4Fixture};

/// Read the SSE body until `needle` shows up, returning everything read.
async fn read_until(resp: reqwest::Response, needle: &str) -> String {
    let mut stream = resp.bytes_stream();
    let mut text = String::new();
    let read = async {
        while let Some(chunk) = stream.next().await {
            text.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            if text.contains(needle) {
                return;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .unwrap_or_else(|_| panic!("never saw {needle:?}"));
    text
}

async fn connect(addr: std::net::SocketAddr, owner: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("http://{addr}/api/events"))
        .header("x-owner-id", owner)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn sse_stream_connects() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = connect(addr, "alice").await;
    assert_eq!(resp.status(), 200);

    let ct = resp.headers()["content-type"].to_str().unwrap();
    assert!(ct.contains("text/event-stream"), "expected SSE content-type, got: {ct}");
}

#[tokio::test]
async fn sse_requires_identity() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/api/events")).await.unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn subscribers_only_see_their_own_events() {
    let (h, addr) = TestHarness::with_server().await;
    let resp = connect(addr, "alice").await;
    assert_eq!(resp.status(), 200);

    let bob_job = JobId::new();
    let alice_job = JobId::new();
    h.ctx
        .event_bus
        .publish(JobEvent::failed(bob_job, OwnerId::from("bob"), "nope"));
    h.ctx.event_bus.publish(JobEvent::completed(
        alice_job,
        OwnerId::from("alice"),
        SafetyVerdict::Safe,
        3.0,
    ));

    let text = read_until(resp, &alice_job.to_string()).await;
    assert!(text.contains("event: completed"));
    assert!(!text.contains(&bob_job.to_string()));
}

#[tokio::test]
async fn pipeline_run_streams_progress_then_completion() {
    let (h, addr) = TestHarness::with_server().await;
    let resp = connect(addr, "alice").await;

    let job = h
        .completed_job("alice", &mp4_bytes(&Mp4Fixture::default()))
        .await;

    let text = read_until(resp, "event: completed").await;
    assert_eq!(text.matches("event: progress").count(), 6);
    assert!(text.contains(&job.id.to_string()));
    assert!(text.contains("\"percent\":95"));

    let last_progress = text.rfind("event: progress").unwrap();
    assert!(last_progress < text.find("event: completed").unwrap());
}
