//! Integration Tests: HTTP API
//!
//! Drives the actix routes end to end over in-memory stores.

mod common;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use common::Fixture;
use guestboard_service::config::LifecycleConfig;
use guestboard_service::handlers::{self, HealthState};
use serde_json::Value;
use std::time::Duration;

const BOUNDARY: &str = "guestboard-test-boundary";

macro_rules! app {
    ($fx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::from($fx.manager.clone()))
                .app_data(web::Data::from($fx.registry.clone()))
                .app_data(web::Data::new(HealthState {
                    meta: $fx.meta.clone(),
                    blob: $fx.blobs.clone(),
                    probe_timeout: Duration::from_secs(1),
                }))
                .configure(handlers::configure),
        )
        .await
    };
}

fn multipart(fields: &[(&str, &str)], file: Option<(&str, &str, &str)>) -> String {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    if let Some((filename, content_type, content)) = file {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n{content}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}

fn publish_request(body: String) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
}

#[actix_web::test]
async fn test_publish_then_list_and_fetch() {
    let fx = Fixture::new();
    let app = app!(fx);

    let body = multipart(
        &[("guestId", "a_b_com"), ("title", "Hello"), ("text", "first post")],
        Some(("note.txt", "text/plain", "hello world")),
    );
    let resp = test::call_service(&app, publish_request(body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let published: Value = test::read_body_json(resp).await;
    let post_id = published["postId"].as_str().unwrap().to_string();
    assert_eq!(published["post"]["title"], "Hello");
    assert_eq!(published["post"]["attachment"]["name"], "note.txt");
    assert!(published["post"]["attachment"]["url"]
        .as_str()
        .unwrap()
        .starts_with("https://cdn.guestboard.test/"));

    let req = test::TestRequest::get().uri("/api/v1/posts?limit=10").to_request();
    let listing: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["posts"][0]["id"], post_id.as_str());

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/posts/{}", post_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_publish_without_title_is_bad_request() {
    let fx = Fixture::new();
    let app = app!(fx);

    let body = multipart(&[("guestId", "a_b_com")], None);
    let resp = test::call_service(&app, publish_request(body).to_request()).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["kind"], "validation_error");
    assert_eq!(error["reason"], "missing_title");
    assert_eq!(fx.meta.inner.post_count(), 0);
}

#[actix_web::test]
async fn test_publish_with_blank_file_input_has_no_attachment() {
    let fx = Fixture::new();
    let app = app!(fx);

    let body = multipart(
        &[("guestId", "a_b_com"), ("title", "Hello")],
        Some(("", "application/octet-stream", "")),
    );
    let resp = test::call_service(&app, publish_request(body).to_request()).await;

    assert_eq!(resp.status(), StatusCode::CREATED);
    let published: Value = test::read_body_json(resp).await;
    assert_eq!(published["post"]["title"], "Hello");
    assert!(published["post"]["attachment"].is_null());
    assert!(fx.blobs.inner.is_empty());
    assert_eq!(fx.meta.inner.post_count(), 1);
}

#[actix_web::test]
async fn test_publish_oversized_file_is_rejected() {
    let fx = Fixture::with_config(LifecycleConfig {
        max_attachment_bytes: 16,
        ..Default::default()
    });
    let app = app!(fx);

    let body = multipart(
        &[("guestId", "a_b_com"), ("title", "Hello")],
        Some(("big.txt", "text/plain", "this body is longer than sixteen bytes")),
    );
    let resp = test::call_service(&app, publish_request(body).to_request()).await;

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["kind"], "attachment_error");
    assert_eq!(error["reason"], "too_large");
    assert!(fx.blobs.inner.is_empty());
    assert_eq!(fx.meta.inner.post_count(), 0);
}

#[actix_web::test]
async fn test_unknown_post_is_not_found() {
    let fx = Fixture::new();
    let app = app!(fx);

    let req = test::TestRequest::get().uri("/api/v1/posts/missing").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_guest_profile_friends_and_search() {
    let fx = Fixture::new();
    let app = app!(fx);

    let req = test::TestRequest::put()
        .uri("/api/v1/guests")
        .set_json(serde_json::json!({ "name": "Ada", "email": "ada@example.com" }))
        .to_request();
    let guest: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(guest["id"], "ada_example_com");

    let req = test::TestRequest::post()
        .uri("/api/v1/guests/ada_example_com/friends")
        .set_json(serde_json::json!({ "friendId": "bob_example_com" }))
        .to_request();
    let guest: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(guest["friends"], serde_json::json!(["bob_example_com"]));

    let req = test::TestRequest::get()
        .uri("/api/v1/guests/search?q=ADA")
        .to_request();
    let found: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(found.as_array().unwrap().len(), 1);

    let req = test::TestRequest::get()
        .uri("/api/v1/guests/ada_example_com")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_invalid_guest_email_rejected() {
    let fx = Fixture::new();
    let app = app!(fx);

    let req = test::TestRequest::put()
        .uri("/api/v1/guests")
        .set_json(serde_json::json!({ "email": "nobody" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_health_and_metrics_endpoints() {
    let fx = Fixture::new();
    let app = app!(fx);

    for uri in [
        "/api/v1/health",
        "/api/v1/health/live",
        "/api/v1/health/ready",
        "/metrics",
    ] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
    }
}
