#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use margin::auth::create_jwt;
use margin::notify::LogNotifier;
use margin::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use margin::repo::inmem::InMemRepo;
use margin::{config, AppState};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn ensure_secret() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

fn bearer(user: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", create_jwt(user).unwrap()))
}

fn state(cfg: RateLimitConfig) -> AppState {
    let limiter = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);
    AppState::new(Arc::new(InMemRepo::new()), Arc::new(LogNotifier)).with_rate_limiter(limiter)
}

#[actix_web::test]
#[serial]
async fn rate_limit_comment_creation() {
    ensure_secret();
    // only 1 comment per large window so the second is denied immediately
    let cfg = RateLimitConfig {
        comment_limit: 1,
        comment_window: Duration::from_secs(300),
        report_limit: 100,
        report_window: Duration::from_secs(60),
    };
    let app = test::init_service(App::new().app_data(actix_web::web::Data::new(state(cfg))).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/nodes")
        .insert_header(bearer("owner"))
        .set_json(&json!({"title": "RL", "is_public": true}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let node: serde_json::Value = test::read_body_json(resp).await;
    let node_id = node["id"].as_str().unwrap().to_string();

    let comment = |content: &str| {
        test::TestRequest::post()
            .uri("/api/v1/comments")
            .insert_header(bearer("alice"))
            .set_json(&json!({"target_id": node_id, "content": content}))
            .to_request()
    };
    let resp = test::call_service(&app, comment("one")).await;
    assert_eq!(resp.status(), 201);
    let resp = test::call_service(&app, comment("two")).await;
    assert_eq!(resp.status(), 429);

    // other users keep their own budget
    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .insert_header(bearer("bob"))
        .set_json(&json!({"target_id": node_id, "content": "three"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
}

#[actix_web::test]
#[serial]
async fn rate_limit_reports() {
    ensure_secret();
    let cfg = RateLimitConfig {
        comment_limit: 100,
        comment_window: Duration::from_secs(60),
        report_limit: 1,
        report_window: Duration::from_secs(300),
    };
    let app = test::init_service(App::new().app_data(actix_web::web::Data::new(state(cfg))).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/nodes")
        .insert_header(bearer("owner"))
        .set_json(&json!({"title": "RL", "is_public": true}))
        .to_request();
    let node: serde_json::Value = test::read_body_json(test::call_service(&app, req).await).await;

    let mut ids = Vec::new();
    for text in ["a", "b"] {
        let req = test::TestRequest::post()
            .uri("/api/v1/comments")
            .insert_header(bearer("author"))
            .set_json(&json!({"target_id": node["id"], "content": text}))
            .to_request();
        let c: serde_json::Value = test::read_body_json(test::call_service(&app, req).await).await;
        ids.push(c["id"].as_str().unwrap().to_string());
    }

    let report = |id: &str| {
        test::TestRequest::post()
            .uri(&format!("/api/v1/comments/{id}/reports"))
            .insert_header(bearer("bob"))
            .set_json(&json!({"category": "spam"}))
            .to_request()
    };
    assert_eq!(test::call_service(&app, report(&ids[0])).await.status(), 201);
    assert_eq!(test::call_service(&app, report(&ids[1])).await.status(), 429);
}

#[::core::prelude::v1::test]
fn disabled_limiter_allows_everything() {
    let limiter = RateLimiterFacade::disabled();
    for _ in 0..100 {
        assert!(limiter.allow_comment("u"));
    }
}
