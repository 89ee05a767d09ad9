mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
};
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{body_json, TestApp, ADMIN_EMAIL};
use erpd::config::RatePolicyConfig;

const PROXY: &str = "10.9.9.9";

/// A failed login arriving on a socket from `peer`, claiming to be `forwarded_for`.
fn bad_login(peer: &str, forwarded_for: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", forwarded_for)
        .body(Body::from(
            json!({ "email": ADMIN_EMAIL, "password": "wrong-password" }).to_string(),
        ))
        .expect("request");
    let addr: SocketAddr = format!("{peer}:40000").parse().expect("socket addr");
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

#[tokio::test]
async fn auth_policy_rejects_after_threshold_until_window_passes() {
    let app = TestApp::with_config(|c| {
        c.rate_limits.auth = RatePolicyConfig::new(900, 3);
        c.server.trusted_proxies = vec![PROXY.parse().expect("ip")];
    });

    for _ in 0..3 {
        let resp = app.send(bad_login(PROXY, "10.0.0.1")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    let resp = app.send(bad_login(PROXY, "10.0.0.1")).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry: u64 = resp
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("retry-after header");
    assert!(retry >= 1 && retry <= 900, "retry-after {retry}");
    let body = body_json(resp).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("rate_limited"));

    // Other clients behind the proxy keep their own budget.
    let resp = app.send(bad_login(PROXY, "10.0.0.2")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    app.clock.advance(Duration::from_secs(901));
    let resp = app.send(bad_login(PROXY, "10.0.0.1")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn forwarded_headers_from_untrusted_peers_are_ignored() {
    let app = TestApp::with_config(|c| {
        c.rate_limits.auth = RatePolicyConfig::new(900, 3);
        c.server.trusted_proxies = vec![PROXY.parse().expect("ip")];
    });

    let mut limited = 0;
    for i in 0..20 {
        let resp = app
            .send(bad_login("198.51.100.4", &format!("203.0.113.{i}")))
            .await;
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }
    assert_eq!(limited, 17);

    // The same socket address is throttled whatever it claims to be.
    let resp = app.send(bad_login("198.51.100.4", "10.0.0.77")).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let resp = app.send(bad_login("198.51.100.5", "10.0.0.77")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn general_policy_adds_limit_headers() {
    let app = TestApp::with_config(|c| c.rate_limits.general = RatePolicyConfig::new(60, 2));
    let token = app.admin_token().await;

    let req = || {
        Request::builder()
            .uri("/api/auth/me")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request")
    };

    // The login above already used one slot.
    let resp = app.send(req()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-ratelimit-limit"], "2");
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "0");

    let resp = app.send(req()).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn health_is_never_throttled() {
    let app = TestApp::with_config(|c| c.rate_limits.general = RatePolicyConfig::new(60, 1));
    for _ in 0..5 {
        let (status, _) = app.request("GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn admin_policy_is_keyed_by_user() {
    let app = TestApp::with_config(|c| {
        c.rate_limits.general = RatePolicyConfig::new(60, 1000);
        c.rate_limits.auth = RatePolicyConfig::new(60, 1000);
        c.rate_limits.admin = RatePolicyConfig::new(60, 2);
    });
    let admin = app.admin_token().await;

    let (status, _) = app.get("/api/admin/stats", &admin).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/admin/stats", &admin).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.get("/api/admin/stats", &admin).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], json!("rate_limited"));

    // Academic routes only see the general policy.
    let (status, _) = app.get("/api/academic/faculties", &admin).await;
    assert_eq!(status, StatusCode::OK);
}
