mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use pretty_assertions::assert_eq;
use serde_json::json;
use sha2::{Digest, Sha256};

use common::{body_json, seed_campus, TestApp};
use erpd::config::RatePolicyConfig;

fn upload(token: &str, name: &str, bytes: &'static [u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/uploads?name={name}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(bytes))
        .expect("request")
}

#[tokio::test]
async fn uploads_are_stored_and_owned() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, owner) = app.user_with_role(&admin, "a@uni.edu", "student").await;
    let (_, other) = app.user_with_role(&admin, "b@uni.edu", "student").await;

    let resp = app.send(upload(&owner, "notes.txt", b"lecture notes")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    let id = body["data"]["id"].as_str().expect("id").to_string();
    assert_eq!(body["data"]["fileName"], json!("notes.txt"));
    assert_eq!(body["data"]["contentType"], json!("text/plain"));
    assert_eq!(body["data"]["size"], json!(13));
    assert_eq!(
        body["data"]["sha256"],
        json!(format!("{:x}", Sha256::digest(b"lecture notes")))
    );
    let stored = std::fs::read(app.state.uploads_dir().join(&id)).expect("stored file");
    assert_eq!(stored, b"lecture notes");

    let (status, body) = app.get(&format!("/api/uploads/{id}"), &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["size"], json!(13));
    let (status, _) = app.get(&format!("/api/uploads/{id}"), &other).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get(&format!("/api/uploads/{id}"), &admin).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/uploads/nope", &admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_uploads_are_rejected() {
    let app = TestApp::with_config(|c| {
        c.rate_limits.auth = RatePolicyConfig::new(60, 1000);
        c.server.max_upload_bytes = 16;
    });
    let admin = app.admin_token().await;

    let resp = app.send(upload(&admin, "empty.txt", b"")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = app.send(upload(&admin, "..", b"data")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let resp = app
        .send(upload(&admin, "big.bin", b"this body is longer than sixteen bytes"))
        .await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(resp).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("payload_too_large"));
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn upload_policy_throttles_only_writes() {
    let app = TestApp::with_config(|c| {
        c.rate_limits.auth = RatePolicyConfig::new(60, 1000);
        c.rate_limits.upload = RatePolicyConfig::new(3600, 1);
    });
    let admin = app.admin_token().await;

    let resp = app.send(upload(&admin, "one.txt", b"1")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let id = body_json(resp).await["data"]["id"]
        .as_str()
        .expect("id")
        .to_string();
    let resp = app.send(upload(&admin, "two.txt", b"2")).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    for _ in 0..3 {
        let (status, _) = app.get(&format!("/api/uploads/{id}"), &admin).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn search_spans_students_courses_and_staff() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, lecturer) = app.user_with_role(&admin, "lec@uni.edu", "lecturer").await;
    seed_campus(&app, &admin, None).await;
    app.post(
        "/api/hr/employees",
        &admin,
        json!({
            "firstName": "Obiora",
            "lastName": "Nnaji",
            "email": "obiora@uni.edu",
            "department": "Registry",
            "position": "Clerk",
            "baseSalary": 700,
            "hireDate": "2025-02-01",
        }),
    )
    .await;

    let (status, body) = app.get("/api/search?q=obi", &admin).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["students"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"]["employees"].as_array().map(Vec::len), Some(1));

    // Staff records stay hidden from non-HR roles.
    let (_, body) = app.get("/api/search?q=obi", &lecturer).await;
    assert_eq!(body["data"]["students"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"]["employees"], json!([]));

    let (_, body) = app.get("/api/search?q=CSC", &lecturer).await;
    assert_eq!(body["data"]["courses"][0]["code"], json!("CSC101"));

    let (status, body) = app.get("/api/search?q=a", &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("bad_params"));
}
