mod common;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{seed_campus, TestApp, PASSWORD};

#[tokio::test]
async fn user_accounts_are_admin_managed() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (lecturer_id, lecturer) = app.user_with_role(&admin, "lec@uni.edu", "lecturer").await;

    let (status, _) = app.get("/api/admin/users", &lecturer).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            "/api/admin/users",
            &admin,
            json!({
                "email": "LEC@uni.edu",
                "password": PASSWORD,
                "fullName": "Dup",
                "role": "lecturer",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);

    let (status, _) = app
        .post(
            "/api/admin/users",
            &admin,
            json!({ "email": "x@uni.edu", "password": PASSWORD, "fullName": "X", "role": "dean" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get("/api/admin/users?role=lecturer", &admin).await;
    assert_eq!(body["data"]["total"], json!(1));
    assert_eq!(body["data"]["items"][0]["email"], json!("lec@uni.edu"));

    let (status, body) = app
        .put(
            &format!("/api/admin/users/{lecturer_id}"),
            &admin,
            json!({ "role": "hr", "fullName": "Now HR" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["role"], json!("hr"));
    assert_eq!(body["data"]["fullName"], json!("Now HR"));

    // Deactivation ends existing sessions and blocks new logins.
    let (status, _) = app
        .put(
            &format!("/api/admin/users/{lecturer_id}"),
            &admin,
            json!({ "active": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/auth/me", &lecturer).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "lec@uni.edu", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app.get("/api/admin/users?active=false", &admin).await;
    assert_eq!(body["data"]["total"], json!(1));
}

#[tokio::test]
async fn admins_cannot_lock_themselves_out() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, me) = app.get("/api/auth/me", &admin).await;
    let admin_id = me["data"]["id"].as_str().expect("id").to_string();

    let (status, _) = app
        .put(&format!("/api/admin/users/{admin_id}"), &admin, json!({ "active": false }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .put(&format!("/api/admin/users/{admin_id}"), &admin, json!({ "role": "student" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .put(&format!("/api/admin/users/{admin_id}"), &admin, json!({ "fullName": "Root" }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn stats_count_the_whole_system() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    app.user_with_role(&admin, "lec@uni.edu", "lecturer").await;
    seed_campus(&app, &admin, None).await;

    let (status, body) = app.get("/api/admin/stats", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({
            "users": 2,
            "activeUsers": 2,
            "students": 1,
            "courses": 1,
            "employees": 0,
            "openInvoices": 0,
            "pendingLeaveRequests": 0,
        })
    );
}

#[tokio::test]
async fn backups_are_created_and_listed() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    seed_campus(&app, &admin, None).await;

    let (_, body) = app.get("/api/admin/backups", &admin).await;
    assert_eq!(body["data"]["total"], json!(0));

    let (status, body) = app.post("/api/admin/backups", &admin, json!({})).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let file_name = body["data"]["fileName"].as_str().expect("file name").to_string();
    assert!(file_name.starts_with("erp-backup-") && file_name.ends_with(".zip"));
    assert_eq!(body["data"]["rowCounts"]["students"], json!(1));

    let (status, body) = app.get("/api/admin/backups", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(1));
    assert_eq!(body["data"]["items"][0]["fileName"], json!(file_name));
    assert!(app.state.backups_dir().join(&file_name).is_file());
}
