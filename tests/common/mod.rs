#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use erpd::api::{build_router, AppState, SharedState};
use erpd::config::{AppConfig, RatePolicyConfig};
use erpd::ratelimit::ManualClock;

pub const ADMIN_EMAIL: &str = "admin@erp.local";
pub const ADMIN_PASSWORD: &str = "change-me-now";
pub const PASSWORD: &str = "s3cret-pass";

pub struct TestApp {
    pub router: Router,
    pub state: SharedState,
    pub clock: Arc<ManualClock>,
    _dir: TempDir,
}

impl TestApp {
    /// Fresh data directory with generous limits on every policy.
    pub fn new() -> Self {
        Self::with_config(|c| {
            c.rate_limits.general = RatePolicyConfig::new(900, 10_000);
            c.rate_limits.auth = RatePolicyConfig::new(900, 10_000);
            c.rate_limits.admin = RatePolicyConfig::new(900, 10_000);
            c.rate_limits.search = RatePolicyConfig::new(60, 10_000);
            c.rate_limits.upload = RatePolicyConfig::new(3600, 10_000);
        })
    }

    pub fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.server.data_dir = dir.path().to_path_buf();
        adjust(&mut config);

        let clock = Arc::new(ManualClock::new());
        let state = AppState::open_with_clock(config, clock.clone()).expect("open state");
        let router = build_router(state.clone());
        Self {
            router,
            state,
            clock,
            _dir: dir,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.expect("router")
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        let req = match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        let resp = self.send(req).await;
        let status = resp.status();
        (status, body_json(resp).await)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request("GET", uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request("PUT", uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request("DELETE", uri, Some(token), None).await
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["data"]["token"]
            .as_str()
            .expect("token")
            .to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Create an account with `role` and return `(user id, token)`.
    pub async fn user_with_role(&self, admin: &str, email: &str, role: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/api/admin/users",
                admin,
                json!({ "email": email, "password": PASSWORD, "fullName": email, "role": role }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create user: {}", body);
        let id = data_id(&body);
        let token = self.login(email, PASSWORD).await;
        (id, token)
    }
}

pub async fn body_json(resp: Response) -> Value {
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
}

pub fn data_id(body: &Value) -> String {
    body["data"]["id"].as_str().expect("data.id").to_string()
}

pub struct Campus {
    pub faculty_id: String,
    pub department_id: String,
    pub course_id: String,
    pub student_id: String,
}

/// One faculty, department, 3-credit course and student; the student is linked to `student_user`.
pub async fn seed_campus(app: &TestApp, admin: &str, student_user: Option<&str>) -> Campus {
    let (s, b) = app
        .post("/api/academic/faculties", admin, json!({ "name": "Science" }))
        .await;
    assert_eq!(s, StatusCode::CREATED, "{}", b);
    let faculty_id = data_id(&b);

    let (s, b) = app
        .post(
            "/api/academic/departments",
            admin,
            json!({ "name": "Computing", "facultyId": faculty_id }),
        )
        .await;
    assert_eq!(s, StatusCode::CREATED, "{}", b);
    let department_id = data_id(&b);

    let (s, b) = app
        .post(
            "/api/academic/courses",
            admin,
            json!({
                "code": "csc101",
                "title": "Intro to Programming",
                "credits": 3,
                "departmentId": department_id,
                "semester": 1,
                "academicYear": "2026/2027",
            }),
        )
        .await;
    assert_eq!(s, StatusCode::CREATED, "{}", b);
    let course_id = data_id(&b);

    let (s, b) = app
        .post(
            "/api/academic/students",
            admin,
            json!({
                "matricule": "CS-0001",
                "firstName": "Ada",
                "lastName": "Obi",
                "facultyId": faculty_id,
                "departmentId": department_id,
                "userId": student_user,
            }),
        )
        .await;
    assert_eq!(s, StatusCode::CREATED, "{}", b);
    let student_id = data_id(&b);

    Campus {
        faculty_id,
        department_id,
        course_id,
        student_id,
    }
}
