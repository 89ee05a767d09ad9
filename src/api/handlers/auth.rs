use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post, put},
    Router,
};
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::helpers::{
    created, new_id, normalize_email, now_rfc3339, ok, required, ApiResult, Payload,
};
use crate::api::types::SharedState;
use crate::auth::{self, CurrentUser, Role};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    email: String,
    password: String,
    full_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordBody {
    current_password: String,
    new_password: String,
}

async fn login(State(state): State<SharedState>, Payload(body): Payload<LoginBody>) -> ApiResult {
    let email = body.email.trim().to_ascii_lowercase();
    let conn = state.conn()?;

    let row = conn
        .query_row(
            "SELECT id, password_hash, full_name, role, active FROM users WHERE email = ?",
            [&email],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, i64>(4)? != 0,
                ))
            },
        )
        .optional()?;

    let Some((id, hash, full_name, role, active)) = row else {
        return Err(ApiError::Unauthorized("invalid email or password".to_string()));
    };
    if !auth::verify_password(&body.password, &hash) {
        return Err(ApiError::Unauthorized("invalid email or password".to_string()));
    }
    if !active {
        return Err(ApiError::Unauthorized("account is disabled".to_string()));
    }

    let (token, expires_at) = auth::create_session(&conn, &id, state.config.auth.token_ttl_hours)?;
    let user = CurrentUser {
        id,
        email,
        full_name,
        role: role.parse()?,
    };
    info!(user_id = %user.id, role = %user.role, "login");

    ok(json!({
        "token": token,
        "expiresAt": expires_at,
        "user": user.to_json(),
    }))
}

async fn register(
    State(state): State<SharedState>,
    Payload(body): Payload<RegisterBody>,
) -> ApiResult {
    if !state.config.auth.allow_registration {
        return Err(ApiError::Forbidden("self-registration is disabled".to_string()));
    }
    let email = normalize_email(&body.email)?;
    let full_name = required("fullName", &body.full_name)?;
    auth::validate_new_password(&body.password)?;

    let conn = state.conn()?;
    let id = new_id();
    conn.execute(
        "INSERT INTO users(id, email, password_hash, full_name, role, active, created_at)
         VALUES(?, ?, ?, ?, ?, 1, ?)",
        (
            &id,
            &email,
            auth::hash_password(&body.password)?,
            &full_name,
            Role::Student.as_str(),
            now_rfc3339(),
        ),
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("email is already registered"),
        other => other,
    })?;

    let (token, expires_at) = auth::create_session(&conn, &id, state.config.auth.token_ttl_hours)?;
    let user = CurrentUser {
        id,
        email,
        full_name,
        role: Role::Student,
    };
    info!(user_id = %user.id, "registered");

    created(json!({
        "token": token,
        "expiresAt": expires_at,
        "user": user.to_json(),
    }))
}

async fn logout(
    State(state): State<SharedState>,
    _user: CurrentUser,
    headers: HeaderMap,
) -> ApiResult {
    let Some(token) = auth::bearer_token(&headers) else {
        return Err(ApiError::Unauthorized("authentication required".to_string()));
    };
    let conn = state.conn()?;
    auth::revoke_session(&conn, token)?;
    ok(json!({ "loggedOut": true }))
}

async fn me(State(state): State<SharedState>, user: CurrentUser) -> ApiResult {
    let conn = state.conn()?;
    let student_id: Option<String> = conn
        .query_row("SELECT id FROM students WHERE user_id = ?", [&user.id], |r| {
            r.get(0)
        })
        .optional()?;
    let employee_id: Option<String> = conn
        .query_row("SELECT id FROM employees WHERE user_id = ?", [&user.id], |r| {
            r.get(0)
        })
        .optional()?;

    let mut data = user.to_json();
    data["studentId"] = json!(student_id);
    data["employeeId"] = json!(employee_id);
    ok(data)
}

async fn change_password(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<PasswordBody>,
) -> ApiResult {
    auth::validate_new_password(&body.new_password)?;
    let conn = state.conn()?;
    let hash: String = conn.query_row(
        "SELECT password_hash FROM users WHERE id = ?",
        [&user.id],
        |r| r.get(0),
    )?;
    if !auth::verify_password(&body.current_password, &hash) {
        return Err(ApiError::bad_params("current password is incorrect"));
    }

    conn.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        (auth::hash_password(&body.new_password)?, &user.id),
    )?;
    // Every existing session is invalidated; the caller gets a fresh token.
    auth::revoke_user_sessions(&conn, &user.id)?;
    let (token, expires_at) =
        auth::create_session(&conn, &user.id, state.config.auth.token_ttl_hours)?;
    info!(user_id = %user.id, "password changed");

    ok(json!({ "token": token, "expiresAt": expires_at }))
}

/// Routes throttled by the authentication policy.
pub fn credential_routes() -> Router<SharedState> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
}

pub fn session_routes() -> Router<SharedState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/password", put(change_password))
}
