use axum::{
    extract::{Path, State},
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::ApiError;
use crate::api::helpers::{
    created, list_page, new_id, normalize_email, now_rfc3339, ok, required, ApiResult, Filters,
    Page, Params, Payload,
};
use crate::api::types::SharedState;
use crate::auth::{self, CurrentUser, Role};
use crate::backup;

const USER_SELECT: &str = "id, email, full_name, role, active, created_at";

fn user_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "email": r.get::<_, String>(1)?,
        "fullName": r.get::<_, String>(2)?,
        "role": r.get::<_, String>(3)?,
        "active": r.get::<_, i64>(4)? != 0,
        "createdAt": r.get::<_, String>(5)?,
    }))
}

fn load_user_json(conn: &rusqlite::Connection, id: &str) -> Result<Value, ApiError> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?", USER_SELECT),
        [id],
        user_json,
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::NotFound(_) => ApiError::not_found("user"),
        other => other,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<String>,
    role: Option<String>,
    active: Option<bool>,
}

async fn list_users(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<UserQuery>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let mut f = Filters::new();
    f.eq("role", q.role.as_deref())
        .eq_int("active", q.active.map(i64::from))
        .search(&["email", "full_name"], q.search.as_deref());
    let conn = state.conn()?;
    ok(list_page(
        &conn,
        USER_SELECT,
        "users",
        &f,
        "created_at",
        &page,
        user_json,
    )?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserBody {
    email: String,
    password: String,
    full_name: String,
    role: String,
}

async fn create_user(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<CreateUserBody>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let email = normalize_email(&body.email)?;
    let full_name = required("fullName", &body.full_name)?;
    let role: Role = body.role.parse()?;
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
            role.as_str(),
            now_rfc3339(),
        ),
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("email is already registered"),
        other => other,
    })?;
    info!(user_id = %id, role = %role, by = %user.id, "user created");
    created(load_user_json(&conn, &id)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUserBody {
    full_name: Option<String>,
    role: Option<String>,
    active: Option<bool>,
}

async fn update_user(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<UpdateUserBody>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let role = body.role.as_deref().map(str::parse::<Role>).transpose()?;
    if id == user.id && (body.active == Some(false) || role.is_some_and(|r| r != Role::Admin)) {
        return Err(ApiError::conflict(
            "administrators cannot deactivate or demote themselves",
        ));
    }

    let conn = state.conn()?;
    load_user_json(&conn, &id)?;
    if let Some(v) = body.full_name {
        conn.execute(
            "UPDATE users SET full_name = ? WHERE id = ?",
            (required("fullName", &v)?, &id),
        )?;
    }
    if let Some(r) = role {
        conn.execute("UPDATE users SET role = ? WHERE id = ?", (r.as_str(), &id))?;
    }
    if let Some(active) = body.active {
        conn.execute(
            "UPDATE users SET active = ? WHERE id = ?",
            (i64::from(active), &id),
        )?;
        if !active {
            let revoked = auth::revoke_user_sessions(&conn, &id)?;
            info!(user_id = %id, revoked, "user deactivated");
        }
    }
    ok(load_user_json(&conn, &id)?)
}

async fn stats(State(state): State<SharedState>, user: CurrentUser) -> ApiResult {
    user.require(&[Role::Admin])?;
    let conn = state.conn()?;
    let one = |sql: &str| -> Result<i64, ApiError> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };

    ok(json!({
        "users": one("SELECT COUNT(*) FROM users")?,
        "activeUsers": one("SELECT COUNT(*) FROM users WHERE active = 1")?,
        "students": one("SELECT COUNT(*) FROM students")?,
        "courses": one("SELECT COUNT(*) FROM courses")?,
        "employees": one("SELECT COUNT(*) FROM employees WHERE status = 'active'")?,
        "openInvoices": one(
            "SELECT COUNT(*) FROM invoices WHERE status IN ('unpaid', 'partial')"
        )?,
        "pendingLeaveRequests": one(
            "SELECT COUNT(*) FROM leave_requests WHERE status = 'pending'"
        )?,
    }))
}

async fn create_backup(State(state): State<SharedState>, user: CurrentUser) -> ApiResult {
    user.require(&[Role::Admin])?;
    let info = tokio::task::spawn_blocking(move || -> Result<backup::BundleInfo, ApiError> {
        let conn = state.conn()?;
        Ok(backup::create_bundle(&conn, &state.backups_dir())?)
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))??;

    info!(file = %info.file_name, size = info.size, by = %user.id, "backup created");
    created(json!(info))
}

async fn list_backups(State(state): State<SharedState>, user: CurrentUser) -> ApiResult {
    user.require(&[Role::Admin])?;
    let dir = state.backups_dir();
    let bundles = tokio::task::spawn_blocking(move || backup::list_bundles(&dir))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;
    ok(json!({ "items": bundles, "total": bundles.len() }))
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", put(update_user))
        .route("/stats", get(stats))
        .route("/backups", get(list_backups).post(create_backup))
}
