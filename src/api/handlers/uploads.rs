use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Path, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::api::helpers::{created, new_id, now_rfc3339, ok, ApiResult, Params};
use crate::api::types::SharedState;
use crate::auth::{CurrentUser, Role};

const MAX_NAME_LEN: usize = 255;

/// A bare file name: no directories, no control characters.
pub fn clean_file_name(name: &str) -> Result<String, ApiError> {
    let n = name.trim();
    let valid = !n.is_empty()
        && n.len() <= MAX_NAME_LEN
        && n != "."
        && n != ".."
        && !n.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if !valid {
        return Err(ApiError::bad_params("name must be a plain file name"));
    }
    Ok(n.to_string())
}

#[derive(Debug, Deserialize)]
struct UploadQuery {
    name: Option<String>,
}

async fn upload(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<UploadQuery>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult {
    let body = body?;
    let file_name = clean_file_name(q.name.as_deref().unwrap_or(""))?;
    if body.is_empty() {
        return Err(ApiError::bad_params("upload body is empty"));
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let sha256 = format!("{:x}", Sha256::digest(&body));

    let id = new_id();
    let dir = state.uploads_dir();
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        ApiError::Internal(anyhow::Error::from(e).context("failed to create uploads directory"))
    })?;
    let path = dir.join(&id);
    tokio::fs::write(&path, &body)
        .await
        .map_err(|e| ApiError::Internal(anyhow::Error::from(e).context("failed to store upload")))?;

    let inserted = {
        let conn = state.conn()?;
        conn.execute(
            "INSERT INTO uploads(id, owner_id, file_name, content_type, size, sha256, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                id,
                user.id,
                file_name,
                content_type,
                body.len() as i64,
                sha256,
                now_rfc3339(),
            ],
        )
    };
    if let Err(e) = inserted {
        if let Err(rm) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %rm, "failed to remove orphaned upload");
        }
        return Err(e.into());
    }

    info!(upload_id = %id, owner = %user.id, size = body.len(), "file uploaded");
    created(json!({
        "id": id,
        "fileName": file_name,
        "contentType": content_type,
        "size": body.len(),
        "sha256": sha256,
    }))
}

async fn metadata(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    let (owner, data): (String, Value) = conn
        .query_row(
            "SELECT owner_id, id, file_name, content_type, size, sha256, created_at
             FROM uploads WHERE id = ?",
            [&id],
            |r| {
                Ok((
                    r.get(0)?,
                    json!({
                        "id": r.get::<_, String>(1)?,
                        "ownerId": r.get::<_, String>(0)?,
                        "fileName": r.get::<_, String>(2)?,
                        "contentType": r.get::<_, String>(3)?,
                        "size": r.get::<_, i64>(4)?,
                        "sha256": r.get::<_, String>(5)?,
                        "createdAt": r.get::<_, String>(6)?,
                    }),
                ))
            },
        )
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("upload"),
            other => other,
        })?;
    if owner != user.id && !user.is(Role::Admin) {
        return Err(ApiError::Forbidden("upload belongs to another user".to_string()));
    }
    ok(data)
}

/// The upload itself; its body limit replaces axum's default.
pub fn upload_routes(max_upload_bytes: usize) -> Router<SharedState> {
    Router::new().route(
        "/",
        post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
    )
}

pub fn read_routes() -> Router<SharedState> {
    Router::new().route("/{id}", get(metadata))
}
