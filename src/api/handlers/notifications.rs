use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Router,
};
use rusqlite::{params_from_iter, Connection};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::helpers::{
    created, list_page, new_id, now_rfc3339, ok, optional_text, required, ApiResult, Filters,
    Page, Params, Payload,
};
use crate::api::types::SharedState;
use crate::auth::{CurrentUser, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Academic,
    Finance,
    Hr,
    System,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Academic => "academic",
            Category::Finance => "finance",
            Category::Hr => "hr",
            Category::System => "system",
        }
    }
}

/// Notification to be delivered to one user.
pub struct Notice<'a> {
    pub category: Category,
    pub title: &'a str,
    pub message: &'a str,
    pub link: Option<&'a str>,
}

pub fn notify(
    conn: &Connection,
    recipient_id: &str,
    notice: &Notice<'_>,
) -> Result<String, ApiError> {
    let id = new_id();
    conn.execute(
        "INSERT INTO notifications(id, recipient_id, category, title, message, is_read,
                                   created_at, link)
         VALUES(?, ?, ?, ?, ?, 0, ?, ?)",
        (
            &id,
            recipient_id,
            notice.category.as_str(),
            notice.title,
            notice.message,
            now_rfc3339(),
            notice.link,
        ),
    )?;
    Ok(id)
}

/// Deliver to a user only when one is linked; records without accounts are skipped.
pub fn notify_if_linked(
    conn: &Connection,
    recipient_id: Option<&str>,
    notice: &Notice<'_>,
) -> Result<(), ApiError> {
    if let Some(r) = recipient_id {
        notify(conn, r, notice)?;
    }
    Ok(())
}

fn row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "category": r.get::<_, String>(1)?,
        "title": r.get::<_, String>(2)?,
        "message": r.get::<_, String>(3)?,
        "read": r.get::<_, i64>(4)? != 0,
        "link": r.get::<_, Option<String>>(5)?,
        "createdAt": r.get::<_, String>(6)?,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    unread: Option<bool>,
    category: Option<String>,
}

async fn list(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<ListQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let mut f = Filters::new();
    f.eq("recipient_id", Some(user.id.as_str()))
        .eq("category", q.category.as_deref());
    if q.unread == Some(true) {
        f.eq_int("is_read", Some(0));
    }

    let conn = state.conn()?;
    ok(list_page(
        &conn,
        "id, category, title, message, is_read, link, created_at",
        "notifications",
        &f,
        "created_at DESC, rowid DESC",
        &page,
        row_json,
    )?)
}

async fn unread_count(State(state): State<SharedState>, user: CurrentUser) -> ApiResult {
    let conn = state.conn()?;
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0",
        [&user.id],
        |r| r.get(0),
    )?;
    ok(json!({ "unread": n }))
}

async fn mark_read(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    let n = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ? AND recipient_id = ?",
        (&id, &user.id),
    )?;
    if n == 0 {
        return Err(ApiError::not_found("notification"));
    }
    ok(json!({ "id": id, "read": true }))
}

async fn mark_all_read(State(state): State<SharedState>, user: CurrentUser) -> ApiResult {
    let conn = state.conn()?;
    let n = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE recipient_id = ? AND is_read = 0",
        [&user.id],
    )?;
    ok(json!({ "updated": n }))
}

async fn remove(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    let n = conn.execute(
        "DELETE FROM notifications WHERE id = ? AND recipient_id = ?",
        (&id, &user.id),
    )?;
    if n == 0 {
        return Err(ApiError::not_found("notification"));
    }
    ok(json!({ "id": id, "deleted": true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastBody {
    title: String,
    message: String,
    /// Limit delivery to one role; everyone when absent.
    role: Option<String>,
    link: Option<String>,
}

async fn broadcast(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<BroadcastBody>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let title = required("title", &body.title)?;
    let message = required("message", &body.message)?;
    let role = match optional_text(body.role) {
        Some(r) => Some(r.parse::<Role>()?),
        None => None,
    };
    let link = optional_text(body.link);

    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    let recipients: Vec<String> = {
        let mut f = Filters::new();
        f.eq_int("active", Some(1));
        if let Some(r) = role {
            f.eq("role", Some(r.as_str()));
        }
        let mut stmt = tx.prepare(&format!("SELECT id FROM users{}", f.where_sql()))?;
        let ids = stmt
            .query_map(params_from_iter(f.params()), |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let notice = Notice {
        category: Category::System,
        title: &title,
        message: &message,
        link: link.as_deref(),
    };
    for r in &recipients {
        notify(&tx, r, &notice)?;
    }
    tx.commit()?;
    info!(by = %user.id, recipients = recipients.len(), "broadcast notification");

    created(json!({ "delivered": recipients.len() }))
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(list))
        .route("/unread-count", get(unread_count))
        .route("/read-all", put(mark_all_read))
        .route("/broadcast", post(broadcast))
        .route("/{id}/read", put(mark_read))
        .route("/{id}", delete(remove))
}
