use axum::{extract::State, routing::get, Router};
use rusqlite::{params_from_iter, Connection, Row};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::helpers::{ok, ApiResult, Filters, Params};
use crate::api::types::SharedState;
use crate::auth::{CurrentUser, Role};

const MIN_QUERY_LEN: usize = 2;
const PER_KIND: i64 = 10;

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

fn top_matches(
    conn: &Connection,
    sql_head: &str,
    columns: &[&str],
    term: &str,
    order_by: &str,
    map: fn(&Row<'_>) -> rusqlite::Result<Value>,
) -> Result<Vec<Value>, ApiError> {
    let mut f = Filters::new();
    f.search(columns, Some(term));
    let mut params = f.params().to_vec();
    params.push(rusqlite::types::Value::Integer(PER_KIND));
    let mut stmt = conn.prepare(&format!(
        "{}{} ORDER BY {} LIMIT ?",
        sql_head,
        f.where_sql(),
        order_by
    ))?;
    let rows = stmt
        .query_map(params_from_iter(params), map)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

async fn search(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<SearchQuery>,
) -> ApiResult {
    let term = q.q.unwrap_or_default();
    let term = term.trim();
    if term.chars().count() < MIN_QUERY_LEN {
        return Err(ApiError::bad_params(format!(
            "q must be at least {} characters",
            MIN_QUERY_LEN
        )));
    }

    let conn = state.conn()?;
    let students = top_matches(
        &conn,
        "SELECT id, matricule, first_name, last_name FROM students",
        &["matricule", "first_name", "last_name"],
        term,
        "last_name, first_name",
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "matricule": r.get::<_, String>(1)?,
                "name": format!("{} {}", r.get::<_, String>(2)?, r.get::<_, String>(3)?),
            }))
        },
    )?;
    let courses = top_matches(
        &conn,
        "SELECT id, code, title FROM courses",
        &["code", "title"],
        term,
        "code",
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "code": r.get::<_, String>(1)?,
                "title": r.get::<_, String>(2)?,
            }))
        },
    )?;
    let employees = if user.require(&[Role::Hr]).is_ok() {
        top_matches(
            &conn,
            "SELECT id, employee_no, first_name, last_name, position FROM employees",
            &["employee_no", "first_name", "last_name", "email"],
            term,
            "last_name, first_name",
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "employeeNo": r.get::<_, String>(1)?,
                    "name": format!("{} {}", r.get::<_, String>(2)?, r.get::<_, String>(3)?),
                    "position": r.get::<_, String>(4)?,
                }))
            },
        )?
    } else {
        Vec::new()
    };

    ok(json!({
        "query": term,
        "students": students,
        "courses": courses,
        "employees": employees,
    }))
}

pub fn routes() -> Router<SharedState> {
    Router::new().route("/", get(search))
}
