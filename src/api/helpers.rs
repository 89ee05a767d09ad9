use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use rusqlite::{types::Value, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::api::error::ApiError;

pub type ApiResult = Result<Response, ApiError>;

pub fn ok(data: serde_json::Value) -> ApiResult {
    Ok(Json(json!({ "success": true, "data": data })).into_response())
}

pub fn created(data: serde_json::Value) -> ApiResult {
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": data })),
    )
        .into_response())
}

/// JSON body whose rejections render as error envelopes.
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Payload(value))
    }
}

/// Query string whose rejections render as `bad_params` envelopes.
pub struct Params<T>(pub T);

impl<S, T> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Params(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub const MAX_LIMIT: u32 = 100;

    pub fn resolve(
        page: Option<u32>,
        limit: Option<u32>,
        default_limit: u32,
    ) -> Result<Self, ApiError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(default_limit);
        if page == 0 {
            return Err(ApiError::bad_params("page must be at least 1"));
        }
        if limit == 0 || limit > Self::MAX_LIMIT {
            return Err(ApiError::bad_params(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    pub fn envelope(&self, items: Vec<serde_json::Value>, total: i64) -> serde_json::Value {
        json!({
            "items": items,
            "page": self.page,
            "limit": self.limit,
            "total": total,
        })
    }
}

/// Accumulates `AND`-joined conditions with positional parameters for list queries.
#[derive(Debug, Default)]
pub struct Filters {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(&mut self, column: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.clauses.push(format!("{} = ?", column));
            self.params.push(Value::Text(v.to_string()));
        }
        self
    }

    pub fn eq_int(&mut self, column: &str, value: Option<i64>) -> &mut Self {
        if let Some(v) = value {
            self.clauses.push(format!("{} = ?", column));
            self.params.push(Value::Integer(v));
        }
        self
    }

    /// Case-insensitive substring match over any of `columns`.
    pub fn search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        let Some(pattern) = like_pattern(term) else {
            return self;
        };
        let ors: Vec<String> = columns
            .iter()
            .map(|c| format!("LOWER({}) LIKE ? ESCAPE '\\'", c))
            .collect();
        self.clauses.push(format!("({})", ors.join(" OR ")));
        for _ in columns {
            self.params.push(Value::Text(pattern.clone()));
        }
        self
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn params_with_page(&self, page: &Page) -> Vec<Value> {
        let mut p = self.params.clone();
        p.push(Value::Integer(i64::from(page.limit)));
        p.push(Value::Integer(page.offset()));
        p
    }
}

/// `%term%`, lowercased with LIKE wildcards escaped. None for blank input.
pub fn like_pattern(term: Option<&str>) -> Option<String> {
    let t = term?.trim();
    if t.is_empty() {
        return None;
    }
    let escaped = t
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{}%", escaped))
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::bad_params(format!("{} must be a YYYY-MM-DD date", field)))
}

pub fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let t = value.trim();
    if t.is_empty() {
        return Err(ApiError::bad_params(format!("{} must not be empty", field)));
    }
    Ok(t.to_string())
}

pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn positive_amount(field: &str, value: f64) -> Result<f64, ApiError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ApiError::bad_params(format!("{} must be a positive number", field)));
    }
    Ok(round_money(value))
}

pub fn non_negative_amount(field: &str, value: f64) -> Result<f64, ApiError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ApiError::bad_params(format!("{} must not be negative", field)));
    }
    Ok(round_money(value))
}

pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn normalize_email(email: &str) -> Result<String, ApiError> {
    let e = email.trim().to_ascii_lowercase();
    let valid = e
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && !domain.is_empty() && !domain.contains('@'))
        .unwrap_or(false);
    if !valid {
        return Err(ApiError::bad_params("email is not valid"));
    }
    Ok(e)
}

/// 404 unless a row with `id` exists in `table`.
pub fn ensure_exists(
    conn: &Connection,
    table: &'static str,
    id: &str,
    what: &str,
) -> Result<(), ApiError> {
    let found: Option<i64> = conn
        .query_row(&format!("SELECT 1 FROM {} WHERE id = ?", table), [id], |r| {
            r.get(0)
        })
        .optional()?;
    if found.is_none() {
        return Err(ApiError::not_found(what));
    }
    Ok(())
}

pub fn count(conn: &Connection, sql: &str, params: &[Value]) -> Result<i64, ApiError> {
    Ok(conn.query_row(sql, rusqlite::params_from_iter(params.iter()), |r| r.get(0))?)
}

/// One page of `SELECT {select} FROM {from}` plus the unpaged total, as a list envelope.
pub fn list_page(
    conn: &Connection,
    select: &str,
    from: &str,
    filters: &Filters,
    order_by: &str,
    page: &Page,
    map: fn(&Row<'_>) -> rusqlite::Result<serde_json::Value>,
) -> Result<serde_json::Value, ApiError> {
    let total = count(
        conn,
        &format!("SELECT COUNT(*) FROM {}{}", from, filters.where_sql()),
        filters.params(),
    )?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT ? OFFSET ?",
        select,
        from,
        filters.where_sql(),
        order_by
    ))?;
    let items = stmt
        .query_map(rusqlite::params_from_iter(filters.params_with_page(page)), map)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(page.envelope(items, total))
}
