use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Router,
};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::ApiError;
use crate::api::handlers::notifications::{notify_if_linked, Category, Notice};
use crate::api::helpers::{
    created, ensure_exists, list_page, new_id, non_negative_amount, now_rfc3339, ok,
    optional_text, parse_date, required, round_money, ApiResult, Filters, Page, Params, Payload,
};
use crate::api::types::SharedState;
use crate::auth::{CurrentUser, Role};

const LEAVE_TYPES: &[&str] = &["annual", "sick", "personal", "maternity", "paternity", "unpaid"];

pub fn linked_employee_id(
    conn: &Connection,
    user: &CurrentUser,
) -> Result<Option<String>, ApiError> {
    Ok(conn
        .query_row("SELECT id FROM employees WHERE user_id = ?", [&user.id], |r| {
            r.get(0)
        })
        .optional()?)
}

/// HR staff see everyone; other employees only themselves.
fn employee_scope(
    conn: &Connection,
    user: &CurrentUser,
    requested: Option<String>,
) -> Result<Option<String>, ApiError> {
    if user.require(&[Role::Hr]).is_ok() {
        return Ok(requested);
    }
    let own = linked_employee_id(conn, user)?.ok_or_else(|| {
        ApiError::Forbidden("no employee record is linked to this account".to_string())
    })?;
    if requested.as_deref().is_some_and(|r| r != own) {
        return Err(ApiError::Forbidden(
            "employees may only view their own records".to_string(),
        ));
    }
    Ok(Some(own))
}

/// Inclusive calendar days between two dates; end before start is rejected.
pub fn leave_days(start: NaiveDate, end: NaiveDate) -> Result<i64, ApiError> {
    if end < start {
        return Err(ApiError::bad_params("endDate must not be before startDate"));
    }
    Ok((end - start).num_days() + 1)
}

/// `YYYY-MM` with a real month.
pub fn parse_period(value: &str) -> Result<String, ApiError> {
    let v = value.trim();
    NaiveDate::parse_from_str(&format!("{}-01", v), "%Y-%m-%d")
        .ok()
        .filter(|_| v.len() == 7)
        .map(|d| d.format("%Y-%m").to_string())
        .ok_or_else(|| ApiError::bad_params("period must be YYYY-MM"))
}

// --- employees ---

const EMPLOYEE_SELECT: &str = "id, user_id, employee_no, first_name, last_name, email,
    department, position, base_salary, hire_date, status, created_at";

fn employee_json(r: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "userId": r.get::<_, Option<String>>(1)?,
        "employeeNo": r.get::<_, String>(2)?,
        "firstName": r.get::<_, String>(3)?,
        "lastName": r.get::<_, String>(4)?,
        "email": r.get::<_, String>(5)?,
        "department": r.get::<_, String>(6)?,
        "position": r.get::<_, String>(7)?,
        "baseSalary": r.get::<_, f64>(8)?,
        "hireDate": r.get::<_, String>(9)?,
        "status": r.get::<_, String>(10)?,
        "createdAt": r.get::<_, String>(11)?,
    }))
}

fn load_employee_json(conn: &Connection, id: &str) -> Result<Value, ApiError> {
    conn.query_row(
        &format!("SELECT {} FROM employees WHERE id = ?", EMPLOYEE_SELECT),
        [id],
        employee_json,
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::NotFound(_) => ApiError::not_found("employee"),
        other => other,
    })
}

fn next_employee_no(conn: &Connection) -> Result<String, ApiError> {
    let last: Option<i64> = conn.query_row(
        "SELECT MAX(CAST(SUBSTR(employee_no, 5) AS INTEGER)) FROM employees
         WHERE employee_no LIKE 'EMP-%'",
        [],
        |r| r.get(0),
    )?;
    Ok(format!("EMP-{:05}", last.unwrap_or(0) + 1))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmployeeQuery {
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<String>,
    department: Option<String>,
    status: Option<String>,
}

async fn list_employees(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<EmployeeQuery>,
) -> ApiResult {
    user.require(&[Role::Hr])?;
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let mut f = Filters::new();
    f.eq("department", q.department.as_deref())
        .eq("status", q.status.as_deref())
        .search(
            &["employee_no", "first_name", "last_name", "email", "position"],
            q.search.as_deref(),
        );
    let conn = state.conn()?;
    ok(list_page(
        &conn,
        EMPLOYEE_SELECT,
        "employees",
        &f,
        "last_name, first_name",
        &page,
        employee_json,
    )?)
}

async fn get_employee(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    employee_scope(&conn, &user, Some(id.clone()))?;
    ok(load_employee_json(&conn, &id)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmployeeBody {
    user_id: Option<String>,
    employee_no: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    department: Option<String>,
    position: Option<String>,
    base_salary: Option<f64>,
    hire_date: Option<String>,
    status: Option<String>,
}

async fn create_employee(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<EmployeeBody>,
) -> ApiResult {
    user.require(&[Role::Hr])?;
    let first_name = required("firstName", body.first_name.as_deref().unwrap_or(""))?;
    let last_name = required("lastName", body.last_name.as_deref().unwrap_or(""))?;
    let email = crate::api::helpers::normalize_email(body.email.as_deref().unwrap_or(""))?;
    let department = required("department", body.department.as_deref().unwrap_or(""))?;
    let position = required("position", body.position.as_deref().unwrap_or(""))?;
    let base_salary = non_negative_amount(
        "baseSalary",
        body.base_salary
            .ok_or_else(|| ApiError::bad_params("baseSalary is required"))?,
    )?;
    let hire_date = parse_date("hireDate", body.hire_date.as_deref().unwrap_or(""))?;
    let user_id = optional_text(body.user_id);

    let conn = state.conn()?;
    if let Some(u) = user_id.as_deref() {
        ensure_exists(&conn, "users", u, "user")?;
    }
    let employee_no = match optional_text(body.employee_no) {
        Some(n) => n,
        None => next_employee_no(&conn)?,
    };
    let id = new_id();
    conn.execute(
        "INSERT INTO employees(id, user_id, employee_no, first_name, last_name, email, department,
                               position, base_salary, hire_date, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?)",
        rusqlite::params![
            id,
            user_id,
            employee_no,
            first_name,
            last_name,
            email,
            department,
            position,
            base_salary,
            hire_date.to_string(),
            now_rfc3339(),
        ],
    )?;
    info!(employee_id = %id, employee_no = %employee_no, "employee created");
    created(load_employee_json(&conn, &id)?)
}

async fn update_employee(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<EmployeeBody>,
) -> ApiResult {
    user.require(&[Role::Hr])?;
    let conn = state.conn()?;
    let current = conn
        .query_row(
            "SELECT user_id, employee_no, first_name, last_name, email, department, position,
                    base_salary, hire_date, status
             FROM employees WHERE id = ?",
            [&id],
            |r| {
                Ok((
                    r.get::<_, Option<String>>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, f64>(7)?,
                    r.get::<_, String>(8)?,
                    r.get::<_, String>(9)?,
                ))
            },
        )
        .optional()?;
    let Some((
        mut user_id,
        mut employee_no,
        mut first_name,
        mut last_name,
        mut email,
        mut department,
        mut position,
        mut base_salary,
        mut hire_date,
        mut status,
    )) = current
    else {
        return Err(ApiError::not_found("employee"));
    };

    if let Some(v) = body.user_id {
        user_id = optional_text(Some(v));
        if let Some(u) = user_id.as_deref() {
            ensure_exists(&conn, "users", u, "user")?;
        }
    }
    if let Some(v) = body.employee_no {
        employee_no = required("employeeNo", &v)?;
    }
    if let Some(v) = body.first_name {
        first_name = required("firstName", &v)?;
    }
    if let Some(v) = body.last_name {
        last_name = required("lastName", &v)?;
    }
    if let Some(v) = body.email {
        email = crate::api::helpers::normalize_email(&v)?;
    }
    if let Some(v) = body.department {
        department = required("department", &v)?;
    }
    if let Some(v) = body.position {
        position = required("position", &v)?;
    }
    if let Some(v) = body.base_salary {
        base_salary = non_negative_amount("baseSalary", v)?;
    }
    if let Some(v) = body.hire_date {
        hire_date = parse_date("hireDate", &v)?.to_string();
    }
    if let Some(v) = body.status {
        let v = v.trim().to_ascii_lowercase();
        if v != "active" && v != "terminated" {
            return Err(ApiError::bad_params("status must be active or terminated"));
        }
        status = v;
    }

    conn.execute(
        "UPDATE employees SET user_id = ?, employee_no = ?, first_name = ?, last_name = ?,
                email = ?, department = ?, position = ?, base_salary = ?, hire_date = ?,
                status = ?
         WHERE id = ?",
        rusqlite::params![
            user_id,
            employee_no,
            first_name,
            last_name,
            email,
            department,
            position,
            base_salary,
            hire_date,
            status,
            id,
        ],
    )?;
    ok(load_employee_json(&conn, &id)?)
}

async fn terminate_employee(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    user.require(&[Role::Hr])?;
    let conn = state.conn()?;
    let n = conn.execute(
        "UPDATE employees SET status = 'terminated' WHERE id = ?",
        [&id],
    )?;
    if n == 0 {
        return Err(ApiError::not_found("employee"));
    }
    info!(employee_id = %id, "employee terminated");
    ok(load_employee_json(&conn, &id)?)
}

// --- payroll ---

const PAYROLL_SELECT: &str = "p.id, p.employee_id, e.employee_no, e.first_name, e.last_name,
    p.period, p.base_salary, p.allowances, p.deductions, p.net_pay, p.status, p.paid_at,
    p.created_at";

const PAYROLL_FROM: &str = "payrolls p JOIN employees e ON e.id = p.employee_id";

fn payroll_json(r: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "employeeId": r.get::<_, String>(1)?,
        "employeeNo": r.get::<_, String>(2)?,
        "employeeName": format!("{} {}", r.get::<_, String>(3)?, r.get::<_, String>(4)?),
        "period": r.get::<_, String>(5)?,
        "baseSalary": r.get::<_, f64>(6)?,
        "allowances": r.get::<_, f64>(7)?,
        "deductions": r.get::<_, f64>(8)?,
        "netPay": r.get::<_, f64>(9)?,
        "status": r.get::<_, String>(10)?,
        "paidAt": r.get::<_, Option<String>>(11)?,
        "createdAt": r.get::<_, String>(12)?,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayrollQuery {
    page: Option<u32>,
    limit: Option<u32>,
    period: Option<String>,
    employee_id: Option<String>,
    status: Option<String>,
}

async fn list_payroll(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<PayrollQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let period = match optional_text(q.period) {
        Some(p) => Some(parse_period(&p)?),
        None => None,
    };
    let conn = state.conn()?;
    let employee_id = employee_scope(&conn, &user, optional_text(q.employee_id))?;

    let mut f = Filters::new();
    f.eq("p.period", period.as_deref())
        .eq("p.employee_id", employee_id.as_deref())
        .eq("p.status", q.status.as_deref());
    ok(list_page(
        &conn,
        PAYROLL_SELECT,
        PAYROLL_FROM,
        &f,
        "p.period DESC, e.last_name",
        &page,
        payroll_json,
    )?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    period: String,
    allowances: Option<f64>,
    deductions: Option<f64>,
}

async fn generate_payroll(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<GenerateBody>,
) -> ApiResult {
    user.require(&[Role::Hr])?;
    let period = parse_period(&body.period)?;
    let allowances = non_negative_amount("allowances", body.allowances.unwrap_or(0.0))?;
    let deductions = non_negative_amount("deductions", body.deductions.unwrap_or(0.0))?;

    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    let pending: Vec<(String, f64)> = {
        let mut stmt = tx.prepare(
            "SELECT e.id, e.base_salary FROM employees e
             WHERE e.status = 'active'
               AND NOT EXISTS (SELECT 1 FROM payrolls p WHERE p.employee_id = e.id AND p.period = ?)
             ORDER BY e.employee_no",
        )?;
        let rows = stmt
            .query_map([&period], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let now = now_rfc3339();
    for (employee_id, base_salary) in &pending {
        let net_pay = round_money(base_salary + allowances - deductions);
        if net_pay < 0.0 {
            return Err(ApiError::bad_params(format!(
                "deductions exceed the pay of employee {}",
                employee_id
            )));
        }
        tx.execute(
            "INSERT INTO payrolls(id, employee_id, period, base_salary, allowances, deductions,
                                  net_pay, status, paid_at, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, 'pending', NULL, ?)",
            rusqlite::params![
                new_id(),
                employee_id,
                period,
                base_salary,
                allowances,
                deductions,
                net_pay,
                now,
            ],
        )?;
    }
    tx.commit()?;

    info!(period = %period, generated = pending.len(), "payroll generated");
    created(json!({ "period": period, "generated": pending.len() }))
}

async fn pay_payroll(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    user.require(&[Role::Hr])?;
    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    let (status, period, net_pay, user_id): (String, String, f64, Option<String>) = tx
        .query_row(
            "SELECT p.status, p.period, p.net_pay, e.user_id
             FROM payrolls p JOIN employees e ON e.id = p.employee_id
             WHERE p.id = ?",
            [&id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("payroll"),
            other => other,
        })?;
    if status != "pending" {
        return Err(ApiError::conflict("payroll is already paid"));
    }
    tx.execute(
        "UPDATE payrolls SET status = 'paid', paid_at = ? WHERE id = ?",
        (now_rfc3339(), &id),
    )?;
    let message = format!("Salary for {} paid: {:.2}", period, net_pay);
    notify_if_linked(
        &tx,
        user_id.as_deref(),
        &Notice {
            category: Category::Hr,
            title: "Salary paid",
            message: &message,
            link: Some("/hr/payroll"),
        },
    )?;
    tx.commit()?;

    info!(payroll_id = %id, period = %period, "payroll paid");
    let row = conn.query_row(
        &format!("SELECT {} FROM {} WHERE p.id = ?", PAYROLL_SELECT, PAYROLL_FROM),
        [&id],
        payroll_json,
    )?;
    ok(row)
}

// --- leave requests ---

const LEAVE_SELECT: &str = "l.id, l.employee_id, e.employee_no, e.first_name, e.last_name,
    l.leave_type, l.start_date, l.end_date, l.days, l.reason, l.status, l.reviewed_by,
    l.reviewed_at, l.review_note, l.created_at";

const LEAVE_FROM: &str = "leave_requests l JOIN employees e ON e.id = l.employee_id";

fn leave_json(r: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "employeeId": r.get::<_, String>(1)?,
        "employeeNo": r.get::<_, String>(2)?,
        "employeeName": format!("{} {}", r.get::<_, String>(3)?, r.get::<_, String>(4)?),
        "leaveType": r.get::<_, String>(5)?,
        "startDate": r.get::<_, String>(6)?,
        "endDate": r.get::<_, String>(7)?,
        "days": r.get::<_, i64>(8)?,
        "reason": r.get::<_, String>(9)?,
        "status": r.get::<_, String>(10)?,
        "reviewedBy": r.get::<_, Option<String>>(11)?,
        "reviewedAt": r.get::<_, Option<String>>(12)?,
        "reviewNote": r.get::<_, Option<String>>(13)?,
        "createdAt": r.get::<_, String>(14)?,
    }))
}

fn load_leave_json(conn: &Connection, id: &str) -> Result<Value, ApiError> {
    conn.query_row(
        &format!("SELECT {} FROM {} WHERE l.id = ?", LEAVE_SELECT, LEAVE_FROM),
        [id],
        leave_json,
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::NotFound(_) => ApiError::not_found("leave request"),
        other => other,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaveQuery {
    page: Option<u32>,
    limit: Option<u32>,
    employee_id: Option<String>,
    status: Option<String>,
}

async fn list_leave(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<LeaveQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let conn = state.conn()?;
    let employee_id = employee_scope(&conn, &user, optional_text(q.employee_id))?;

    let mut f = Filters::new();
    f.eq("l.employee_id", employee_id.as_deref())
        .eq("l.status", q.status.as_deref());
    ok(list_page(
        &conn,
        LEAVE_SELECT,
        LEAVE_FROM,
        &f,
        "l.start_date DESC, l.created_at DESC",
        &page,
        leave_json,
    )?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaveBody {
    employee_id: Option<String>,
    leave_type: String,
    start_date: String,
    end_date: String,
    reason: String,
}

async fn create_leave(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<LeaveBody>,
) -> ApiResult {
    let leave_type = body.leave_type.trim().to_ascii_lowercase();
    if !LEAVE_TYPES.contains(&leave_type.as_str()) {
        return Err(ApiError::bad_params(format!(
            "leaveType must be one of: {}",
            LEAVE_TYPES.join(", ")
        )));
    }
    let start = parse_date("startDate", &body.start_date)?;
    let end = parse_date("endDate", &body.end_date)?;
    let days = leave_days(start, end)?;
    let reason = required("reason", &body.reason)?;

    let conn = state.conn()?;
    let employee_id = employee_scope(&conn, &user, optional_text(body.employee_id))?
        .ok_or_else(|| ApiError::bad_params("employeeId is required"))?;
    let status: String = conn
        .query_row("SELECT status FROM employees WHERE id = ?", [&employee_id], |r| {
            r.get(0)
        })
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("employee"),
            other => other,
        })?;
    if status != "active" {
        return Err(ApiError::conflict("employee is not active"));
    }
    let overlapping: i64 = conn.query_row(
        "SELECT COUNT(*) FROM leave_requests
         WHERE employee_id = ? AND status IN ('pending', 'approved')
           AND start_date <= ? AND end_date >= ?",
        (&employee_id, end.to_string(), start.to_string()),
        |r| r.get(0),
    )?;
    if overlapping > 0 {
        return Err(ApiError::conflict("leave overlaps an existing request"));
    }

    let id = new_id();
    conn.execute(
        "INSERT INTO leave_requests(id, employee_id, leave_type, start_date, end_date, days, reason,
                                    status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, 'pending', ?)",
        rusqlite::params![
            id,
            employee_id,
            leave_type,
            start.to_string(),
            end.to_string(),
            days,
            reason,
            now_rfc3339(),
        ],
    )?;
    info!(leave_id = %id, employee_id = %employee_id, days, "leave requested");
    created(load_leave_json(&conn, &id)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecisionBody {
    approve: bool,
    note: Option<String>,
}

async fn decide_leave(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<DecisionBody>,
) -> ApiResult {
    user.require(&[Role::Hr])?;
    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    let (status, start, end, user_id): (String, String, String, Option<String>) = tx
        .query_row(
            "SELECT l.status, l.start_date, l.end_date, e.user_id
             FROM leave_requests l JOIN employees e ON e.id = l.employee_id
             WHERE l.id = ?",
            [&id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("leave request"),
            other => other,
        })?;
    if status != "pending" {
        return Err(ApiError::conflict(format!("leave request is already {}", status)));
    }

    let decision = if body.approve { "approved" } else { "rejected" };
    let note = optional_text(body.note);
    tx.execute(
        "UPDATE leave_requests SET status = ?, reviewed_by = ?, reviewed_at = ?, review_note = ?
         WHERE id = ?",
        rusqlite::params![decision, user.id, now_rfc3339(), note, id],
    )?;
    let message = match note.as_deref() {
        Some(n) => format!("Leave {} to {} was {}: {}", start, end, decision, n),
        None => format!("Leave {} to {} was {}", start, end, decision),
    };
    notify_if_linked(
        &tx,
        user_id.as_deref(),
        &Notice {
            category: Category::Hr,
            title: "Leave request reviewed",
            message: &message,
            link: Some("/hr/leave"),
        },
    )?;
    tx.commit()?;

    info!(leave_id = %id, decision, by = %user.id, "leave reviewed");
    ok(load_leave_json(&conn, &id)?)
}

async fn cancel_leave(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    let (employee_id, status): (String, String) = conn
        .query_row(
            "SELECT employee_id, status FROM leave_requests WHERE id = ?",
            [&id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("leave request"),
            other => other,
        })?;
    if linked_employee_id(&conn, &user)?.as_deref() != Some(employee_id.as_str()) {
        return Err(ApiError::Forbidden(
            "only the requesting employee may cancel a leave request".to_string(),
        ));
    }
    if status != "pending" {
        return Err(ApiError::conflict(format!("leave request is already {}", status)));
    }
    conn.execute(
        "UPDATE leave_requests SET status = 'cancelled' WHERE id = ?",
        [&id],
    )?;
    ok(load_leave_json(&conn, &id)?)
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/employees", get(list_employees).post(create_employee))
        .route(
            "/employees/{id}",
            get(get_employee)
                .put(update_employee)
                .delete(terminate_employee),
        )
        .route("/payroll", get(list_payroll))
        .route("/payroll/generate", post(generate_payroll))
        .route("/payroll/{id}/pay", put(pay_payroll))
        .route("/leave-requests", get(list_leave).post(create_leave))
        .route("/leave-requests/{id}/decision", put(decide_leave))
        .route("/leave-requests/{id}/cancel", put(cancel_leave))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    #[rstest]
    #[case("2026-03-02", "2026-03-02", 1)]
    #[case("2026-03-02", "2026-03-06", 5)]
    #[case("2026-02-27", "2026-03-02", 4)]
    #[case("2024-02-28", "2024-03-01", 3)]
    fn leave_days_are_inclusive(#[case] start: &str, #[case] end: &str, #[case] expected: i64) {
        assert_eq!(leave_days(d(start), d(end)).expect("days"), expected);
    }

    #[test]
    fn leave_ending_before_start_is_rejected() {
        let e = leave_days(d("2026-03-05"), d("2026-03-04")).expect_err("reversed");
        assert_eq!(e.code(), "bad_params");
    }

    #[rstest]
    #[case("2026-01", Some("2026-01"))]
    #[case(" 2026-12 ", Some("2026-12"))]
    #[case("2026-13", None)]
    #[case("2026-1", None)]
    #[case("202601", None)]
    fn periods(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_period(input).ok().as_deref(), expected);
    }
}
