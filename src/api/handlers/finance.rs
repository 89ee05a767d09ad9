use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Router,
};
use chrono::Datelike;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::api::handlers::grades::scope_student;
use crate::api::handlers::notifications::{notify_if_linked, Category, Notice};
use crate::api::helpers::{
    created, ensure_exists, list_page, new_id, now_rfc3339, ok, optional_text, parse_date,
    positive_amount, required, round_money, today, ApiResult, Filters, Page, Params, Payload,
};
use crate::api::types::SharedState;
use crate::auth::{CurrentUser, Role};

const PAYMENT_METHODS: &[&str] = &["cash", "bank_transfer", "mobile_money", "card"];

/// Status an open invoice should carry given what has been paid.
pub fn invoice_status(amount: f64, amount_paid: f64) -> &'static str {
    if amount_paid <= 0.0 {
        "unpaid"
    } else if round_money(amount - amount_paid) <= 0.0 {
        "paid"
    } else {
        "partial"
    }
}

/// Next `INV-YYYY-NNNNNN` for the given year.
fn next_invoice_no(conn: &Connection, year: i32) -> Result<String, ApiError> {
    let prefix = format!("INV-{}-", year);
    let last: Option<i64> = conn.query_row(
        "SELECT MAX(CAST(SUBSTR(invoice_no, ?) AS INTEGER)) FROM invoices WHERE invoice_no LIKE ?",
        (prefix.len() as i64 + 1, format!("{}%", prefix)),
        |r| r.get(0),
    )?;
    Ok(format!("{}{:06}", prefix, last.unwrap_or(0) + 1))
}

struct NewInvoice<'a> {
    student_id: &'a str,
    campaign_id: Option<&'a str>,
    description: &'a str,
    amount: f64,
    due_date: Option<&'a str>,
}

fn insert_invoice(conn: &Connection, inv: &NewInvoice<'_>) -> Result<(String, String), ApiError> {
    let id = new_id();
    let invoice_no = next_invoice_no(conn, today().year())?;
    conn.execute(
        "INSERT INTO invoices(id, invoice_no, student_id, campaign_id, description, amount,
                              amount_paid, status, due_date, created_at)
         VALUES(?, ?, ?, ?, ?, ?, 0, 'unpaid', ?, ?)",
        rusqlite::params![
            id,
            invoice_no,
            inv.student_id,
            inv.campaign_id,
            inv.description,
            inv.amount,
            inv.due_date,
            now_rfc3339(),
        ],
    )?;

    let user_id: Option<String> = conn.query_row(
        "SELECT user_id FROM students WHERE id = ?",
        [inv.student_id],
        |r| r.get(0),
    )?;
    let message = format!(
        "{}: {} ({:.2}){}",
        invoice_no,
        inv.description,
        inv.amount,
        inv.due_date
            .map(|d| format!(", due {}", d))
            .unwrap_or_default()
    );
    notify_if_linked(
        conn,
        user_id.as_deref(),
        &Notice {
            category: Category::Finance,
            title: "New invoice",
            message: &message,
            link: Some("/finance/invoices"),
        },
    )?;
    Ok((id, invoice_no))
}

// --- invoices ---

const INVOICE_SELECT: &str = "i.id, i.invoice_no, i.student_id, s.matricule, s.first_name,
    s.last_name, i.campaign_id, i.description, i.amount, i.amount_paid, i.status, i.due_date,
    i.created_at";

const INVOICE_FROM: &str = "invoices i JOIN students s ON s.id = i.student_id";

fn invoice_json(r: &Row<'_>) -> rusqlite::Result<Value> {
    let amount: f64 = r.get(8)?;
    let paid: f64 = r.get(9)?;
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "invoiceNo": r.get::<_, String>(1)?,
        "studentId": r.get::<_, String>(2)?,
        "matricule": r.get::<_, String>(3)?,
        "studentName": format!("{} {}", r.get::<_, String>(4)?, r.get::<_, String>(5)?),
        "campaignId": r.get::<_, Option<String>>(6)?,
        "description": r.get::<_, String>(7)?,
        "amount": amount,
        "amountPaid": paid,
        "balance": round_money(amount - paid),
        "status": r.get::<_, String>(10)?,
        "dueDate": r.get::<_, Option<String>>(11)?,
        "createdAt": r.get::<_, String>(12)?,
    }))
}

fn load_invoice_json(conn: &Connection, id: &str) -> Result<Value, ApiError> {
    conn.query_row(
        &format!("SELECT {} FROM {} WHERE i.id = ?", INVOICE_SELECT, INVOICE_FROM),
        [id],
        invoice_json,
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::NotFound(_) => ApiError::not_found("invoice"),
        other => other,
    })
}

/// Finance staff see everything; students only their own invoices.
fn reader_scope(
    conn: &Connection,
    user: &CurrentUser,
    requested: Option<String>,
) -> Result<Option<String>, ApiError> {
    if user.is(Role::Student) {
        scope_student(conn, user, requested)
    } else {
        user.require(&[Role::Finance])?;
        Ok(requested)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceQuery {
    page: Option<u32>,
    limit: Option<u32>,
    student_id: Option<String>,
    campaign_id: Option<String>,
    status: Option<String>,
    search: Option<String>,
}

async fn list_invoices(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<InvoiceQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let conn = state.conn()?;
    let student_id = reader_scope(&conn, &user, optional_text(q.student_id))?;

    let mut f = Filters::new();
    f.eq("i.student_id", student_id.as_deref())
        .eq("i.campaign_id", q.campaign_id.as_deref())
        .eq("i.status", q.status.as_deref())
        .search(
            &["i.invoice_no", "i.description", "s.matricule"],
            q.search.as_deref(),
        );
    ok(list_page(
        &conn,
        INVOICE_SELECT,
        INVOICE_FROM,
        &f,
        "i.created_at DESC, i.invoice_no DESC",
        &page,
        invoice_json,
    )?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceBody {
    student_id: String,
    description: String,
    amount: f64,
    due_date: Option<String>,
}

async fn create_invoice(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<InvoiceBody>,
) -> ApiResult {
    user.require(&[Role::Finance])?;
    let description = required("description", &body.description)?;
    let amount = positive_amount("amount", body.amount)?;
    let due_date = match optional_text(body.due_date) {
        Some(d) => Some(parse_date("dueDate", &d)?.to_string()),
        None => None,
    };

    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    ensure_exists(&tx, "students", &body.student_id, "student")?;
    let (id, invoice_no) = insert_invoice(
        &tx,
        &NewInvoice {
            student_id: &body.student_id,
            campaign_id: None,
            description: &description,
            amount,
            due_date: due_date.as_deref(),
        },
    )?;
    tx.commit()?;

    info!(invoice_id = %id, invoice_no = %invoice_no, amount, "invoice created");
    created(load_invoice_json(&conn, &id)?)
}

fn payments_for(conn: &Connection, invoice_id: &str) -> Result<Vec<Value>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT id, amount, method, reference, paid_at, recorded_by
         FROM payments WHERE invoice_id = ? ORDER BY paid_at, rowid",
    )?;
    let rows = stmt
        .query_map([invoice_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "amount": r.get::<_, f64>(1)?,
                "method": r.get::<_, String>(2)?,
                "reference": r.get::<_, Option<String>>(3)?,
                "paidAt": r.get::<_, String>(4)?,
                "recordedBy": r.get::<_, Option<String>>(5)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

async fn get_invoice(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    let mut invoice = load_invoice_json(&conn, &id)?;
    let owner = invoice["studentId"].as_str().map(str::to_string);
    reader_scope(&conn, &user, owner)?;
    invoice["payments"] = json!(payments_for(&conn, &id)?);
    ok(invoice)
}

async fn cancel_invoice(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    user.require(&[Role::Finance])?;
    let conn = state.conn()?;
    let status: String = conn
        .query_row("SELECT status FROM invoices WHERE id = ?", [&id], |r| r.get(0))
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("invoice"),
            other => other,
        })?;
    if status == "cancelled" {
        return Err(ApiError::conflict("invoice is already cancelled"));
    }
    let payments: i64 = conn.query_row(
        "SELECT COUNT(*) FROM payments WHERE invoice_id = ?",
        [&id],
        |r| r.get(0),
    )?;
    if payments > 0 {
        return Err(ApiError::conflict("invoice has payments and cannot be cancelled"));
    }
    conn.execute("UPDATE invoices SET status = 'cancelled' WHERE id = ?", [&id])?;
    info!(invoice_id = %id, "invoice cancelled");
    ok(load_invoice_json(&conn, &id)?)
}

// --- payments ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentBody {
    amount: f64,
    method: String,
    reference: Option<String>,
}

async fn record_payment(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(invoice_id): Path<String>,
    Payload(body): Payload<PaymentBody>,
) -> ApiResult {
    user.require(&[Role::Finance])?;
    let amount = positive_amount("amount", body.amount)?;
    let method = body.method.trim().to_ascii_lowercase();
    if !PAYMENT_METHODS.contains(&method.as_str()) {
        return Err(ApiError::bad_params(format!(
            "method must be one of: {}",
            PAYMENT_METHODS.join(", ")
        )));
    }

    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    let (invoice_no, total, paid, status, user_id): (String, f64, f64, String, Option<String>) = tx
        .query_row(
            "SELECT i.invoice_no, i.amount, i.amount_paid, i.status, s.user_id
             FROM invoices i JOIN students s ON s.id = i.student_id
             WHERE i.id = ?",
            [&invoice_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("invoice"),
            other => other,
        })?;
    if status == "cancelled" || status == "paid" {
        return Err(ApiError::conflict(format!("invoice is {}", status)));
    }
    let balance = round_money(total - paid);
    if amount > balance {
        return Err(ApiError::bad_params(format!(
            "amount exceeds the outstanding balance of {:.2}",
            balance
        )));
    }

    let payment_id = new_id();
    tx.execute(
        "INSERT INTO payments(id, invoice_id, amount, method, reference, paid_at, recorded_by)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            payment_id,
            invoice_id,
            amount,
            method,
            optional_text(body.reference),
            now_rfc3339(),
            user.id,
        ],
    )?;
    let new_paid = round_money(paid + amount);
    let new_status = invoice_status(total, new_paid);
    tx.execute(
        "UPDATE invoices SET amount_paid = ?, status = ? WHERE id = ?",
        (new_paid, new_status, &invoice_id),
    )?;
    let message = format!(
        "{:.2} received for {}; balance {:.2}",
        amount,
        invoice_no,
        round_money(total - new_paid)
    );
    notify_if_linked(
        &tx,
        user_id.as_deref(),
        &Notice {
            category: Category::Finance,
            title: "Payment received",
            message: &message,
            link: Some("/finance/invoices"),
        },
    )?;
    tx.commit()?;

    info!(
        invoice_id = %invoice_id,
        payment_id = %payment_id,
        amount,
        status = new_status,
        "payment recorded"
    );
    let mut invoice = load_invoice_json(&conn, &invoice_id)?;
    invoice["paymentId"] = json!(payment_id);
    created(invoice)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentQuery {
    page: Option<u32>,
    limit: Option<u32>,
    invoice_id: Option<String>,
    method: Option<String>,
}

async fn list_payments(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<PaymentQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let conn = state.conn()?;
    let student_id = reader_scope(&conn, &user, None)?;

    let mut f = Filters::new();
    f.eq("p.invoice_id", q.invoice_id.as_deref())
        .eq("p.method", q.method.as_deref())
        .eq("i.student_id", student_id.as_deref());
    ok(list_page(
        &conn,
        "p.id, p.invoice_id, i.invoice_no, p.amount, p.method, p.reference, p.paid_at, \
         p.recorded_by",
        "payments p JOIN invoices i ON i.id = p.invoice_id",
        &f,
        "p.paid_at DESC, p.rowid DESC",
        &page,
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "invoiceId": r.get::<_, String>(1)?,
                "invoiceNo": r.get::<_, String>(2)?,
                "amount": r.get::<_, f64>(3)?,
                "method": r.get::<_, String>(4)?,
                "reference": r.get::<_, Option<String>>(5)?,
                "paidAt": r.get::<_, String>(6)?,
                "recordedBy": r.get::<_, Option<String>>(7)?,
            }))
        },
    )?)
}

// --- campaigns ---

const CAMPAIGN_SELECT: &str = "id, name, description, amount, due_date, faculty_id,
    department_id, status, issued_at, created_at";

fn campaign_json(r: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "name": r.get::<_, String>(1)?,
        "description": r.get::<_, String>(2)?,
        "amount": r.get::<_, f64>(3)?,
        "dueDate": r.get::<_, Option<String>>(4)?,
        "facultyId": r.get::<_, Option<String>>(5)?,
        "departmentId": r.get::<_, Option<String>>(6)?,
        "status": r.get::<_, String>(7)?,
        "issuedAt": r.get::<_, Option<String>>(8)?,
        "createdAt": r.get::<_, String>(9)?,
    }))
}

fn load_campaign_json(conn: &Connection, id: &str) -> Result<Value, ApiError> {
    conn.query_row(
        &format!("SELECT {} FROM campaigns WHERE id = ?", CAMPAIGN_SELECT),
        [id],
        campaign_json,
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::NotFound(_) => ApiError::not_found("campaign"),
        other => other,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CampaignQuery {
    page: Option<u32>,
    limit: Option<u32>,
    status: Option<String>,
    search: Option<String>,
}

async fn list_campaigns(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<CampaignQuery>,
) -> ApiResult {
    user.require(&[Role::Finance])?;
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let mut f = Filters::new();
    f.eq("status", q.status.as_deref())
        .search(&["name", "description"], q.search.as_deref());
    let conn = state.conn()?;
    ok(list_page(
        &conn,
        CAMPAIGN_SELECT,
        "campaigns",
        &f,
        "created_at DESC",
        &page,
        campaign_json,
    )?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CampaignBody {
    name: Option<String>,
    description: Option<String>,
    amount: Option<f64>,
    due_date: Option<String>,
    faculty_id: Option<String>,
    department_id: Option<String>,
    status: Option<String>,
}

fn check_targets(
    conn: &Connection,
    faculty_id: Option<&str>,
    department_id: Option<&str>,
) -> Result<(), ApiError> {
    if let Some(f) = faculty_id {
        ensure_exists(conn, "faculties", f, "faculty")?;
    }
    if let Some(d) = department_id {
        ensure_exists(conn, "departments", d, "department")?;
    }
    Ok(())
}

async fn create_campaign(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<CampaignBody>,
) -> ApiResult {
    user.require(&[Role::Finance])?;
    let name = required("name", body.name.as_deref().unwrap_or(""))?;
    let description = optional_text(body.description).unwrap_or_else(|| name.clone());
    let amount = positive_amount(
        "amount",
        body.amount
            .ok_or_else(|| ApiError::bad_params("amount is required"))?,
    )?;
    let due_date = match optional_text(body.due_date) {
        Some(d) => Some(parse_date("dueDate", &d)?.to_string()),
        None => None,
    };
    let faculty_id = optional_text(body.faculty_id);
    let department_id = optional_text(body.department_id);

    let conn = state.conn()?;
    check_targets(&conn, faculty_id.as_deref(), department_id.as_deref())?;
    let id = new_id();
    conn.execute(
        "INSERT INTO campaigns(id, name, description, amount, due_date, faculty_id, department_id,
                               status, issued_at, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, 'draft', NULL, ?)",
        rusqlite::params![
            id,
            name,
            description,
            amount,
            due_date,
            faculty_id,
            department_id,
            now_rfc3339(),
        ],
    )?;
    info!(campaign_id = %id, amount, "campaign created");
    created(load_campaign_json(&conn, &id)?)
}

async fn update_campaign(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<CampaignBody>,
) -> ApiResult {
    user.require(&[Role::Finance])?;
    let conn = state.conn()?;
    let current = conn
        .query_row(
            "SELECT name, description, amount, due_date, faculty_id, department_id, status
             FROM campaigns WHERE id = ?",
            [&id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, f64>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, Option<String>>(4)?,
                    r.get::<_, Option<String>>(5)?,
                    r.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;
    let Some((
        mut name,
        mut description,
        mut amount,
        mut due_date,
        mut faculty_id,
        mut department_id,
        mut status,
    )) = current
    else {
        return Err(ApiError::not_found("campaign"));
    };

    let billing_changed = body.amount.is_some()
        || body.due_date.is_some()
        || body.faculty_id.is_some()
        || body.department_id.is_some();
    if status != "draft" && billing_changed {
        return Err(ApiError::conflict(
            "amount, due date and targets are fixed once a campaign is issued",
        ));
    }

    if let Some(v) = body.name {
        name = required("name", &v)?;
    }
    if let Some(v) = body.description {
        description = required("description", &v)?;
    }
    if let Some(v) = body.amount {
        amount = positive_amount("amount", v)?;
    }
    if let Some(v) = body.due_date {
        due_date = match optional_text(Some(v)) {
            Some(d) => Some(parse_date("dueDate", &d)?.to_string()),
            None => None,
        };
    }
    if let Some(v) = body.faculty_id {
        faculty_id = optional_text(Some(v));
    }
    if let Some(v) = body.department_id {
        department_id = optional_text(Some(v));
    }
    if let Some(v) = body.status {
        let v = v.trim().to_ascii_lowercase();
        // Issuing goes through the issue endpoint; closing is the only manual transition.
        if v != status && v != "closed" {
            return Err(ApiError::bad_params("status may only be changed to closed"));
        }
        status = v;
    }
    check_targets(&conn, faculty_id.as_deref(), department_id.as_deref())?;

    conn.execute(
        "UPDATE campaigns SET name = ?, description = ?, amount = ?, due_date = ?,
                faculty_id = ?, department_id = ?, status = ?
         WHERE id = ?",
        rusqlite::params![
            name,
            description,
            amount,
            due_date,
            faculty_id,
            department_id,
            status,
            id
        ],
    )?;
    ok(load_campaign_json(&conn, &id)?)
}

async fn issue_campaign(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    user.require(&[Role::Finance])?;
    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    let (description, amount, due_date, faculty_id, department_id, status): (
        String,
        f64,
        Option<String>,
        Option<String>,
        Option<String>,
        String,
    ) = tx
        .query_row(
            "SELECT description, amount, due_date, faculty_id, department_id, status
             FROM campaigns WHERE id = ?",
            [&id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
        )
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("campaign"),
            other => other,
        })?;
    if status != "draft" {
        return Err(ApiError::conflict(format!("campaign is already {}", status)));
    }

    let students: Vec<String> = {
        let mut f = Filters::new();
        f.eq("status", Some("active"))
            .eq("faculty_id", faculty_id.as_deref())
            .eq("department_id", department_id.as_deref());
        let mut stmt = tx.prepare(&format!(
            "SELECT id FROM students{} ORDER BY matricule",
            f.where_sql()
        ))?;
        let ids = stmt
            .query_map(rusqlite::params_from_iter(f.params()), |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    for student_id in &students {
        insert_invoice(
            &tx,
            &NewInvoice {
                student_id,
                campaign_id: Some(id.as_str()),
                description: &description,
                amount,
                due_date: due_date.as_deref(),
            },
        )?;
    }
    tx.execute(
        "UPDATE campaigns SET status = 'issued', issued_at = ? WHERE id = ?",
        (now_rfc3339(), &id),
    )?;
    tx.commit()?;

    if students.is_empty() {
        warn!(campaign_id = %id, "campaign issued with no matching students");
    } else {
        info!(campaign_id = %id, invoices = students.len(), "campaign issued");
    }
    let mut campaign = load_campaign_json(&conn, &id)?;
    campaign["invoicesCreated"] = json!(students.len());
    ok(campaign)
}

// --- summary ---

async fn summary(State(state): State<SharedState>, user: CurrentUser) -> ApiResult {
    user.require(&[Role::Finance])?;
    let conn = state.conn()?;
    let (invoiced, collected): (f64, f64) = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0), COALESCE(SUM(amount_paid), 0)
         FROM invoices WHERE status != 'cancelled'",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    let mut by_status = serde_json::Map::new();
    for s in ["unpaid", "partial", "paid", "cancelled"] {
        by_status.insert(s.to_string(), json!(0));
    }
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM invoices GROUP BY status")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let status: String = row.get(0)?;
        let n: i64 = row.get(1)?;
        by_status.insert(status, json!(n));
    }

    ok(json!({
        "invoiced": round_money(invoiced),
        "collected": round_money(collected),
        "outstanding": round_money(invoiced - collected),
        "invoicesByStatus": by_status,
    }))
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route("/invoices/{id}", get(get_invoice).delete(cancel_invoice))
        .route("/invoices/{id}/payments", post(record_payment))
        .route("/payments", get(list_payments))
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route("/campaigns/{id}", put(update_campaign))
        .route("/campaigns/{id}/issue", post(issue_campaign))
        .route("/summary", get(summary))
}
