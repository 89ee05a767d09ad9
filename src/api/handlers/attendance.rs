use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Router,
};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::ApiError;
use crate::api::handlers::grades::scope_student;
use crate::api::helpers::{
    created, ensure_exists, list_page, new_id, ok, optional_text, parse_date, ApiResult, Filters,
    Page, Params, Payload,
};
use crate::api::types::SharedState;
use crate::auth::{CurrentUser, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendanceCounts {
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub excused: i64,
}

impl AttendanceCounts {
    pub fn total(&self) -> i64 {
        self.present + self.absent + self.late + self.excused
    }

    /// (present + late) / (total - excused) as a percentage; 0 when nothing counts.
    pub fn rate(&self) -> f64 {
        let denominator = self.total() - self.excused;
        if denominator <= 0 {
            return 0.0;
        }
        let attended = (self.present + self.late) as f64;
        crate::calc::round_off_2_decimals(attended * 100.0 / denominator as f64)
    }
}

const ATTENDANCE_SELECT: &str = "a.id, a.student_id, s.matricule, s.first_name, s.last_name,
    a.course_id, c.code, a.date, a.status, a.remark, a.recorded_by";

const ATTENDANCE_FROM: &str = "attendance a
    JOIN students s ON s.id = a.student_id
    JOIN courses c ON c.id = a.course_id";

fn attendance_json(r: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "matricule": r.get::<_, String>(2)?,
        "studentName": format!("{} {}", r.get::<_, String>(3)?, r.get::<_, String>(4)?),
        "courseId": r.get::<_, String>(5)?,
        "courseCode": r.get::<_, String>(6)?,
        "date": r.get::<_, String>(7)?,
        "status": r.get::<_, String>(8)?,
        "remark": r.get::<_, Option<String>>(9)?,
        "recordedBy": r.get::<_, Option<String>>(10)?,
    }))
}

fn load_attendance_json(conn: &Connection, id: &str) -> Result<Value, ApiError> {
    conn.query_row(
        &format!("SELECT {} FROM {} WHERE a.id = ?", ATTENDANCE_SELECT, ATTENDANCE_FROM),
        [id],
        attendance_json,
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::NotFound(_) => ApiError::not_found("attendance record"),
        other => other,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    student_id: Option<String>,
    course_id: Option<String>,
    date: Option<String>,
    status: Option<AttendanceStatus>,
}

async fn list_attendance(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<ListQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let date = match q.date.as_deref() {
        Some(d) => Some(parse_date("date", d)?.to_string()),
        None => None,
    };
    let conn = state.conn()?;
    let student_id = scope_student(&conn, &user, q.student_id)?;

    let mut f = Filters::new();
    f.eq("a.student_id", student_id.as_deref())
        .eq("a.course_id", q.course_id.as_deref())
        .eq("a.date", date.as_deref())
        .eq("a.status", q.status.as_ref().map(AttendanceStatus::as_str));
    ok(list_page(
        &conn,
        ATTENDANCE_SELECT,
        ATTENDANCE_FROM,
        &f,
        "a.date DESC, c.code, s.last_name",
        &page,
        attendance_json,
    )?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttendanceBody {
    student_id: Option<String>,
    course_id: Option<String>,
    date: Option<String>,
    status: Option<AttendanceStatus>,
    remark: Option<String>,
}

async fn create_attendance(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<AttendanceBody>,
) -> ApiResult {
    user.require(&[Role::Lecturer])?;
    let student_id = optional_text(body.student_id)
        .ok_or_else(|| ApiError::bad_params("studentId is required"))?;
    let course_id = optional_text(body.course_id)
        .ok_or_else(|| ApiError::bad_params("courseId is required"))?;
    let date = parse_date("date", body.date.as_deref().unwrap_or(""))?;
    let status = body
        .status
        .ok_or_else(|| ApiError::bad_params("status is required"))?;

    let conn = state.conn()?;
    ensure_exists(&conn, "students", &student_id, "student")?;
    ensure_exists(&conn, "courses", &course_id, "course")?;
    let id = new_id();
    conn.execute(
        "INSERT INTO attendance(id, student_id, course_id, date, status, remark, recorded_by)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            student_id,
            course_id,
            date.to_string(),
            status.as_str(),
            optional_text(body.remark),
            user.id,
        ],
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => {
            ApiError::conflict("attendance for this student, course and date already exists")
        }
        other => other,
    })?;
    created(load_attendance_json(&conn, &id)?)
}

async fn update_attendance(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<AttendanceBody>,
) -> ApiResult {
    user.require(&[Role::Lecturer])?;
    let conn = state.conn()?;
    let current: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT status, remark FROM attendance WHERE id = ?",
            [&id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((status, remark)) = current else {
        return Err(ApiError::not_found("attendance record"));
    };

    let status = body.status.map(|s| s.as_str().to_string()).unwrap_or(status);
    let remark = match body.remark {
        Some(r) => optional_text(Some(r)),
        None => remark,
    };
    conn.execute(
        "UPDATE attendance SET status = ?, remark = ?, recorded_by = ? WHERE id = ?",
        (&status, &remark, &user.id, &id),
    )?;
    ok(load_attendance_json(&conn, &id)?)
}

async fn delete_attendance(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    user.require(&[Role::Lecturer])?;
    let conn = state.conn()?;
    let n = conn.execute("DELETE FROM attendance WHERE id = ?", [&id])?;
    if n == 0 {
        return Err(ApiError::not_found("attendance record"));
    }
    ok(json!({ "id": id, "deleted": true }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkEntry {
    student_id: String,
    status: AttendanceStatus,
    remark: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkBody {
    course_id: String,
    date: String,
    entries: Vec<BulkEntry>,
}

async fn bulk_record(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<BulkBody>,
) -> ApiResult {
    user.require(&[Role::Lecturer])?;
    let date = parse_date("date", &body.date)?.to_string();
    if body.entries.is_empty() {
        return Err(ApiError::bad_params("entries must not be empty"));
    }

    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    ensure_exists(&tx, "courses", &body.course_id, "course")?;

    let mut inserted = 0usize;
    let mut updated = 0usize;
    for entry in &body.entries {
        ensure_exists(&tx, "students", &entry.student_id, "student")?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM attendance WHERE student_id = ? AND course_id = ? AND date = ?",
                (&entry.student_id, &body.course_id, &date),
                |r| r.get(0),
            )
            .optional()?;
        let remark = optional_text(entry.remark.clone());
        match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE attendance SET status = ?, remark = ?, recorded_by = ? WHERE id = ?",
                    (entry.status.as_str(), &remark, &user.id, &id),
                )?;
                updated += 1;
            }
            None => {
                tx.execute(
                    "INSERT INTO attendance(id, student_id, course_id, date, status, remark,
                                            recorded_by)
                     VALUES(?, ?, ?, ?, ?, ?, ?)",
                    rusqlite::params![
                        new_id(),
                        entry.student_id,
                        body.course_id,
                        date,
                        entry.status.as_str(),
                        remark,
                        user.id,
                    ],
                )?;
                inserted += 1;
            }
        }
    }
    tx.commit()?;

    info!(course_id = %body.course_id, date = %date, inserted, updated, "attendance recorded");
    ok(json!({ "inserted": inserted, "updated": updated }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryQuery {
    student_id: Option<String>,
    course_id: Option<String>,
}

pub fn attendance_counts(
    conn: &Connection,
    student_id: Option<&str>,
    course_id: Option<&str>,
) -> Result<AttendanceCounts, ApiError> {
    let mut f = Filters::new();
    f.eq("student_id", student_id).eq("course_id", course_id);
    let mut stmt = conn.prepare(&format!(
        "SELECT status, COUNT(*) FROM attendance{} GROUP BY status",
        f.where_sql()
    ))?;
    let mut rows = stmt.query(rusqlite::params_from_iter(f.params()))?;
    let mut counts = AttendanceCounts::default();
    while let Some(row) = rows.next()? {
        let status: String = row.get(0)?;
        let n: i64 = row.get(1)?;
        match status.as_str() {
            "present" => counts.present = n,
            "absent" => counts.absent = n,
            "late" => counts.late = n,
            "excused" => counts.excused = n,
            _ => {}
        }
    }
    Ok(counts)
}

async fn summary(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<SummaryQuery>,
) -> ApiResult {
    let conn = state.conn()?;
    let student_id = scope_student(&conn, &user, optional_text(q.student_id))?;
    let course_id = optional_text(q.course_id);
    let counts = attendance_counts(&conn, student_id.as_deref(), course_id.as_deref())?;

    ok(json!({
        "studentId": student_id,
        "courseId": course_id,
        "total": counts.total(),
        "present": counts.present,
        "absent": counts.absent,
        "late": counts.late,
        "excused": counts.excused,
        "rate": counts.rate(),
    }))
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/attendance", get(list_attendance).post(create_attendance))
        .route("/attendance/bulk", post(bulk_record))
        .route("/attendance/summary", get(summary))
        .route(
            "/attendance/{id}",
            put(update_attendance).delete(delete_attendance),
        )
}
