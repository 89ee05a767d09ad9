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
use crate::api::handlers::notifications::{notify_if_linked, Category, Notice};
use crate::api::helpers::{
    created, list_page, new_id, now_rfc3339, ok, ApiResult, Filters, Page, Params, Payload,
};
use crate::api::types::SharedState;
use crate::auth::{CurrentUser, Role};
use crate::calc::{gpa_summary, CreditedGrade, GpaSummary};

/// Student record linked to the caller's account, if any.
pub fn linked_student_id(
    conn: &Connection,
    user: &CurrentUser,
) -> Result<Option<String>, ApiError> {
    Ok(conn
        .query_row("SELECT id FROM students WHERE user_id = ?", [&user.id], |r| {
            r.get(0)
        })
        .optional()?)
}

/// Student-role callers are pinned to their own record; a student without one sees nothing.
pub fn scope_student(
    conn: &Connection,
    user: &CurrentUser,
    requested: Option<String>,
) -> Result<Option<String>, ApiError> {
    if !user.is(Role::Student) {
        return Ok(requested);
    }
    let own = linked_student_id(conn, user)?.ok_or_else(|| {
        ApiError::Forbidden("no student record is linked to this account".to_string())
    })?;
    if let Some(r) = requested.as_deref() {
        if r != own {
            return Err(ApiError::Forbidden("students may only view their own records".to_string()));
        }
    }
    Ok(Some(own))
}

fn credited_grades(conn: &Connection, student_id: &str) -> Result<Vec<CreditedGrade>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT g.points, c.credits, g.passed
         FROM grades g JOIN courses c ON c.id = g.course_id
         WHERE g.student_id = ?",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok(CreditedGrade {
                points: r.get(0)?,
                credits: r.get(1)?,
                passed: r.get::<_, i64>(2)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Recompute and store the student's GPA from their current grades.
pub fn refresh_gpa(conn: &Connection, student_id: &str) -> Result<GpaSummary, ApiError> {
    let summary = gpa_summary(credited_grades(conn, student_id)?);
    conn.execute(
        "UPDATE students SET gpa = ?, updated_at = ? WHERE id = ?",
        (summary.gpa, now_rfc3339(), student_id),
    )?;
    Ok(summary)
}

pub fn refresh_gpa_for_course(conn: &Connection, course_id: &str) -> Result<usize, ApiError> {
    let students: Vec<String> = {
        let mut stmt = conn.prepare("SELECT DISTINCT student_id FROM grades WHERE course_id = ?")?;
        let ids = stmt
            .query_map([course_id], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };
    for s in &students {
        refresh_gpa(conn, s)?;
    }
    Ok(students.len())
}

const GRADE_SELECT: &str = "g.id, g.student_id, s.matricule, s.first_name, s.last_name,
    g.course_id, c.code, c.title, c.credits, g.ca_marks, g.exam_marks, g.total, g.letter,
    g.points, g.passed, g.recorded_by, g.created_at, g.updated_at";

const GRADE_FROM: &str = "grades g
    JOIN students s ON s.id = g.student_id
    JOIN courses c ON c.id = g.course_id";

fn grade_json(r: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "matricule": r.get::<_, String>(2)?,
        "studentName": format!("{} {}", r.get::<_, String>(3)?, r.get::<_, String>(4)?),
        "courseId": r.get::<_, String>(5)?,
        "courseCode": r.get::<_, String>(6)?,
        "courseTitle": r.get::<_, String>(7)?,
        "credits": r.get::<_, f64>(8)?,
        "caMarks": r.get::<_, f64>(9)?,
        "examMarks": r.get::<_, f64>(10)?,
        "total": r.get::<_, f64>(11)?,
        "letter": r.get::<_, String>(12)?,
        "points": r.get::<_, f64>(13)?,
        "passed": r.get::<_, i64>(14)? != 0,
        "recordedBy": r.get::<_, Option<String>>(15)?,
        "createdAt": r.get::<_, String>(16)?,
        "updatedAt": r.get::<_, String>(17)?,
    }))
}

fn load_grade_json(conn: &Connection, id: &str) -> Result<Value, ApiError> {
    conn.query_row(
        &format!("SELECT {} FROM {} WHERE g.id = ?", GRADE_SELECT, GRADE_FROM),
        [id],
        grade_json,
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::NotFound(_) => ApiError::not_found("grade"),
        other => other,
    })
}

/// Lecturers may only grade courses assigned to them (or unassigned ones).
fn ensure_may_grade(
    conn: &Connection,
    user: &CurrentUser,
    course_id: &str,
) -> Result<(), ApiError> {
    let lecturer: Option<Option<String>> = conn
        .query_row("SELECT lecturer_id FROM courses WHERE id = ?", [course_id], |r| {
            r.get(0)
        })
        .optional()?;
    let Some(lecturer) = lecturer else {
        return Err(ApiError::not_found("course"));
    };
    if user.is(Role::Lecturer) {
        if let Some(l) = lecturer {
            if l != user.id {
                return Err(ApiError::Forbidden(
                    "course is assigned to another lecturer".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn notify_grade(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
    letter: &str,
    total: f64,
) -> Result<(), ApiError> {
    let (user_id, code): (Option<String>, String) = conn.query_row(
        "SELECT s.user_id, c.code FROM students s, courses c WHERE s.id = ? AND c.id = ?",
        (student_id, course_id),
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let message = format!("{}: {} ({})", code, letter, total);
    notify_if_linked(
        conn,
        user_id.as_deref(),
        &Notice {
            category: Category::Academic,
            title: "Grade recorded",
            message: &message,
            link: Some("/grades"),
        },
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    student_id: Option<String>,
    course_id: Option<String>,
    passed: Option<bool>,
}

async fn list_grades(
    State(state): State<SharedState>,
    user: CurrentUser,
    Params(q): Params<ListQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let conn = state.conn()?;
    let student_id = scope_student(&conn, &user, q.student_id)?;

    let mut f = Filters::new();
    f.eq("g.student_id", student_id.as_deref())
        .eq("g.course_id", q.course_id.as_deref())
        .eq_int("g.passed", q.passed.map(i64::from));
    ok(list_page(
        &conn,
        GRADE_SELECT,
        GRADE_FROM,
        &f,
        "c.code, s.last_name, s.first_name",
        &page,
        grade_json,
    )?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarksBody {
    student_id: Option<String>,
    course_id: Option<String>,
    ca_marks: Option<f64>,
    exam_marks: Option<f64>,
}

async fn preview(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Payload(body): Payload<MarksBody>,
) -> ApiResult {
    let ca = body
        .ca_marks
        .ok_or_else(|| ApiError::bad_params("caMarks is required"))?;
    let exam = body
        .exam_marks
        .ok_or_else(|| ApiError::bad_params("examMarks is required"))?;
    let outcome = state.grading.grade(ca, exam)?;
    ok(serde_json::to_value(outcome).map_err(anyhow::Error::from)?)
}

async fn create_grade(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<MarksBody>,
) -> ApiResult {
    user.require(&[Role::Lecturer])?;
    let student_id = body
        .student_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_params("studentId is required"))?;
    let course_id = body
        .course_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_params("courseId is required"))?;
    let ca = body
        .ca_marks
        .ok_or_else(|| ApiError::bad_params("caMarks is required"))?;
    let exam = body
        .exam_marks
        .ok_or_else(|| ApiError::bad_params("examMarks is required"))?;
    let outcome = state.grading.grade(ca, exam)?;

    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    crate::api::helpers::ensure_exists(&tx, "students", &student_id, "student")?;
    ensure_may_grade(&tx, &user, &course_id)?;

    let id = new_id();
    let now = now_rfc3339();
    tx.execute(
        "INSERT INTO grades(id, student_id, course_id, ca_marks, exam_marks, total, letter, points,
                            passed, recorded_by, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            student_id,
            course_id,
            outcome.ca_marks,
            outcome.exam_marks,
            outcome.total,
            outcome.letter,
            outcome.points,
            outcome.passed,
            user.id,
            now,
            now,
        ],
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => {
            ApiError::conflict("a grade for this student and course already exists")
        }
        other => other,
    })?;
    refresh_gpa(&tx, &student_id)?;
    notify_grade(&tx, &student_id, &course_id, &outcome.letter, outcome.total)?;
    tx.commit()?;

    info!(
        grade_id = %id,
        student_id = %student_id,
        course_id = %course_id,
        letter = %outcome.letter,
        "grade recorded"
    );
    created(load_grade_json(&conn, &id)?)
}

async fn update_grade(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<MarksBody>,
) -> ApiResult {
    user.require(&[Role::Lecturer])?;
    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    let (student_id, course_id, ca, exam): (String, String, f64, f64) = tx
        .query_row(
            "SELECT student_id, course_id, ca_marks, exam_marks FROM grades WHERE id = ?",
            [&id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("grade"),
            other => other,
        })?;
    ensure_may_grade(&tx, &user, &course_id)?;

    let outcome = state
        .grading
        .grade(body.ca_marks.unwrap_or(ca), body.exam_marks.unwrap_or(exam))?;
    tx.execute(
        "UPDATE grades SET ca_marks = ?, exam_marks = ?, total = ?, letter = ?, points = ?,
                passed = ?, recorded_by = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            outcome.ca_marks,
            outcome.exam_marks,
            outcome.total,
            outcome.letter,
            outcome.points,
            outcome.passed,
            user.id,
            now_rfc3339(),
            id,
        ],
    )?;
    refresh_gpa(&tx, &student_id)?;
    notify_grade(&tx, &student_id, &course_id, &outcome.letter, outcome.total)?;
    tx.commit()?;

    ok(load_grade_json(&conn, &id)?)
}

async fn delete_grade(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    user.require(&[Role::Lecturer])?;
    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    let (student_id, course_id): (String, String) = tx
        .query_row(
            "SELECT student_id, course_id FROM grades WHERE id = ?",
            [&id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("grade"),
            other => other,
        })?;
    ensure_may_grade(&tx, &user, &course_id)?;
    tx.execute("DELETE FROM grades WHERE id = ?", [&id])?;
    let summary = refresh_gpa(&tx, &student_id)?;
    tx.commit()?;

    info!(grade_id = %id, student_id = %student_id, "grade deleted");
    ok(json!({ "id": id, "deleted": true, "gpa": summary.gpa }))
}

async fn transcript(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(student_id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    scope_student(&conn, &user, Some(student_id.clone()))?;

    let student = conn
        .query_row(
            "SELECT id, matricule, first_name, last_name, level, status FROM students WHERE id = ?",
            [&student_id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "matricule": r.get::<_, String>(1)?,
                    "firstName": r.get::<_, String>(2)?,
                    "lastName": r.get::<_, String>(3)?,
                    "level": r.get::<_, i64>(4)?,
                    "status": r.get::<_, String>(5)?,
                }))
            },
        )
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("student"),
            other => other,
        })?;

    let mut stmt = conn.prepare(
        "SELECT c.code, c.title, c.credits, c.semester, c.academic_year,
                g.ca_marks, g.exam_marks, g.total, g.letter, g.points, g.passed
         FROM grades g JOIN courses c ON c.id = g.course_id
         WHERE g.student_id = ?
         ORDER BY c.academic_year, c.semester, c.code",
    )?;
    let mut credited = Vec::new();
    let courses = stmt
        .query_map([&student_id], |r| {
            Ok((
                json!({
                    "code": r.get::<_, String>(0)?,
                    "title": r.get::<_, String>(1)?,
                    "credits": r.get::<_, f64>(2)?,
                    "semester": r.get::<_, i64>(3)?,
                    "academicYear": r.get::<_, String>(4)?,
                    "caMarks": r.get::<_, f64>(5)?,
                    "examMarks": r.get::<_, f64>(6)?,
                    "total": r.get::<_, f64>(7)?,
                    "letter": r.get::<_, String>(8)?,
                    "points": r.get::<_, f64>(9)?,
                    "passed": r.get::<_, i64>(10)? != 0,
                }),
                CreditedGrade {
                    credits: r.get(2)?,
                    points: r.get(9)?,
                    passed: r.get::<_, i64>(10)? != 0,
                },
            ))
        })?
        .map(|row| {
            row.map(|(course, grade)| {
                credited.push(grade);
                course
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let summary = gpa_summary(credited);

    ok(json!({
        "student": student,
        "courses": courses,
        "gpa": summary.gpa,
        "coursesCounted": summary.courses_counted,
        "creditsAttempted": summary.credits_attempted,
        "creditsEarned": summary.credits_earned,
    }))
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/grades", get(list_grades).post(create_grade))
        .route("/grades/preview", post(preview))
        .route("/grades/{id}", put(update_grade).delete(delete_grade))
        .route("/students/{id}/transcript", get(transcript))
}
