use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use rusqlite::{Connection, Row};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::ApiError;
use crate::api::helpers::{
    created, ensure_exists, list_page, new_id, now_rfc3339, ok, optional_text, required,
    ApiResult, Filters, Page, Params, Payload,
};
use crate::api::types::SharedState;
use crate::auth::{CurrentUser, Role};

const STUDENT_STATUSES: &[&str] = &["active", "suspended", "graduated", "withdrawn"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<String>,
    faculty_id: Option<String>,
    department_id: Option<String>,
    major_id: Option<String>,
    level: Option<i64>,
    status: Option<String>,
    semester: Option<i64>,
    academic_year: Option<String>,
    lecturer_id: Option<String>,
}

fn ensure_optional(
    conn: &Connection,
    table: &'static str,
    id: Option<&str>,
    what: &str,
) -> Result<(), ApiError> {
    match id {
        Some(id) => ensure_exists(conn, table, id, what),
        None => Ok(()),
    }
}

// --- faculties / departments / majors ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameBody {
    name: String,
    faculty_id: Option<String>,
    department_id: Option<String>,
}

async fn list_faculties(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Params(q): Params<ListQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let mut f = Filters::new();
    f.search(&["name"], q.search.as_deref());
    let conn = state.conn()?;
    ok(list_page(&conn, "id, name", "faculties", &f, "name", &page, |r| {
        Ok(json!({ "id": r.get::<_, String>(0)?, "name": r.get::<_, String>(1)? }))
    })?)
}

async fn create_faculty(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<NameBody>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let name = required("name", &body.name)?;
    let conn = state.conn()?;
    let id = new_id();
    conn.execute("INSERT INTO faculties(id, name) VALUES(?, ?)", (&id, &name))?;
    created(json!({ "id": id, "name": name }))
}

async fn list_departments(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Params(q): Params<ListQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let mut f = Filters::new();
    f.eq("faculty_id", q.faculty_id.as_deref())
        .search(&["name"], q.search.as_deref());
    let conn = state.conn()?;
    ok(list_page(
        &conn,
        "id, faculty_id, name",
        "departments",
        &f,
        "name",
        &page,
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "facultyId": r.get::<_, String>(1)?,
                "name": r.get::<_, String>(2)?,
            }))
        },
    )?)
}

async fn create_department(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<NameBody>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let name = required("name", &body.name)?;
    let faculty_id = optional_text(body.faculty_id)
        .ok_or_else(|| ApiError::bad_params("facultyId is required"))?;
    let conn = state.conn()?;
    ensure_exists(&conn, "faculties", &faculty_id, "faculty")?;
    let id = new_id();
    conn.execute(
        "INSERT INTO departments(id, faculty_id, name) VALUES(?, ?, ?)",
        (&id, &faculty_id, &name),
    )?;
    created(json!({ "id": id, "facultyId": faculty_id, "name": name }))
}

async fn list_majors(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Params(q): Params<ListQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let mut f = Filters::new();
    f.eq("department_id", q.department_id.as_deref())
        .search(&["name"], q.search.as_deref());
    let conn = state.conn()?;
    ok(list_page(
        &conn,
        "id, department_id, name",
        "majors",
        &f,
        "name",
        &page,
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "departmentId": r.get::<_, String>(1)?,
                "name": r.get::<_, String>(2)?,
            }))
        },
    )?)
}

async fn create_major(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<NameBody>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let name = required("name", &body.name)?;
    let department_id = optional_text(body.department_id)
        .ok_or_else(|| ApiError::bad_params("departmentId is required"))?;
    let conn = state.conn()?;
    ensure_exists(&conn, "departments", &department_id, "department")?;
    let id = new_id();
    conn.execute(
        "INSERT INTO majors(id, department_id, name) VALUES(?, ?, ?)",
        (&id, &department_id, &name),
    )?;
    created(json!({ "id": id, "departmentId": department_id, "name": name }))
}

// --- students ---

const STUDENT_SELECT: &str = "id, user_id, matricule, first_name, last_name, email, faculty_id,
    department_id, major_id, level, gpa, status, created_at, updated_at";

#[derive(Debug, Clone)]
struct StudentRecord {
    user_id: Option<String>,
    matricule: String,
    first_name: String,
    last_name: String,
    email: Option<String>,
    faculty_id: Option<String>,
    department_id: Option<String>,
    major_id: Option<String>,
    level: i64,
    status: String,
}

fn student_json(r: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "userId": r.get::<_, Option<String>>(1)?,
        "matricule": r.get::<_, String>(2)?,
        "firstName": r.get::<_, String>(3)?,
        "lastName": r.get::<_, String>(4)?,
        "email": r.get::<_, Option<String>>(5)?,
        "facultyId": r.get::<_, Option<String>>(6)?,
        "departmentId": r.get::<_, Option<String>>(7)?,
        "majorId": r.get::<_, Option<String>>(8)?,
        "level": r.get::<_, i64>(9)?,
        "gpa": r.get::<_, f64>(10)?,
        "status": r.get::<_, String>(11)?,
        "createdAt": r.get::<_, String>(12)?,
        "updatedAt": r.get::<_, String>(13)?,
    }))
}

fn load_student_json(conn: &Connection, id: &str) -> Result<Value, ApiError> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", STUDENT_SELECT),
        [id],
        student_json,
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::NotFound(_) => ApiError::not_found("student"),
        other => other,
    })
}

fn load_student_record(conn: &Connection, id: &str) -> Result<StudentRecord, ApiError> {
    conn.query_row(
        "SELECT user_id, matricule, first_name, last_name, email, faculty_id, department_id,
                major_id, level, status
         FROM students WHERE id = ?",
        [id],
        |r| {
            Ok(StudentRecord {
                user_id: r.get(0)?,
                matricule: r.get(1)?,
                first_name: r.get(2)?,
                last_name: r.get(3)?,
                email: r.get(4)?,
                faculty_id: r.get(5)?,
                department_id: r.get(6)?,
                major_id: r.get(7)?,
                level: r.get(8)?,
                status: r.get(9)?,
            })
        },
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::NotFound(_) => ApiError::not_found("student"),
        other => other,
    })
}

fn validate_student(conn: &Connection, s: &StudentRecord) -> Result<(), ApiError> {
    if s.level < 1 || s.level > 10 {
        return Err(ApiError::bad_params("level must be between 1 and 10"));
    }
    if !STUDENT_STATUSES.contains(&s.status.as_str()) {
        return Err(ApiError::bad_params(format!(
            "status must be one of: {}",
            STUDENT_STATUSES.join(", ")
        )));
    }
    ensure_optional(conn, "users", s.user_id.as_deref(), "user")?;
    ensure_optional(conn, "faculties", s.faculty_id.as_deref(), "faculty")?;
    ensure_optional(conn, "departments", s.department_id.as_deref(), "department")?;
    ensure_optional(conn, "majors", s.major_id.as_deref(), "major")?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentBody {
    user_id: Option<String>,
    matricule: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    faculty_id: Option<String>,
    department_id: Option<String>,
    major_id: Option<String>,
    level: Option<i64>,
    status: Option<String>,
}

async fn list_students(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Params(q): Params<ListQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let mut f = Filters::new();
    f.eq("faculty_id", q.faculty_id.as_deref())
        .eq("department_id", q.department_id.as_deref())
        .eq("major_id", q.major_id.as_deref())
        .eq("status", q.status.as_deref())
        .eq_int("level", q.level)
        .search(
            &["matricule", "first_name", "last_name", "email"],
            q.search.as_deref(),
        );
    let conn = state.conn()?;
    ok(list_page(
        &conn,
        STUDENT_SELECT,
        "students",
        &f,
        "last_name, first_name, matricule",
        &page,
        student_json,
    )?)
}

async fn get_student(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    ok(load_student_json(&conn, &id)?)
}

async fn create_student(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<StudentBody>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let record = StudentRecord {
        user_id: optional_text(body.user_id),
        matricule: required("matricule", body.matricule.as_deref().unwrap_or(""))?,
        first_name: required("firstName", body.first_name.as_deref().unwrap_or(""))?,
        last_name: required("lastName", body.last_name.as_deref().unwrap_or(""))?,
        email: optional_text(body.email).map(|e| e.to_ascii_lowercase()),
        faculty_id: optional_text(body.faculty_id),
        department_id: optional_text(body.department_id),
        major_id: optional_text(body.major_id),
        level: body.level.unwrap_or(1),
        status: optional_text(body.status).unwrap_or_else(|| "active".to_string()),
    };

    let conn = state.conn()?;
    validate_student(&conn, &record)?;
    let id = new_id();
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO students(id, user_id, matricule, first_name, last_name, email, faculty_id,
                              department_id, major_id, level, gpa, status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
        rusqlite::params![
            id,
            record.user_id,
            record.matricule,
            record.first_name,
            record.last_name,
            record.email,
            record.faculty_id,
            record.department_id,
            record.major_id,
            record.level,
            record.status,
            now,
            now,
        ],
    )?;
    info!(student_id = %id, matricule = %record.matricule, "student created");
    created(load_student_json(&conn, &id)?)
}

async fn update_student(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<StudentBody>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let conn = state.conn()?;
    let mut s = load_student_record(&conn, &id)?;

    if let Some(v) = body.user_id {
        s.user_id = optional_text(Some(v));
    }
    if let Some(v) = body.matricule {
        s.matricule = required("matricule", &v)?;
    }
    if let Some(v) = body.first_name {
        s.first_name = required("firstName", &v)?;
    }
    if let Some(v) = body.last_name {
        s.last_name = required("lastName", &v)?;
    }
    if let Some(v) = body.email {
        s.email = optional_text(Some(v)).map(|e| e.to_ascii_lowercase());
    }
    if let Some(v) = body.faculty_id {
        s.faculty_id = optional_text(Some(v));
    }
    if let Some(v) = body.department_id {
        s.department_id = optional_text(Some(v));
    }
    if let Some(v) = body.major_id {
        s.major_id = optional_text(Some(v));
    }
    if let Some(v) = body.level {
        s.level = v;
    }
    if let Some(v) = body.status {
        s.status = v.trim().to_string();
    }
    validate_student(&conn, &s)?;

    conn.execute(
        "UPDATE students SET user_id = ?, matricule = ?, first_name = ?, last_name = ?,
                email = ?, faculty_id = ?, department_id = ?, major_id = ?, level = ?,
                status = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            s.user_id,
            s.matricule,
            s.first_name,
            s.last_name,
            s.email,
            s.faculty_id,
            s.department_id,
            s.major_id,
            s.level,
            s.status,
            now_rfc3339(),
            id,
        ],
    )?;
    ok(load_student_json(&conn, &id)?)
}

async fn delete_student(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let conn = state.conn()?;
    let n = conn
        .execute("DELETE FROM students WHERE id = ?", [&id])
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => {
                ApiError::conflict("student has grades, attendance or invoices on record")
            }
            other => other,
        })?;
    if n == 0 {
        return Err(ApiError::not_found("student"));
    }
    info!(student_id = %id, "student deleted");
    ok(json!({ "id": id, "deleted": true }))
}

// --- courses ---

const COURSE_SELECT: &str = "id, code, title, credits, department_id, major_id, semester,
    academic_year, lecturer_id, created_at";

#[derive(Debug, Clone)]
struct CourseRecord {
    code: String,
    title: String,
    credits: f64,
    department_id: Option<String>,
    major_id: Option<String>,
    semester: i64,
    academic_year: String,
    lecturer_id: Option<String>,
}

fn course_json(r: &Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "code": r.get::<_, String>(1)?,
        "title": r.get::<_, String>(2)?,
        "credits": r.get::<_, f64>(3)?,
        "departmentId": r.get::<_, Option<String>>(4)?,
        "majorId": r.get::<_, Option<String>>(5)?,
        "semester": r.get::<_, i64>(6)?,
        "academicYear": r.get::<_, String>(7)?,
        "lecturerId": r.get::<_, Option<String>>(8)?,
        "createdAt": r.get::<_, String>(9)?,
    }))
}

fn load_course_json(conn: &Connection, id: &str) -> Result<Value, ApiError> {
    conn.query_row(
        &format!("SELECT {} FROM courses WHERE id = ?", COURSE_SELECT),
        [id],
        course_json,
    )
    .map_err(|e| match ApiError::from(e) {
        ApiError::NotFound(_) => ApiError::not_found("course"),
        other => other,
    })
}

fn validate_course(conn: &Connection, c: &CourseRecord) -> Result<(), ApiError> {
    if !c.credits.is_finite() || c.credits <= 0.0 {
        return Err(ApiError::bad_params("credits must be a positive number"));
    }
    if c.semester != 1 && c.semester != 2 {
        return Err(ApiError::bad_params("semester must be 1 or 2"));
    }
    ensure_optional(conn, "departments", c.department_id.as_deref(), "department")?;
    ensure_optional(conn, "majors", c.major_id.as_deref(), "major")?;
    if let Some(lecturer) = c.lecturer_id.as_deref() {
        let role: String = conn
            .query_row("SELECT role FROM users WHERE id = ?", [lecturer], |r| r.get(0))
            .map_err(|e| match ApiError::from(e) {
                ApiError::NotFound(_) => ApiError::not_found("lecturer"),
                other => other,
            })?;
        if role != Role::Lecturer.as_str() && role != Role::Admin.as_str() {
            return Err(ApiError::bad_params("lecturerId must reference a lecturer"));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseBody {
    code: Option<String>,
    title: Option<String>,
    credits: Option<f64>,
    department_id: Option<String>,
    major_id: Option<String>,
    semester: Option<i64>,
    academic_year: Option<String>,
    lecturer_id: Option<String>,
}

async fn list_courses(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Params(q): Params<ListQuery>,
) -> ApiResult {
    let page = Page::resolve(q.page, q.limit, state.config.server.default_page_size)?;
    let mut f = Filters::new();
    f.eq("department_id", q.department_id.as_deref())
        .eq("major_id", q.major_id.as_deref())
        .eq("academic_year", q.academic_year.as_deref())
        .eq("lecturer_id", q.lecturer_id.as_deref())
        .eq_int("semester", q.semester)
        .search(&["code", "title"], q.search.as_deref());
    let conn = state.conn()?;
    ok(list_page(
        &conn,
        COURSE_SELECT,
        "courses",
        &f,
        "code",
        &page,
        course_json,
    )?)
}

async fn get_course(
    State(state): State<SharedState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    ok(load_course_json(&conn, &id)?)
}

async fn create_course(
    State(state): State<SharedState>,
    user: CurrentUser,
    Payload(body): Payload<CourseBody>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let record = CourseRecord {
        code: required("code", body.code.as_deref().unwrap_or(""))?.to_ascii_uppercase(),
        title: required("title", body.title.as_deref().unwrap_or(""))?,
        credits: body
            .credits
            .ok_or_else(|| ApiError::bad_params("credits is required"))?,
        department_id: optional_text(body.department_id),
        major_id: optional_text(body.major_id),
        semester: body
            .semester
            .ok_or_else(|| ApiError::bad_params("semester is required"))?,
        academic_year: required("academicYear", body.academic_year.as_deref().unwrap_or(""))?,
        lecturer_id: optional_text(body.lecturer_id),
    };

    let conn = state.conn()?;
    validate_course(&conn, &record)?;
    let id = new_id();
    conn.execute(
        "INSERT INTO courses(id, code, title, credits, department_id, major_id, semester,
                             academic_year, lecturer_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            record.code,
            record.title,
            record.credits,
            record.department_id,
            record.major_id,
            record.semester,
            record.academic_year,
            record.lecturer_id,
            now_rfc3339(),
        ],
    )?;
    info!(course_id = %id, code = %record.code, "course created");
    created(load_course_json(&conn, &id)?)
}

async fn update_course(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<CourseBody>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let conn = state.conn()?;
    let mut c = conn
        .query_row(
            "SELECT code, title, credits, department_id, major_id, semester, academic_year,
                    lecturer_id
             FROM courses WHERE id = ?",
            [&id],
            |r| {
                Ok(CourseRecord {
                    code: r.get(0)?,
                    title: r.get(1)?,
                    credits: r.get(2)?,
                    department_id: r.get(3)?,
                    major_id: r.get(4)?,
                    semester: r.get(5)?,
                    academic_year: r.get(6)?,
                    lecturer_id: r.get(7)?,
                })
            },
        )
        .map_err(|e| match ApiError::from(e) {
            ApiError::NotFound(_) => ApiError::not_found("course"),
            other => other,
        })?;

    if let Some(v) = body.code {
        c.code = required("code", &v)?.to_ascii_uppercase();
    }
    if let Some(v) = body.title {
        c.title = required("title", &v)?;
    }
    if let Some(v) = body.credits {
        c.credits = v;
    }
    if let Some(v) = body.department_id {
        c.department_id = optional_text(Some(v));
    }
    if let Some(v) = body.major_id {
        c.major_id = optional_text(Some(v));
    }
    if let Some(v) = body.semester {
        c.semester = v;
    }
    if let Some(v) = body.academic_year {
        c.academic_year = required("academicYear", &v)?;
    }
    if let Some(v) = body.lecturer_id {
        c.lecturer_id = optional_text(Some(v));
    }
    validate_course(&conn, &c)?;

    conn.execute(
        "UPDATE courses SET code = ?, title = ?, credits = ?, department_id = ?, major_id = ?,
                semester = ?, academic_year = ?, lecturer_id = ?
         WHERE id = ?",
        rusqlite::params![
            c.code,
            c.title,
            c.credits,
            c.department_id,
            c.major_id,
            c.semester,
            c.academic_year,
            c.lecturer_id,
            id,
        ],
    )?;
    // Credits feed every enrolled student's GPA.
    super::grades::refresh_gpa_for_course(&conn, &id)?;
    ok(load_course_json(&conn, &id)?)
}

async fn delete_course(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult {
    user.require(&[Role::Admin])?;
    let conn = state.conn()?;
    let n = conn
        .execute("DELETE FROM courses WHERE id = ?", [&id])
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => {
                ApiError::conflict("course has grades or attendance on record")
            }
            other => other,
        })?;
    if n == 0 {
        return Err(ApiError::not_found("course"));
    }
    info!(course_id = %id, "course deleted");
    ok(json!({ "id": id, "deleted": true }))
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/faculties", get(list_faculties).post(create_faculty))
        .route("/departments", get(list_departments).post(create_department))
        .route("/majors", get(list_majors).post(create_major))
        .route("/students", get(list_students).post(create_student))
        .route(
            "/students/{id}",
            get(get_student).put(update_student).delete(delete_student),
        )
        .route("/courses", get(list_courses).post(create_course))
        .route(
            "/courses/{id}",
            get(get_course).put(update_course).delete(delete_course),
        )
        .merge(super::grades::routes())
        .merge(super::attendance::routes())
}
