mod common;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{data_id, seed_campus, TestApp};

#[tokio::test]
async fn preview_applies_the_grade_scale() {
    let app = TestApp::new();
    let admin = app.admin_token().await;

    let (status, body) = app
        .post("/api/academic/grades/preview", &admin, json!({ "caMarks": 28, "examMarks": 62 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["total"], json!(90.0));
    assert_eq!(body["data"]["letter"], json!("A"));
    assert_eq!(body["data"]["points"], json!(4.0));
    assert_eq!(body["data"]["passed"], json!(true));

    let (_, body) = app
        .post("/api/academic/grades/preview", &admin, json!({ "caMarks": 10, "examMarks": 40 }))
        .await;
    assert_eq!(body["data"]["letter"], json!("D"));
    assert_eq!(body["data"]["passed"], json!(false));

    let (status, body) = app
        .post("/api/academic/grades/preview", &admin, json!({ "caMarks": 31, "examMarks": 10 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("bad_params"));
}

#[tokio::test]
async fn recording_grades_updates_gpa_and_transcript() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (student_user, student_token) = app
        .user_with_role(&admin, "ada@uni.edu", "student")
        .await;
    let campus = seed_campus(&app, &admin, Some(&student_user)).await;

    let (status, body) = app
        .post(
            "/api/academic/courses",
            &admin,
            json!({
                "code": "mth102",
                "title": "Calculus",
                "credits": 2,
                "departmentId": campus.department_id,
                "semester": 2,
                "academicYear": "2026/2027",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["code"], json!("MTH102"));
    let calculus = data_id(&body);

    let (status, body) = app
        .post(
            "/api/academic/grades",
            &admin,
            json!({
                "studentId": campus.student_id,
                "courseId": campus.course_id,
                "caMarks": 28,
                "examMarks": 62,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["letter"], json!("A"));

    let (status, _) = app
        .post(
            "/api/academic/grades",
            &admin,
            json!({
                "studentId": campus.student_id,
                "courseId": calculus,
                "caMarks": 10,
                "examMarks": 40,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // (4.0 * 3 + 1.0 * 2) / 5
    let (_, body) = app
        .get(&format!("/api/academic/students/{}", campus.student_id), &admin)
        .await;
    assert_eq!(body["data"]["gpa"], json!(2.8));

    let (status, body) = app
        .get(
            &format!("/api/academic/students/{}/transcript", campus.student_id),
            &student_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["gpa"], json!(2.8));
    assert_eq!(body["data"]["coursesCounted"], json!(2));
    assert_eq!(body["data"]["creditsAttempted"], json!(5.0));
    assert_eq!(body["data"]["creditsEarned"], json!(3.0));
    assert_eq!(body["data"]["courses"].as_array().map(Vec::len), Some(2));

    // The student was told about both grades.
    let (_, body) = app
        .get("/api/notifications/unread-count", &student_token)
        .await;
    assert_eq!(body["data"]["unread"], json!(2));
}

#[tokio::test]
async fn duplicate_grade_is_a_conflict() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let campus = seed_campus(&app, &admin, None).await;
    let grade = json!({
        "studentId": campus.student_id,
        "courseId": campus.course_id,
        "caMarks": 20,
        "examMarks": 50,
    });

    let (status, _) = app.post("/api/academic/grades", &admin, grade.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.post("/api/academic/grades", &admin, grade).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!("conflict"));
}

#[tokio::test]
async fn editing_and_deleting_a_grade_recomputes_gpa() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let campus = seed_campus(&app, &admin, None).await;

    let (_, body) = app
        .post(
            "/api/academic/grades",
            &admin,
            json!({
                "studentId": campus.student_id,
                "courseId": campus.course_id,
                "caMarks": 10,
                "examMarks": 40,
            }),
        )
        .await;
    let grade_id = data_id(&body);

    let (status, body) = app
        .put(
            &format!("/api/academic/grades/{grade_id}"),
            &admin,
            json!({ "examMarks": 60 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["total"], json!(70.0));
    assert_eq!(body["data"]["letter"], json!("B+"));

    let (_, body) = app
        .get(&format!("/api/academic/students/{}", campus.student_id), &admin)
        .await;
    assert_eq!(body["data"]["gpa"], json!(3.3));

    let (status, body) = app
        .delete(&format!("/api/academic/grades/{grade_id}"), &admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["gpa"], json!(0.0));
}

#[tokio::test]
async fn lecturers_grade_only_their_own_courses() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (owner_id, owner) = app.user_with_role(&admin, "owner@uni.edu", "lecturer").await;
    let (_, other) = app.user_with_role(&admin, "other@uni.edu", "lecturer").await;
    let campus = seed_campus(&app, &admin, None).await;

    let (status, _) = app
        .put(
            &format!("/api/academic/courses/{}", campus.course_id),
            &admin,
            json!({ "lecturerId": owner_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let grade = json!({
        "studentId": campus.student_id,
        "courseId": campus.course_id,
        "caMarks": 25,
        "examMarks": 50,
    });
    let (status, body) = app.post("/api/academic/grades", &other, grade.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!("forbidden"));

    let (status, _) = app.post("/api/academic/grades", &owner, grade).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn students_see_only_their_own_grades() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (student_user, student_token) = app
        .user_with_role(&admin, "ada@uni.edu", "student")
        .await;
    let campus = seed_campus(&app, &admin, Some(&student_user)).await;

    let (_, body) = app
        .post(
            "/api/academic/students",
            &admin,
            json!({ "matricule": "CS-0002", "firstName": "Bola", "lastName": "Eze" }),
        )
        .await;
    let other_student = data_id(&body);

    for student_id in [&campus.student_id, &other_student] {
        let (status, _) = app
            .post(
                "/api/academic/grades",
                &admin,
                json!({
                    "studentId": student_id,
                    "courseId": campus.course_id,
                    "caMarks": 20,
                    "examMarks": 50,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app.get("/api/academic/grades", &student_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(1));
    assert_eq!(body["data"]["items"][0]["studentId"], json!(campus.student_id));

    let (status, _) = app
        .get(
            &format!("/api/academic/grades?studentId={other_student}"),
            &student_token,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            "/api/academic/grades",
            &student_token,
            json!({
                "studentId": campus.student_id,
                "courseId": campus.course_id,
                "caMarks": 30,
                "examMarks": 70,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn student_directory_filters_and_validation() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let campus = seed_campus(&app, &admin, None).await;

    let (status, body) = app
        .get(
            &format!("/api/academic/students?departmentId={}&search=obi", campus.department_id),
            &admin,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(1));
    assert_eq!(body["data"]["page"], json!(1));

    let (status, _) = app
        .put(
            &format!("/api/academic/students/{}", campus.student_id),
            &admin,
            json!({ "status": "expelled" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .put(
            &format!("/api/academic/students/{}", campus.student_id),
            &admin,
            json!({ "level": 3, "status": "suspended" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["level"], json!(3));
    assert_eq!(body["data"]["status"], json!("suspended"));
    assert_eq!(body["data"]["firstName"], json!("Ada"));

    let (status, body) = app
        .post(
            "/api/academic/students",
            &admin,
            json!({ "matricule": "CS-0001", "firstName": "Dup", "lastName": "Licate" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);

    let (status, _) = app.get("/api/academic/students/missing", &admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn graded_students_and_courses_cannot_be_deleted() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let campus = seed_campus(&app, &admin, None).await;
    app.post(
        "/api/academic/grades",
        &admin,
        json!({
            "studentId": campus.student_id,
            "courseId": campus.course_id,
            "caMarks": 20,
            "examMarks": 50,
        }),
    )
    .await;

    let (status, _) = app
        .delete(&format!("/api/academic/students/{}", campus.student_id), &admin)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .delete(&format!("/api/academic/courses/{}", campus.course_id), &admin)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn structure_writes_are_admin_only() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, lecturer) = app.user_with_role(&admin, "lec@uni.edu", "lecturer").await;
    let campus = seed_campus(&app, &admin, None).await;

    let (status, _) = app
        .post("/api/academic/faculties", &lecturer, json!({ "name": "Arts" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .get(
            &format!("/api/academic/departments?facultyId={}", campus.faculty_id),
            &lecturer,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(1));

    let (status, _) = app
        .post(
            "/api/academic/courses",
            &admin,
            json!({
                "code": "x1",
                "title": "Bad",
                "credits": 0,
                "semester": 1,
                "academicYear": "2026/2027",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
