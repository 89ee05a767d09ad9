mod common;

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{data_id, TestApp};

fn employee(first: &str, email: &str, salary: f64, user_id: Option<&str>) -> Value {
    json!({
        "userId": user_id,
        "firstName": first,
        "lastName": "Staff",
        "email": email,
        "department": "Registry",
        "position": "Officer",
        "baseSalary": salary,
        "hireDate": "2024-01-15",
    })
}

#[tokio::test]
async fn employees_get_sequential_numbers() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, hr) = app.user_with_role(&admin, "hr@uni.edu", "hr").await;

    let (status, body) = app
        .post("/api/hr/employees", &hr, employee("Ife", "Ife@Uni.edu", 900.0, None))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["employeeNo"], json!("EMP-00001"));
    assert_eq!(body["data"]["email"], json!("ife@uni.edu"));

    let (_, body) = app
        .post("/api/hr/employees", &hr, employee("Tunde", "tunde@uni.edu", 800.0, None))
        .await;
    assert_eq!(body["data"]["employeeNo"], json!("EMP-00002"));
    let id = data_id(&body);

    let (status, body) = app
        .put(&format!("/api/hr/employees/{id}"), &hr, json!({ "position": "Head" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["position"], json!("Head"));
    assert_eq!(body["data"]["baseSalary"], json!(800.0));

    let (status, _) = app
        .post("/api/hr/employees", &hr, employee("Neg", "neg@uni.edu", -1.0, None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.delete(&format!("/api/hr/employees/{id}"), &hr).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("terminated"));
}

#[tokio::test]
async fn payroll_generation_skips_existing_and_inactive() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, hr) = app.user_with_role(&admin, "hr@uni.edu", "hr").await;
    let (staff_user, staff) = app.user_with_role(&admin, "ife@uni.edu", "lecturer").await;

    let (_, body) = app
        .post("/api/hr/employees", &hr, employee("Ife", "ife@uni.edu", 1000.0, Some(&staff_user)))
        .await;
    let ife = data_id(&body);
    let (_, body) = app
        .post("/api/hr/employees", &hr, employee("Gone", "gone@uni.edu", 500.0, None))
        .await;
    app.delete(&format!("/api/hr/employees/{}", data_id(&body)), &hr).await;

    let (status, body) = app
        .post(
            "/api/hr/payroll/generate",
            &hr,
            json!({ "period": "2026-09", "allowances": 150, "deductions": 50 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"], json!({ "period": "2026-09", "generated": 1 }));

    let (_, body) = app
        .post("/api/hr/payroll/generate", &hr, json!({ "period": "2026-09" }))
        .await;
    assert_eq!(body["data"]["generated"], json!(0));

    let (status, _) = app
        .post("/api/hr/payroll/generate", &hr, json!({ "period": "2026-9" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/hr/payroll/generate",
            &hr,
            json!({ "period": "2026-10", "deductions": 5000 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get("/api/hr/payroll?period=2026-09", &hr).await;
    assert_eq!(body["data"]["total"], json!(1));
    let payroll = &body["data"]["items"][0];
    assert_eq!(payroll["employeeId"], json!(ife));
    assert_eq!(payroll["netPay"], json!(1100.0));
    let payroll_id = payroll["id"].as_str().expect("id").to_string();

    let (status, body) = app
        .put(&format!("/api/hr/payroll/{payroll_id}/pay"), &hr, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], json!("paid"));
    let (status, _) = app
        .put(&format!("/api/hr/payroll/{payroll_id}/pay"), &hr, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The employee sees their own payslip and the notification.
    let (status, body) = app.get("/api/hr/payroll", &staff).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(1));
    let (_, body) = app.get("/api/notifications?category=hr", &staff).await;
    assert_eq!(body["data"]["items"][0]["title"], json!("Salary paid"));
}

#[tokio::test]
async fn leave_requests_follow_their_lifecycle() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, hr) = app.user_with_role(&admin, "hr@uni.edu", "hr").await;
    let (staff_user, staff) = app.user_with_role(&admin, "ife@uni.edu", "lecturer").await;
    let (_, stranger) = app.user_with_role(&admin, "other@uni.edu", "lecturer").await;
    app.post("/api/hr/employees", &hr, employee("Ife", "ife@uni.edu", 1000.0, Some(&staff_user)))
        .await;

    let leave = |start: &str, end: &str| {
        json!({
            "leaveType": "annual",
            "startDate": start,
            "endDate": end,
            "reason": "Family visit",
        })
    };

    let (status, body) = app
        .post("/api/hr/leave-requests", &staff, leave("2026-11-02", "2026-11-06"))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["days"], json!(5));
    assert_eq!(body["data"]["status"], json!("pending"));
    let first = data_id(&body);

    let (status, _) = app
        .post("/api/hr/leave-requests", &staff, leave("2026-11-05", "2026-11-09"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .post("/api/hr/leave-requests", &staff, leave("2026-11-09", "2026-11-01"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("bad_params"));

    let (status, _) = app
        .put(
            &format!("/api/hr/leave-requests/{first}/decision"),
            &staff,
            json!({ "approve": true }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .put(
            &format!("/api/hr/leave-requests/{first}/decision"),
            &hr,
            json!({ "approve": true, "note": "Enjoy" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], json!("approved"));
    assert_eq!(body["data"]["reviewNote"], json!("Enjoy"));

    let (status, _) = app
        .put(&format!("/api/hr/leave-requests/{first}/cancel"), &staff, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app
        .post("/api/hr/leave-requests", &staff, leave("2026-12-21", "2026-12-23"))
        .await;
    let second = data_id(&body);
    let (status, _) = app
        .put(&format!("/api/hr/leave-requests/{second}/cancel"), &stranger, json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app
        .put(&format!("/api/hr/leave-requests/{second}/cancel"), &staff, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("cancelled"));

    // Staff without an employee record cannot see the leave book.
    let (status, _) = app.get("/api/hr/leave-requests", &stranger).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, body) = app.get("/api/hr/leave-requests", &hr).await;
    assert_eq!(body["data"]["total"], json!(2));
}

#[tokio::test]
async fn employee_directory_is_hr_only() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, lecturer) = app.user_with_role(&admin, "lec@uni.edu", "lecturer").await;
    let (status, _) = app.get("/api/hr/employees", &lecturer).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/hr/employees", &admin).await;
    assert_eq!(status, StatusCode::OK);
}
