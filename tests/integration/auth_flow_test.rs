use axum::http::Method;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use fithub::auth::JwtService;
use crate::common::{unique_email, TestApp};

#[tokio::test]
async fn test_signup_grants_thirty_day_subscription() {
    let Some(app) = TestApp::spawn().await else { return };

    let response = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"email": unique_email(), "password": "x"})),
        )
        .await;
    assert_eq!(response["code"], 200);
    assert_eq!(response["msg"], "ok");
    let token = response["data"]["token"].as_str().unwrap();
    assert!(!token.is_empty());

    let profile = app.get("/api/coach/profile", token).await;
    assert_eq!(profile["code"], 200);
    assert_eq!(profile["data"]["subscription"]["status"], 2);

    let expired_at: DateTime<Utc> = profile["data"]["subscription"]["expired_at"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    let expected = Utc::now() + Duration::days(30);
    assert!((expired_at - expected).num_seconds().abs() < 120);
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let Some(app) = TestApp::spawn().await else { return };
    let email = unique_email();
    let body = json!({"email": email, "password": "x"});

    let first = app.call(Method::POST, "/api/auth/register", None, Some(body.clone())).await;
    assert_eq!(first["code"], 200);

    let second = app.call(Method::POST, "/api/auth/register", None, Some(body)).await;
    assert_eq!(second["code"], 409);
    assert_eq!(second["data"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_login_checks_password() {
    let Some(app) = TestApp::spawn().await else { return };
    let email = unique_email();
    app.call(
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"email": email, "password": "secret"})),
    )
    .await;

    let ok = app
        .call(Method::POST, "/api/auth/login", None, Some(json!({"email": email, "password": "secret"})))
        .await;
    assert_eq!(ok["code"], 200);

    let jwt = JwtService::new(&app.config.jwt_secret, app.config.token_ttl_hours);
    let claims = jwt
        .validate_token(ok["data"]["token"].as_str().unwrap(), Utc::now())
        .unwrap();
    assert_eq!(claims.id, ok["data"]["coach_id"].as_i64().unwrap());

    let wrong = app
        .call(Method::POST, "/api/auth/login", None, Some(json!({"email": email, "password": "nope"})))
        .await;
    assert_eq!(wrong["code"], 401);

    let missing = app
        .call(Method::POST, "/api/auth/login", None, Some(json!({"email": unique_email(), "password": "x"})))
        .await;
    assert_eq!(missing["code"], 404);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let Some(app) = TestApp::spawn().await else { return };

    let response = app.call(Method::GET, "/api/coach/profile", None, None).await;
    assert_eq!(response["code"], 401);

    let response = app.get("/api/coach/profile", "not-a-token").await;
    assert_eq!(response["code"], 401);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let Some(app) = TestApp::spawn().await else { return };

    let response = app
        .call(Method::POST, "/api/auth/register", None, Some(json!({"email": "no-at-sign", "password": "x"})))
        .await;
    assert_eq!(response["code"], 400);

    let response = app
        .call(Method::POST, "/api/auth/register", None, Some(json!({"password": "x"})))
        .await;
    assert_eq!(response["code"], 400);
}

#[tokio::test]
async fn test_student_relationship_and_visibility() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, coach_token) = app.register().await;
    let (_, stranger_token) = app.register().await;
    let student_id = app.create_student(&coach_token).await;

    let students = app.get("/api/coach/students", &coach_token).await;
    assert_eq!(students["code"], 200);
    let list = students["data"]["list"].as_array().unwrap();
    assert!(list.iter().any(|s| s["student_id"] == student_id));

    let as_stranger = app
        .get(&format!("/api/workout_day/list?student_id={student_id}"), &stranger_token)
        .await;
    assert_eq!(as_stranger["code"], 401);

    let as_coach = app
        .get(&format!("/api/workout_day/list?student_id={student_id}"), &coach_token)
        .await;
    assert_eq!(as_coach["code"], 200, "coach {coach_id} should see their student");
}

#[tokio::test]
async fn test_nickname_is_filtered() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;

    let response = app
        .call(
            Method::PUT,
            "/api/coach/profile",
            Some(&token),
            Some(json!({"nickname": "a BadWord here"})),
        )
        .await;
    assert_eq!(response["code"], 400);

    let response = app
        .call(Method::PUT, "/api/coach/profile", Some(&token), Some(json!({"nickname": "lifter"})))
        .await;
    assert_eq!(response["code"], 200);
    assert_eq!(response["data"]["coach"]["nickname"], "lifter");
}

#[tokio::test]
async fn test_profile_fetch_reattaches_orphan_profile() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, token) = app.register().await;

    let (orphan_id,): (i64,) = sqlx::query_as("SELECT profile1_id FROM coach WHERE id = $1")
        .bind(coach_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_ne!(orphan_id, 0);
    sqlx::query("UPDATE coach SET profile1_id = 0 WHERE id = $1")
        .bind(coach_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let profile = app.get("/api/coach/profile", &token).await;
    assert_eq!(profile["code"], 200);
    assert_eq!(profile["data"]["profile"]["id"], orphan_id);
    assert_eq!(profile["data"]["coach"]["profile1_id"], orphan_id);

    let (attached,): (i64,) = sqlx::query_as("SELECT profile1_id FROM coach WHERE id = $1")
        .bind(coach_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(attached, orphan_id);

    let (profiles,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM coach_profile1 WHERE coach_id = $1")
        .bind(coach_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(profiles, 1);
}
