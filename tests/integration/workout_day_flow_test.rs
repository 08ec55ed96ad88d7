use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use fithub::services::WorkoutDayService;
use crate::common::{progress, TestApp};

async fn start_day(app: &TestApp, token: &str, student_id: i64) -> i64 {
    let created = app
        .post(
            "/api/workout_day/create",
            token,
            json!({"student_ids": [student_id], "start_when_create": true, "title": "legs"}),
        )
        .await;
    assert_eq!(created["code"], 200, "create failed: {created}");
    created["data"]["ids"][0].as_i64().unwrap()
}

async fn save_and_finish(app: &TestApp, token: &str, id: i64, doc: Value) -> Value {
    let saved = app
        .post("/api/workout_day/update_progress", token, json!({"id": id, "pending_steps": doc}))
        .await;
    assert_eq!(saved["code"], 200, "autosave failed: {saved}");
    app.post("/api/workout_day/finish", token, json!({"id": id})).await
}

#[tokio::test]
async fn test_finish_computes_volume_and_history() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, token) = app.register().await;
    let id = start_day(&app, &token, coach_id).await;

    let doc = progress(&[(10, "20", "公斤", true), (8, "22", "磅", true), (12, "30", "公斤", false)]);
    let finished = save_and_finish(&app, &token, id, doc).await;

    assert_eq!(finished["code"], 200, "finish failed: {finished}");
    assert_eq!(finished["data"]["status"], 2);
    assert_eq!(finished["data"]["total_volume"], 279.2);
    assert!(finished["data"]["duration"].as_i64().unwrap() >= 0);
    assert_eq!(app.history_counts(id).await, (2, 0));

    let again = app.post("/api/workout_day/finish", &token, json!({"id": id})).await;
    assert_eq!(again["code"], 422);
    assert_eq!(app.history_counts(id).await, (2, 0));
}

#[tokio::test]
async fn test_continue_retires_previous_generation() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, token) = app.register().await;
    let id = start_day(&app, &token, coach_id).await;

    let first = save_and_finish(&app, &token, id, progress(&[(10, "20", "公斤", true), (8, "20", "公斤", true)])).await;
    assert_eq!(first["code"], 200);
    assert_eq!(app.history_counts(id).await, (2, 0));

    let continued = app.post("/api/workout_day/continue", &token, json!({"id": id})).await;
    assert_eq!(continued["code"], 200);
    assert_eq!(continued["data"]["status"], 1);
    assert_eq!(continued["data"]["finished_at"], Value::Null);
    assert_eq!(app.history_counts(id).await, (0, 2));

    let second = save_and_finish(&app, &token, id, progress(&[(5, "40", "公斤", true)])).await;
    assert_eq!(second["code"], 200);
    assert_eq!(second["data"]["total_volume"], 200.0);
    assert_eq!(app.history_counts(id).await, (1, 2));

    let result = app.get(&format!("/api/workout_day/result?id={id}"), &token).await;
    assert_eq!(result["code"], 200);
    assert_eq!(result["data"]["total_volume"], 200.0);
    assert_eq!(result["data"]["steps"][0]["actions"][0]["total_reps"], 5);
    assert_eq!(result["data"]["steps"][0]["actions"][0]["max_weight"], 40.0);
}

#[tokio::test]
async fn test_give_up_then_only_coach_may_continue() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, token) = app.register().await;
    let id = start_day(&app, &token, coach_id).await;

    let gave_up = app.post("/api/workout_day/give_up", &token, json!({"id": id})).await;
    assert_eq!(gave_up["data"]["status"], 5);

    let finish = app.post("/api/workout_day/finish", &token, json!({"id": id})).await;
    assert_eq!(finish["code"], 422);

    let (_, stranger) = app.register().await;
    let denied = app.post("/api/workout_day/continue", &stranger, json!({"id": id})).await;
    assert_eq!(denied["code"], 401);

    let continued = app.post("/api/workout_day/continue", &token, json!({"id": id})).await;
    assert_eq!(continued["data"]["status"], 1);
}

#[tokio::test]
async fn test_group_creation_shares_group_and_checks_students() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;
    let a = app.create_student(&token).await;
    let b = app.create_student(&token).await;

    let created = app
        .post("/api/workout_day/create", &token, json!({"student_ids": [a, b, a], "title": "push"}))
        .await;
    assert_eq!(created["code"], 200);
    assert_eq!(created["data"]["ids"].as_array().unwrap().len(), 2);

    let list = app.get(&format!("/api/workout_day/list?student_id={a}"), &token).await;
    let days = list["data"]["list"].as_array().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0]["status"], 0);
    assert_eq!(days[0]["group_no"], created["data"]["group_no"]);

    let (_, stranger) = app.register().await;
    let denied = app
        .post("/api/workout_day/create", &stranger, json!({"student_ids": [a], "title": "push"}))
        .await;
    assert_eq!(denied["code"], 401);
}

#[tokio::test]
async fn test_group_creation_requires_subscription() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, token) = app.register().await;

    sqlx::query("UPDATE subscription SET step = 3, expired_at = NOW() WHERE coach_id = $1")
        .bind(coach_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let response = app
        .post("/api/workout_day/create", &token, json!({"student_ids": [coach_id], "title": "pull"}))
        .await;
    assert_eq!(response["code"], 402);
}

#[tokio::test]
async fn test_group_creation_promotes_queued_subscription() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, token) = app.register().await;

    sqlx::query(
        r#"
        INSERT INTO subscription (coach_id, subscription_plan_id, step, count, reason)
        SELECT coach_id, subscription_plan_id, 1, 30, 'queued' FROM subscription WHERE coach_id = $1 LIMIT 1
        "#,
    )
    .bind(coach_id)
    .execute(&app.pool)
    .await
    .unwrap();
    sqlx::query("UPDATE subscription SET expect_expired_at = NOW() - INTERVAL '1 minute' WHERE coach_id = $1 AND step = 2")
        .bind(coach_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let response = app
        .post("/api/workout_day/create", &token, json!({"student_ids": [coach_id], "title": "pull"}))
        .await;
    assert_eq!(response["code"], 200, "create failed: {response}");

    let steps: Vec<(i16, i32)> = sqlx::query_as("SELECT step, count FROM subscription WHERE coach_id = $1 ORDER BY id")
        .bind(coach_id)
        .fetch_all(&app.pool)
        .await
        .unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].0, 3);
    assert_eq!(steps[1], (2, 30));
}

#[tokio::test]
async fn test_create_and_finish_records_duration() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;
    let started_at = (Utc::now() - Duration::minutes(45)).timestamp();

    let response = app
        .post(
            "/api/workout_day/create_and_finish",
            &token,
            json!({"title": "run", "type": 2, "started_at": started_at}),
        )
        .await;
    assert_eq!(response["code"], 200);
    assert_eq!(response["data"]["status"], 2);
    assert_eq!(response["data"]["total_volume"], 0.0);
    let duration = response["data"]["duration"].as_i64().unwrap();
    assert!((45..=46).contains(&duration), "duration was {duration}");

    let future = app
        .post(
            "/api/workout_day/create_and_finish",
            &token,
            json!({"title": "run", "started_at": Utc::now().timestamp() + 3600}),
        )
        .await;
    assert_eq!(future["code"], 400);
}

#[tokio::test]
async fn test_unparseable_progress_is_rejected_on_finish() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, token) = app.register().await;
    let id = start_day(&app, &token, coach_id).await;

    let response = app
        .post(
            "/api/workout_day/finish",
            &token,
            json!({"id": id, "pending_steps": {"v": 1, "steps": []}}),
        )
        .await;
    assert_eq!(response["code"], 400);

    sqlx::query("UPDATE workout_day SET pending_steps = 'not json' WHERE id = $1")
        .bind(id)
        .execute(&app.pool)
        .await
        .unwrap();
    let response = app.post("/api/workout_day/finish", &token, json!({"id": id})).await;
    assert_eq!(response["code"], 600);
    assert_eq!(app.history_counts(id).await, (0, 0));
}

#[tokio::test]
async fn test_backfill_repairs_once_and_skips_unparseable_rows() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, token) = app.register().await;

    let good = start_day(&app, &token, coach_id).await;
    let finished = save_and_finish(&app, &token, good, progress(&[(10, "20", "公斤", true)])).await;
    assert_eq!(finished["code"], 200);
    let broken = start_day(&app, &token, coach_id).await;
    let finished = save_and_finish(&app, &token, broken, progress(&[(5, "20", "公斤", true)])).await;
    assert_eq!(finished["code"], 200);

    sqlx::query("UPDATE workout_day SET total_volume = 0 WHERE id = $1")
        .bind(good)
        .execute(&app.pool)
        .await
        .unwrap();
    sqlx::query("UPDATE workout_day SET pending_steps = 'not json' WHERE id = $1")
        .bind(broken)
        .execute(&app.pool)
        .await
        .unwrap();

    let service = WorkoutDayService::new(app.pool.clone());
    let first = service.backfill().await.unwrap();
    assert!(first.updated >= 1, "first run: {first:?}");
    assert!(first.skipped >= 1, "first run: {first:?}");

    let (volume,): (f64,) = sqlx::query_as("SELECT total_volume FROM workout_day WHERE id = $1")
        .bind(good)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(volume, 200.0);

    let second = service.backfill().await.unwrap();
    assert_eq!(second.updated, 0, "second run: {second:?}");
    assert!(second.skipped >= 1, "second run: {second:?}");
}
