use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::TestApp;

async fn create_plan(app: &TestApp, token: &str) -> i64 {
    let created = app
        .post(
            "/api/workout_plan/create",
            token,
            json!({
                "title": "Leg day",
                "details": {
                    "v": 250424,
                    "steps": [{
                        "set_count": "3",
                        "set_rest_duration": "60",
                        "set_weight": 20,
                        "actions": [{"action_id": 7, "reps": 10}]
                    }]
                }
            }),
        )
        .await;
    assert_eq!(created["code"], 200, "plan create failed: {created}");
    created["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_legacy_plan_is_stored_normalized() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;
    let id = create_plan(&app, &token).await;

    let detail = app.get(&format!("/api/workout_plan/detail?id={id}"), &token).await;
    assert_eq!(detail["code"], 200);
    let details = &detail["data"]["details"];
    assert_eq!(details["v"], 250627);
    let step = &details["steps"][0];
    assert_eq!(step["step_uid"], "step-0");
    assert_eq!(step["set_count"], 3);
    assert_eq!(step["set_rest_duration"], json!({"num": 60.0, "unit": "秒"}));
    assert_eq!(step["set_weight"], json!({"num": 20.0, "unit": "公斤"}));
    assert_eq!(step["actions"][0]["action"]["id"], 7);
    assert_eq!(step["actions"][0]["reps"], json!({"num": 10.0, "unit": "次"}));

    let (stored,): (String,) = sqlx::query_as("SELECT details FROM workout_plan WHERE id = $1")
        .bind(id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert!(stored.contains("250627"));
}

#[tokio::test]
async fn test_plan_update_list_and_delete() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;
    let id = create_plan(&app, &token).await;

    let updated = app
        .post("/api/workout_plan/update", &token, json!({"id": id, "title": "Legs v2"}))
        .await;
    assert_eq!(updated["code"], 200);
    assert_eq!(updated["data"]["title"], "Legs v2");
    assert_eq!(updated["data"]["details"]["steps"].as_array().unwrap().len(), 1);

    let bad = app
        .post("/api/workout_plan/update", &token, json!({"id": id, "details": {"v": 1}}))
        .await;
    assert_eq!(bad["code"], 400);

    let listed = app.get("/api/workout_plan/list", &token).await;
    assert_eq!(listed["data"]["list"][0]["id"], id);
    assert!(listed["data"]["list"][0].get("details").is_none());

    let deleted = app.post("/api/workout_plan/delete", &token, json!({"id": id})).await;
    assert_eq!(deleted["code"], 200);
    let gone = app.get(&format!("/api/workout_plan/detail?id={id}"), &token).await;
    assert_eq!(gone["code"], 404);
}

#[tokio::test]
async fn test_plans_are_gated_by_relationship() {
    let Some(app) = TestApp::spawn().await else { return };
    let (owner_id, owner) = app.register().await;
    let id = create_plan(&app, &owner).await;

    let (_, stranger) = app.register().await;
    let denied = app.get(&format!("/api/workout_plan/detail?id={id}"), &stranger).await;
    assert_eq!(denied["code"], 401);
    let denied_list = app
        .get(&format!("/api/workout_plan/list?owner_id={owner_id}"), &stranger)
        .await;
    assert_eq!(denied_list["code"], 401);
    let denied_edit = app
        .post("/api/workout_plan/update", &stranger, json!({"id": id, "title": "mine"}))
        .await;
    assert_eq!(denied_edit["code"], 401);
}

#[tokio::test]
async fn test_schedule_apply_and_cancel() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;
    let plan_id = create_plan(&app, &token).await;

    let created = app
        .post(
            "/api/workout_schedule/create",
            &token,
            json!({
                "title": "Three-day cycle",
                "type": 2,
                "day_count": 3,
                "plans": [{"workout_plan_id": plan_id, "day": 1}, {"workout_plan_id": plan_id, "day": 3}]
            }),
        )
        .await;
    assert_eq!(created["code"], 200, "schedule create failed: {created}");
    assert_eq!(created["data"]["day_count"], 3);
    assert_eq!(created["data"]["slots"].as_array().unwrap().len(), 2);
    assert_eq!(created["data"]["slots"][0]["plan_title"], "Leg day");
    let schedule_id = created["data"]["id"].as_i64().unwrap();

    let out_of_range = app
        .post(
            "/api/workout_schedule/create",
            &token,
            json!({"title": "bad", "type": 2, "day_count": 3, "plans": [{"workout_plan_id": plan_id, "day": 4}]}),
        )
        .await;
    assert_eq!(out_of_range["code"], 400);

    let body = json!({"workout_schedule_id": schedule_id});
    let applied = app.post("/api/workout_schedule/apply", &token, body.clone()).await;
    assert_eq!(applied["code"], 200);
    assert_eq!(applied["data"]["status"], 1);

    let twice = app.post("/api/workout_schedule/apply", &token, body.clone()).await;
    assert_eq!(twice["code"], 409);

    let cancelled = app.post("/api/workout_schedule/cancel", &token, body.clone()).await;
    assert_eq!(cancelled["data"]["status"], 2);
    let cancel_again = app.post("/api/workout_schedule/cancel", &token, body.clone()).await;
    assert_eq!(cancel_again["code"], 422);

    let reapplied = app.post("/api/workout_schedule/apply", &token, body).await;
    assert_eq!(reapplied["code"], 200);
    assert_eq!(reapplied["data"]["cancelled_at"], serde_json::Value::Null);
}
