use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use fithub::models::MAX_SUBSCRIPTION_DAYS;
use fithub::services::GiftCardService;
use crate::common::TestApp;

async fn first_plan(app: &TestApp) -> i64 {
    let (id,): (i64,) = sqlx::query_as("SELECT id FROM subscription_plan ORDER BY id ASC LIMIT 1")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    id
}

async fn new_code(app: &TestApp, day_count: i32) -> String {
    let plan_id = first_plan(app).await;
    let mut codes = GiftCardService::new(app.pool.clone())
        .generate(plan_id, day_count, 1)
        .await
        .unwrap();
    codes.pop().unwrap()
}

fn timestamp(value: &Value) -> DateTime<Utc> {
    value.as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_redeem_queues_behind_active_then_promotes() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, token) = app.register().await;
    let code = new_code(&app, 15).await;

    let redeemed = app
        .post("/api/gift_card/redeem", &token, json!({"code": code.to_lowercase()}))
        .await;
    assert_eq!(redeemed["code"], 200, "redeem failed: {redeemed}");
    let queued = &redeemed["data"]["subscription"];
    assert_eq!(queued["step"], 1);
    assert_eq!(queued["expect_expired_at"], Value::Null);
    let queued_id = queued["id"].as_i64().unwrap();

    sqlx::query(
        "UPDATE subscription SET expect_expired_at = NOW() - INTERVAL '1 minute' WHERE coach_id = $1 AND step = 2",
    )
    .bind(coach_id)
    .execute(&app.pool)
    .await
    .unwrap();

    let profile = app.get("/api/coach/profile", &token).await;
    let summary = &profile["data"]["subscription"];
    assert_eq!(summary["id"], queued_id);
    assert_eq!(summary["status"], 2);
    assert_eq!(summary["pending_count"], 0);

    let expected = Utc::now() + Duration::days(15);
    assert!((timestamp(&summary["expired_at"]) - expected).num_seconds().abs() < 120);
    assert!((timestamp(&summary["active_at"]) - Utc::now()).num_seconds().abs() < 120);

    let (active,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscription WHERE coach_id = $1 AND step = 2")
        .bind(coach_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn test_redeem_without_active_subscription_activates_now() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, token) = app.register().await;
    sqlx::query("UPDATE subscription SET step = 3, expired_at = NOW() WHERE coach_id = $1")
        .bind(coach_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let code = new_code(&app, 7).await;
    let redeemed = app.post("/api/gift_card/redeem", &token, json!({"code": code})).await;
    assert_eq!(redeemed["data"]["subscription"]["step"], 2);
    assert_eq!(redeemed["data"]["subscription"]["reason"], "gift-card redemption");
}

#[tokio::test]
async fn test_card_is_redeemed_at_most_once() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, first) = app.register().await;
    let (_, second) = app.register().await;
    let code = new_code(&app, 10).await;

    let (a, b) = tokio::join!(
        app.post("/api/gift_card/redeem", &first, json!({"code": code})),
        app.post("/api/gift_card/redeem", &second, json!({"code": code})),
    );
    let mut codes = vec![a["code"].as_i64().unwrap(), b["code"].as_i64().unwrap()];
    codes.sort_unstable();
    assert_eq!(codes, vec![200, 409]);

    let (status, consumer_id): (i16, Option<i64>) =
        sqlx::query_as("SELECT status, consumer_id FROM gift_card WHERE code = $1")
            .bind(&code)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(status, 1);
    assert!(consumer_id.is_some());
}

#[tokio::test]
async fn test_unknown_and_invalid_cards() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;

    let missing = app.post("/api/gift_card/redeem", &token, json!({"code": "ZZZZZZZZ"})).await;
    assert_eq!(missing["code"], 404);

    let code = new_code(&app, 10).await;
    sqlx::query("UPDATE gift_card SET status = 3 WHERE code = $1")
        .bind(&code)
        .execute(&app.pool)
        .await
        .unwrap();
    let invalid = app.post("/api/gift_card/redeem", &token, json!({"code": code})).await;
    assert_eq!(invalid["code"], 422);
}

#[tokio::test]
async fn test_generate_rejects_out_of_range_day_count() {
    let Some(app) = TestApp::spawn().await else { return };
    let plan_id = first_plan(&app).await;
    let service = GiftCardService::new(app.pool.clone());

    for day_count in [0, MAX_SUBSCRIPTION_DAYS + 1, i32::MAX] {
        let err = service.generate(plan_id, day_count, 1).await.unwrap_err();
        assert_eq!(err.code(), 400, "day_count {day_count}");
    }
}
