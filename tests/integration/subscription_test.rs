use pretty_assertions::assert_eq;
use serde_json::json;

use fithub::services::GiftCardService;
use crate::common::TestApp;

async fn plan_id(app: &TestApp) -> i64 {
    let (id,): (i64,) = sqlx::query_as("SELECT id FROM subscription_plan ORDER BY id ASC LIMIT 1")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    id
}

async fn redeem_fresh_card(app: &TestApp, token: &str, day_count: i32) {
    let codes = GiftCardService::new(app.pool.clone())
        .generate(plan_id(app).await, day_count, 1)
        .await
        .unwrap();
    let redeemed = app.post("/api/gift_card/redeem", token, json!({"code": codes[0]})).await;
    assert_eq!(redeemed["code"], 200, "redeem failed: {redeemed}");
}

async fn active_count(app: &TestApp, coach_id: i64) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscription WHERE coach_id = $1 AND step = 2")
        .bind(coach_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    count
}

#[tokio::test]
async fn test_calc_applies_best_tier() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;

    let year = app.post("/api/subscription/calc", &token, json!({"type": "year"})).await;
    assert_eq!(year["code"], 200, "calc failed: {year}");
    assert_eq!(year["data"]["count"], 360);
    assert_eq!(year["data"]["total_amount"], 3600);
    assert_eq!(year["data"]["amount"], 2880);
    assert_eq!(year["data"]["discount"], 720);
    assert_eq!(year["data"]["human_text"], "购买1.0年共计288.00元");

    let month = app.post("/api/subscription/calc", &token, json!({"type": "month"})).await;
    assert_eq!(month["data"]["amount"], 300);
    assert_eq!(month["data"]["discount_text"], "");
    assert_eq!(month["data"]["human_text"], "购买1个月共计30.00元");

    let season = app.post("/api/subscription/calc", &token, json!({"type": "season"})).await;
    assert_eq!(season["data"]["amount"], 1080);
    assert_eq!(season["data"]["human_text"], "购买4个月共计108.00元");
}

#[tokio::test]
async fn test_calc_rejects_unknown_period() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;

    let response = app.post("/api/subscription/calc", &token, json!({"type": "decade"})).await;
    assert_eq!(response["code"], 400);
}

#[tokio::test]
async fn test_queue_keeps_single_active_subscription() {
    let Some(app) = TestApp::spawn().await else { return };
    let (coach_id, token) = app.register().await;
    for days in [5, 6, 7] {
        redeem_fresh_card(&app, &token, days).await;
    }
    assert_eq!(active_count(&app, coach_id).await, 1);

    for _ in 0..4 {
        sqlx::query(
            "UPDATE subscription SET expect_expired_at = NOW() - INTERVAL '1 second' WHERE coach_id = $1 AND step = 2",
        )
        .bind(coach_id)
        .execute(&app.pool)
        .await
        .unwrap();
        let profile = app.get("/api/coach/profile", &token).await;
        assert_eq!(profile["code"], 200);
        assert!(active_count(&app, coach_id).await <= 1);
    }

    // Signup grant and all three cards have now run out.
    let profile = app.get("/api/coach/profile", &token).await;
    assert!(profile["data"]["subscription"].is_null());
    assert_eq!(active_count(&app, coach_id).await, 0);
}

#[tokio::test]
async fn test_list_pages_by_marker() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;
    for days in [5, 6, 7] {
        redeem_fresh_card(&app, &token, days).await;
    }

    let first = app.get("/api/subscription/list?page_size=2", &token).await;
    assert_eq!(first["code"], 200);
    assert_eq!(first["data"]["list"].as_array().unwrap().len(), 2);
    assert_eq!(first["data"]["has_more"], true);
    let marker = first["data"]["next_marker"].as_str().unwrap().to_string();
    assert_eq!(marker, first["data"]["list"][1]["id"].to_string());

    let second = app
        .get(&format!("/api/subscription/list?page_size=2&next_marker={marker}"), &token)
        .await;
    let rest = second["data"]["list"].as_array().unwrap();
    assert_eq!(rest.len(), 2);
    assert_eq!(second["data"]["has_more"], false);
    assert!(rest[0]["id"].as_i64().unwrap() < marker.parse::<i64>().unwrap());

    let bad = app.get("/api/subscription/list?order_by=created_at", &token).await;
    assert_eq!(bad["code"], 400);
}
