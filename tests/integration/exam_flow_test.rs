use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::TestApp;

async fn create_quiz(app: &TestApp, token: &str, quiz_type: i64, answer: Value) -> i64 {
    let created = app
        .post(
            "/api/exam/quiz/create",
            token,
            json!({"type": quiz_type, "title": "Which muscles does a squat train?", "content": {"options": ["a", "b", "c"]}, "answer": answer}),
        )
        .await;
    assert_eq!(created["code"], 200, "quiz create failed: {created}");
    assert!(created["data"].get("answer").is_none(), "answers are never returned");
    created["data"]["id"].as_i64().unwrap()
}

async fn create_paper(app: &TestApp, token: &str, quiz_list: Value, pass_score: i64) -> Value {
    let created = app
        .post(
            "/api/exam/paper/create",
            token,
            json!({"name": "Basics", "pass_score": pass_score, "quiz_list": quiz_list}),
        )
        .await;
    assert_eq!(created["code"], 200, "paper create failed: {created}");
    created["data"].clone()
}

#[tokio::test]
async fn test_multi_choice_exam_passes() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;
    let quiz_id = create_quiz(&app, &token, 2, json!({"value": [1, 3]})).await;
    let paper = create_paper(&app, &token, json!([{"quiz_id": quiz_id, "score": 5}]), 5).await;
    assert_eq!(paper["quiz_count"], 1);
    let paper_id = paper["id"].as_i64().unwrap();

    let started = app.post("/api/exam/start", &token, json!({"paper_id": paper_id})).await;
    assert_eq!(started["code"], 200, "start failed: {started}");
    assert_eq!(started["data"]["status"], 2);
    assert_eq!(started["data"]["answers"].as_array().unwrap().len(), 1);
    assert_eq!(started["data"]["answers"][0]["status"], 0);
    let exam_id = started["data"]["id"].as_i64().unwrap();

    let submitted = app
        .post(
            "/api/exam/submit_answer",
            &token,
            json!({"exam_id": exam_id, "quiz_id": quiz_id, "content": {"choices": [3, 1]}}),
        )
        .await;
    assert_eq!(submitted["code"], 200, "submit failed: {submitted}");
    assert_eq!(submitted["data"]["status"], 1);
    assert_eq!(submitted["data"]["score"], 5);

    let finished = app.post("/api/exam/finish", &token, json!({"exam_id": exam_id})).await;
    assert_eq!(finished["code"], 200, "finish failed: {finished}");
    assert_eq!(finished["data"]["status"], 3);
    assert_eq!(finished["data"]["score"], 5);
    assert_eq!(finished["data"]["pass"], 1);

    let late = app
        .post(
            "/api/exam/submit_answer",
            &token,
            json!({"exam_id": exam_id, "quiz_id": quiz_id, "content": {"choices": [1]}}),
        )
        .await;
    assert_eq!(late["code"], 422);

    let detail = app.get(&format!("/api/exam/detail?exam_id={exam_id}"), &token).await;
    assert_eq!(detail["data"]["answers"][0]["score"], 5);
}

#[tokio::test]
async fn test_wrong_answers_fail_and_open_questions_stay_ungraded() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;
    let choice = create_quiz(&app, &token, 1, json!({"value": [2]})).await;
    let open = create_quiz(&app, &token, 5, json!("free text")).await;
    let paper = create_paper(
        &app,
        &token,
        json!([{"quiz_id": choice, "score": 4}, {"quiz_id": open, "score": 6}]),
        4,
    )
    .await;

    let started = app.post("/api/exam/start", &token, json!({"paper_id": paper["id"]})).await;
    let exam_id = started["data"]["id"].as_i64().unwrap();

    let wrong = app
        .post(
            "/api/exam/submit_answer",
            &token,
            json!({"exam_id": exam_id, "quiz_id": choice, "content": {"choices": [1]}}),
        )
        .await;
    assert_eq!(wrong["data"]["status"], 2);
    assert_eq!(wrong["data"]["score"], 0);

    let essay = app
        .post(
            "/api/exam/submit_answer",
            &token,
            json!({"exam_id": exam_id, "quiz_id": open, "content": "my answer"}),
        )
        .await;
    assert_eq!(essay["data"]["status"], 0);
    assert_eq!(essay["data"]["answer"], "my answer");

    let finished = app.post("/api/exam/finish", &token, json!({"exam_id": exam_id})).await;
    assert_eq!(finished["data"]["score"], 0);
    assert_eq!(finished["data"]["pass"], 0);
}

#[tokio::test]
async fn test_paper_update_reconciles_links() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, token) = app.register().await;
    let q1 = create_quiz(&app, &token, 3, json!("true")).await;
    let q2 = create_quiz(&app, &token, 3, json!("false")).await;
    let q3 = create_quiz(&app, &token, 3, json!("true")).await;
    let paper = create_paper(&app, &token, json!([{"quiz_id": q1, "score": 1}, {"quiz_id": q2, "score": 1}]), 1).await;
    let paper_id = paper["id"].as_i64().unwrap();
    let keep = paper["quiz_list"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["quiz_id"] == q1)
        .unwrap()["relation_id"]
        .as_i64()
        .unwrap();

    let updated = app
        .post(
            "/api/exam/paper/update",
            &token,
            json!({
                "id": paper_id,
                "pass_score": 3,
                "quiz_list": [
                    {"relation_id": keep, "quiz_id": q1, "score": 2, "sort_idx": 1},
                    {"quiz_id": q3, "score": 3, "sort_idx": 0}
                ]
            }),
        )
        .await;
    assert_eq!(updated["code"], 200, "update failed: {updated}");
    assert_eq!(updated["data"]["quiz_count"], 2);
    assert_eq!(updated["data"]["pass_score"], 3);

    let items = updated["data"]["quiz_list"].as_array().unwrap();
    let quiz_ids: Vec<i64> = items.iter().map(|item| item["quiz_id"].as_i64().unwrap()).collect();
    assert_eq!(quiz_ids, vec![q3, q1]);
    assert_eq!(items[1]["relation_id"], keep);
    assert_eq!(items[1]["score"], 2);

    let foreign = app
        .post(
            "/api/exam/paper/update",
            &token,
            json!({"id": paper_id, "quiz_list": [{"relation_id": 999_999_999, "quiz_id": q1, "score": 1}]}),
        )
        .await;
    assert_eq!(foreign["code"], 400);

    let (_, stranger) = app.register().await;
    let denied = app
        .post("/api/exam/paper/update", &stranger, json!({"id": paper_id, "quiz_list": []}))
        .await;
    assert_eq!(denied["code"], 401);

    let detail = app.get(&format!("/api/exam/paper/detail?paper_id={paper_id}"), &stranger).await;
    assert_eq!(detail["data"]["quiz_count"], 2);
}

#[tokio::test]
async fn test_give_up_and_visibility() {
    let Some(app) = TestApp::spawn().await else { return };
    let (_, author) = app.register().await;
    let quiz_id = create_quiz(&app, &author, 3, json!("true")).await;
    let paper = create_paper(&app, &author, json!([{"quiz_id": quiz_id, "score": 1}]), 1).await;

    let (_, student) = app.register().await;
    let started = app.post("/api/exam/start", &student, json!({"paper_id": paper["id"]})).await;
    let exam_id = started["data"]["id"].as_i64().unwrap();

    let gave_up = app.post("/api/exam/give_up", &student, json!({"exam_id": exam_id})).await;
    assert_eq!(gave_up["data"]["status"], 4);
    assert!(gave_up["data"]["give_up_at"].is_string());

    let again = app.post("/api/exam/finish", &student, json!({"exam_id": exam_id})).await;
    assert_eq!(again["code"], 422);

    let by_author = app.get(&format!("/api/exam/detail?exam_id={exam_id}"), &author).await;
    assert_eq!(by_author["code"], 200);

    let (_, stranger) = app.register().await;
    let denied = app.get(&format!("/api/exam/detail?exam_id={exam_id}"), &stranger).await;
    assert_eq!(denied["code"], 401);

    let missing = app.post("/api/exam/start", &student, json!({"paper_id": 999_999_999})).await;
    assert_eq!(missing["code"], 404);
}
