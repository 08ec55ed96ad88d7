use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tower::ServiceExt;
use uuid::Uuid;

use fithub::api::create_routes;
use fithub::config::{run_migrations, AppConfig, CatalogSeeder};

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_only";

/// A migrated, seeded database plus the router built on top of it.
pub struct TestApp {
    pub pool: PgPool,
    pub router: Router,
    pub config: Arc<AppConfig>,
}

impl TestApp {
    /// Connects to `TEST_DATABASE_URL`. Returns `None` (and the calling test
    /// passes vacuously) when the variable is unset or the database is down.
    pub async fn spawn() -> Option<TestApp> {
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_DATABASE_URL not set; skipping database test");
                return None;
            }
        };

        let pool = match PgPoolOptions::new().max_connections(10).connect(&url).await {
            Ok(pool) => pool,
            Err(err) => {
                eprintln!("test database unreachable ({err}); skipping");
                return None;
            }
        };

        run_migrations(&pool).await.expect("migrations apply");
        CatalogSeeder::new(pool.clone())
            .seed_pricing("standard", 10)
            .await
            .expect("catalog seeds");

        let config = Arc::new(AppConfig::for_testing(TEST_JWT_SECRET));
        let router = create_routes(pool.clone(), config.clone()).expect("router builds");
        Some(TestApp { pool, router, config })
    }

    /// Sends one request and returns the decoded envelope.
    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Value {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = builder
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), 200, "application outcomes use HTTP 200");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Value {
        self.call(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> Value {
        self.call(Method::GET, uri, Some(token), None).await
    }

    /// Registers a fresh account and returns `(coach_id, token)`.
    pub async fn register(&self) -> (i64, String) {
        let response = self
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({"email": unique_email(), "password": "x"})),
            )
            .await;
        assert_eq!(response["code"], 200, "register failed: {response}");
        let coach_id = response["data"]["coach_id"].as_i64().unwrap();
        let token = response["data"]["token"].as_str().unwrap().to_string();
        (coach_id, token)
    }

    /// Creates a student of `token`'s coach and returns the student id.
    pub async fn create_student(&self, token: &str) -> i64 {
        let response = self.post("/api/coach/students", token, json!({"nickname": "student"})).await;
        assert_eq!(response["code"], 200, "create student failed: {response}");
        response["data"]["student_id"].as_i64().unwrap()
    }

    /// Live and retired history row counts of a workout day.
    pub async fn history_counts(&self, workout_day_id: i64) -> (i64, i64) {
        let (live, retired): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FILTER (WHERE COALESCE(d, 0) = 0), COUNT(*) FILTER (WHERE d = 1)
            FROM workout_action_history WHERE workout_day_id = $1
            "#,
        )
        .bind(workout_day_id)
        .fetch_one(&self.pool)
        .await
        .unwrap();
        (live, retired)
    }
}

pub fn unique_email() -> String {
    format!("{}@b", Uuid::new_v4().simple())
}

/// A 250627 progress document whose single set holds the given
/// `(reps, weight, weight_unit, completed)` actions.
pub fn progress(actions: &[(i64, &str, &str, bool)]) -> Value {
    let actions: Vec<Value> = actions
        .iter()
        .enumerate()
        .map(|(i, (reps, weight, unit, completed))| {
            json!({
                "act_uid": format!("a{i}"),
                "action": {"id": 7, "zh_name": "深蹲"},
                "reps": reps,
                "reps_unit": "次",
                "weight": weight,
                "weight_unit": unit,
                "completed": completed,
                "completed_at": 1751000000 + i as i64
            })
        })
        .collect();

    json!({
        "v": 250627,
        "steps": [{
            "step_uid": "s1",
            "set_type": 1,
            "set_count": 1,
            "set_rest_duration": {"num": 60, "unit": "秒"},
            "set_weight": {"num": 20, "unit": "公斤"},
            "actions": [{"action": {"id": 7, "zh_name": "深蹲"}, "reps": {"num": 10, "unit": "次"}}]
        }],
        "sets": [{"step_uid": "s1", "set_uid": "s1-a", "actions": actions}]
    })
}
