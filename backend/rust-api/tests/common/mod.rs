#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use learngrove_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::{
        progress::ExpAward, AttemptRecord, Part, RecordKey, RecordLevel, UserAccount,
    },
    services::{
        award_observer::{AwardNotifier, AwardObserver},
        AppState,
    },
    store::{CatalogSeed, LedgerTransaction, MemoryProgressStore, ProgressStore, StoreError},
};

pub const TEST_JWT_SECRET: &str = "test-secret";

pub struct TestApp {
    pub router: Router,
    pub store: MemoryProgressStore,
    pub awards: Arc<RecordingObserver>,
}

/// Router over an in-memory store seeded with two parts:
/// `p-basics` (bonus 50): `e-mc` multiple choice worth 10, `e-fill` fill blank worth 20.
/// `p-code` (bonus 40): `e-code` code test worth 15, `e-lit` default type worth 5.
pub async fn create_test_app() -> TestApp {
    init_tracing();

    let store = MemoryProgressStore::from_seed(catalog());
    let awards = Arc::new(RecordingObserver::default());
    let notifier = AwardNotifier::new().with_observer(awards.clone());

    let state = AppState::with_store(
        Config::for_memory(TEST_JWT_SECRET),
        Arc::new(store.clone()),
        None,
        notifier,
    );

    TestApp {
        router: create_router(Arc::new(state)),
        store,
        awards,
    }
}

/// Router whose store fails every call.
pub fn create_failing_app() -> Router {
    init_tracing();
    let state = AppState::with_store(
        Config::for_memory(TEST_JWT_SECRET),
        Arc::new(FailingStore),
        None,
        AwardNotifier::new(),
    );
    create_router(Arc::new(state))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn catalog() -> CatalogSeed {
    serde_json::from_value(json!({
        "parts": [
            { "_id": "p-basics", "section_id": "s-rust", "title": "Basics", "exp_reward": 50 },
            { "_id": "p-code", "section_id": "s-rust", "title": "Code", "exp_reward": 40 },
            { "_id": "p-empty", "section_id": "s-rust", "title": "Coming soon", "exp_reward": 99 }
        ],
        "exercises": [
            {
                "_id": "e-mc",
                "part_id": "p-basics",
                "type": "multiple_choice",
                "exp_reward": 10,
                "solution": {
                    "correct_answer": 2,
                    "options": [
                        { "id": 1, "text": "var" },
                        { "id": 2, "text": "let" },
                        { "id": 3, "text": "const" }
                    ]
                }
            },
            {
                "_id": "e-fill",
                "part_id": "p-basics",
                "type": "fill_blank",
                "exp_reward": 20,
                "solution": { "expected_answers": ["fn", "main"] }
            },
            {
                "_id": "e-code",
                "part_id": "p-code",
                "type": "code_test",
                "exp_reward": 15,
                "solution": { "expected_output": "Hello, world!" }
            },
            {
                "_id": "e-lit",
                "part_id": "p-code",
                "type": "short_answer",
                "exp_reward": 5,
                "solution": { "correct_answer": "cargo" }
            }
        ]
    }))
    .expect("valid test catalog")
}

impl TestApp {
    /// Registers a fresh learner and returns (user_id, bearer token).
    pub async fn learner(&self) -> (String, String) {
        self.learner_with_exp(0).await
    }

    pub async fn learner_with_exp(&self, total_exp: i64) -> (String, String) {
        let user_id = format!("test-user-{}", Uuid::new_v4());
        let mut account = UserAccount::new(user_id.clone(), "Test Learner");
        account.total_exp = total_exp;
        self.store.insert_user(account).await;
        let token = token_for(&user_id);
        (user_id, token)
    }

    pub async fn total_exp(&self, user_id: &str) -> i64 {
        self.store
            .find_account(user_id)
            .await
            .unwrap()
            .map(|account| account.total_exp)
            .unwrap_or_default()
    }

    pub async fn record(&self, user_id: &str, exercise_id: &str) -> Option<AttemptRecord> {
        self.store
            .find_record(&RecordKey::exercise(user_id, exercise_id))
            .await
            .unwrap()
    }

    pub async fn completed_parts(&self, user_id: &str) -> u64 {
        self.store
            .count_completed(user_id, RecordLevel::Part, None)
            .await
            .unwrap()
    }

    pub async fn submit(&self, token: &str, exercise_id: &str, answer: Value) -> (StatusCode, Value) {
        send(
            &self.router,
            Request::builder()
                .method("POST")
                .uri("/api/v1/progress/exercises")
                .header("content-type", "application/json")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::from(
                    serde_json::to_string(&json!({
                        "exercise_id": exercise_id,
                        "user_answer": answer
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        get(&self.router, uri, token).await
    }
}

pub fn token_for(user_id: &str) -> String {
    JwtService::new(TEST_JWT_SECRET)
        .generate_token(&JwtClaims::for_user(user_id, "learner", 3600))
        .unwrap()
}

pub async fn get(router: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    send(router, builder.body(Body::empty()).unwrap()).await
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&body).into_owned())
        })
    };
    (status, json)
}

#[derive(Default)]
pub struct RecordingObserver {
    awards: Mutex<Vec<ExpAward>>,
}

impl RecordingObserver {
    pub fn awards_for(&self, user_id: &str) -> Vec<ExpAward> {
        self.awards
            .lock()
            .unwrap()
            .iter()
            .filter(|award| award.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AwardObserver for RecordingObserver {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn on_award(&self, award: &ExpAward) -> anyhow::Result<()> {
        self.awards.lock().unwrap().push(award.clone());
        Ok(())
    }
}

pub struct FailingStore;

fn offline() -> StoreError {
    StoreError::Unavailable("test store offline".to_string())
}

#[async_trait]
impl ProgressStore for FailingStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        Err(offline())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(offline())
    }

    async fn find_part(&self, _part_id: &str) -> Result<Option<Part>, StoreError> {
        Err(offline())
    }

    async fn count_active_exercises(&self, _part_id: &str) -> Result<u64, StoreError> {
        Err(offline())
    }

    async fn find_account(&self, _user_id: &str) -> Result<Option<UserAccount>, StoreError> {
        Err(offline())
    }

    async fn find_record(&self, _key: &RecordKey) -> Result<Option<AttemptRecord>, StoreError> {
        Err(offline())
    }

    async fn count_completed(
        &self,
        _user_id: &str,
        _level: RecordLevel,
        _part_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        Err(offline())
    }

    async fn top_accounts(&self, _limit: usize) -> Result<Vec<UserAccount>, StoreError> {
        Err(offline())
    }
}
