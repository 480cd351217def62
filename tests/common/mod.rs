#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use mastery_backend::db::config::DbConfig;
use mastery_backend::db::store::{
    AppliedAttempt, Concept, ConceptDraft, ConceptProgress, MasteryRecord, TaskDraft, TaskTest,
};
use mastery_backend::db::{DatabaseProxy, MasteryStore, StoreError};
use mastery_backend::seed::seed_demo_catalog;
use mastery_backend::services::evaluation::EvaluationConfig;
use mastery_backend::services::rating::RatingModel;
use mastery_backend::services::task_selector::SelectorConfig;
use mastery_backend::state::AppState;

/// A migrated SQLite database in a temp dir. The dir lives as long as the context.
pub struct TestContext {
    pub dir: TempDir,
    pub db: DatabaseProxy,
    pub state: AppState,
}

impl TestContext {
    pub fn app(&self) -> Router {
        mastery_backend::create_app(self.state.clone())
    }
}

pub async fn setup() -> TestContext {
    setup_with_eval(EvaluationConfig::default()).await
}

pub async fn setup_with_eval(evaluation: EvaluationConfig) -> TestContext {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite:{}", dir.path().join("mastery.db").display());
    let mut config = DbConfig::from_url(url).expect("sqlite url");
    config.sqlite_busy_timeout = Duration::from_secs(30);

    let db = DatabaseProxy::connect(&config).await.expect("connect sqlite");
    let state = AppState::from_proxy(
        &db,
        RatingModel::default(),
        SelectorConfig::default(),
        evaluation,
    );
    TestContext { dir, db, state }
}

/// Delegates to a real store but fails every `apply_attempt` on one concept.
pub struct BrokenConceptStore {
    inner: Arc<dyn MasteryStore>,
    broken_concept_id: String,
}

#[async_trait]
impl MasteryStore for BrokenConceptStore {
    async fn find_or_create_concept(&self, draft: &ConceptDraft) -> Result<Concept, StoreError> {
        self.inner.find_or_create_concept(draft).await
    }

    async fn find_concept(&self, name: &str) -> Result<Option<Concept>, StoreError> {
        self.inner.find_concept(name).await
    }

    async fn find_mastery(
        &self,
        learner_id: &str,
        concept_id: &str,
    ) -> Result<Option<MasteryRecord>, StoreError> {
        self.inner.find_mastery(learner_id, concept_id).await
    }

    async fn apply_attempt(
        &self,
        learner_id: &str,
        concept_id: &str,
        success: bool,
        model: &RatingModel,
    ) -> Result<AppliedAttempt, StoreError> {
        if concept_id == self.broken_concept_id {
            return Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        self.inner
            .apply_attempt(learner_id, concept_id, success, model)
            .await
    }

    async fn list_progress(&self, learner_id: &str) -> Result<Vec<ConceptProgress>, StoreError> {
        self.inner.list_progress(learner_id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// A second state over the same database whose updates to `concept` always fail.
pub async fn state_with_broken_concept(ctx: &TestContext, concept: &str) -> AppState {
    let broken = ctx
        .state
        .mastery()
        .resolver()
        .resolve(concept)
        .await
        .expect("resolve concept");
    let store = Arc::new(BrokenConceptStore {
        inner: Arc::clone(ctx.state.store()),
        broken_concept_id: broken.id,
    });
    AppState::new(
        store,
        Arc::clone(ctx.state.catalog()),
        RatingModel::default(),
        SelectorConfig::default(),
        EvaluationConfig::default(),
    )
}

pub async fn seeded() -> TestContext {
    let ctx = setup().await;
    seed_demo_catalog(ctx.state.mastery().resolver(), ctx.state.catalog().as_ref())
        .await
        .expect("seed demo catalog");
    ctx
}

/// Inserts a task tagged with `concepts`; `order` fixes its creation time.
pub async fn add_task(ctx: &TestContext, id: &str, difficulty: i32, order: i64, concepts: &[&str]) {
    let mut concept_ids = Vec::new();
    for name in concepts {
        let concept = ctx
            .state
            .mastery()
            .resolver()
            .resolve(name)
            .await
            .expect("resolve concept");
        concept_ids.push(concept.id);
    }

    let draft = TaskDraft {
        id: id.to_string(),
        title: format!("Task {id}"),
        description: None,
        prompt: format!("Solve {id}"),
        difficulty,
        scaffold: serde_json::json!({ "index.html": "" }),
        tests: vec![TaskTest {
            id: "t1".into(),
            code: "true".into(),
            description: None,
        }],
        hints: Vec::new(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(order),
    };
    ctx.state
        .catalog()
        .upsert_task(&draft, &concept_ids)
        .await
        .expect("upsert task");
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
