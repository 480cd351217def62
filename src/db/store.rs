use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use thiserror::Error;

use crate::services::rating::RatingModel;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("concept {0} vanished after provisioning")]
    MissingConcept(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: String,
    pub name: String,
    pub description: String,
    pub difficulty: i32,
    pub prerequisites: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConceptDraft {
    pub name: String,
    pub description: String,
    pub difficulty: i32,
    pub prerequisites: Vec<String>,
}

impl ConceptDraft {
    pub fn auto_created(tag: &str, difficulty: i32) -> Self {
        Self {
            name: tag.to_string(),
            description: format!("Auto-created concept: {tag}"),
            difficulty,
            prerequisites: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct MasteryRecord {
    pub id: String,
    pub learner_id: String,
    pub concept_id: String,
    pub mastery: f64,
    pub attempts: i64,
    pub successes: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Result of one atomic read-modify-write on a (learner, concept) record.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedAttempt {
    pub previous_mastery: f64,
    pub record: MasteryRecord,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ConceptProgress {
    pub concept: String,
    pub mastery: f64,
    pub attempts: i64,
    pub successes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub difficulty: Option<i32>,
    /// Concept name.
    pub concept: Option<String>,
    pub concept_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub difficulty: i32,
    pub concepts: Vec<String>,
    pub concept_ids: Vec<String>,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTest {
    pub id: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHint {
    pub level: i32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub prompt: String,
    pub difficulty: i32,
    pub concepts: Vec<String>,
    pub scaffold: serde_json::Value,
    pub tests: Vec<TaskTest>,
    pub hints: Vec<TaskHint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub prompt: String,
    pub difficulty: i32,
    pub scaffold: serde_json::Value,
    pub tests: Vec<TaskTest>,
    pub hints: Vec<TaskHint>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ConceptRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub difficulty: i32,
    pub prerequisites: Json<Vec<String>>,
}

impl From<ConceptRow> for Concept {
    fn from(row: ConceptRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            difficulty: row.difficulty,
            prerequisites: row.prerequisites.0,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
#[sqlx(rename_all = "camelCase")]
pub(crate) struct TaskRow {
    pub id: String,
    pub title: String,
    pub difficulty: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
#[sqlx(rename_all = "camelCase")]
pub(crate) struct TaskDetailRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub prompt: String,
    pub difficulty: i32,
    pub scaffold: Json<serde_json::Value>,
    pub tests: Json<Vec<TaskTest>>,
    pub hints: Json<Vec<TaskHint>>,
}

impl TaskDetailRow {
    pub(crate) fn into_detail(self, concepts: Vec<String>) -> TaskDetail {
        TaskDetail {
            id: self.id,
            title: self.title,
            description: self.description,
            prompt: self.prompt,
            difficulty: self.difficulty,
            concepts,
            scaffold: self.scaffold.0,
            tests: self.tests.0,
            hints: self.hints.0,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
#[sqlx(rename_all = "camelCase")]
pub(crate) struct TaskConceptRow {
    pub task_id: String,
    pub concept_id: String,
    pub name: String,
}

/// Attaches concept names and ids to task rows, preserving row order.
pub(crate) fn assemble_summaries(
    rows: Vec<TaskRow>,
    links: Vec<TaskConceptRow>,
) -> Vec<TaskSummary> {
    rows.into_iter()
        .map(|row| {
            let (concepts, concept_ids) = links
                .iter()
                .filter(|link| link.task_id == row.id)
                .map(|link| (link.name.clone(), link.concept_id.clone()))
                .unzip();
            TaskSummary {
                id: row.id,
                title: row.title,
                difficulty: row.difficulty,
                concepts,
                concept_ids,
                created_at: row.created_at,
            }
        })
        .collect()
}

/// Per-learner mastery persistence.
///
/// Implementations must make [`MasteryStore::apply_attempt`] linearizable per
/// (learner, concept) pair: the read of the current score, the rating update and
/// the write-back happen under one write lock, and either all of it commits or
/// none of it does.
#[async_trait]
pub trait MasteryStore: Send + Sync {
    /// Idempotent find-or-create keyed on the concept name.
    async fn find_or_create_concept(&self, draft: &ConceptDraft) -> Result<Concept, StoreError>;

    async fn find_concept(&self, name: &str) -> Result<Option<Concept>, StoreError>;

    async fn find_mastery(
        &self,
        learner_id: &str,
        concept_id: &str,
    ) -> Result<Option<MasteryRecord>, StoreError>;

    async fn apply_attempt(
        &self,
        learner_id: &str,
        concept_id: &str,
        success: bool,
        model: &RatingModel,
    ) -> Result<AppliedAttempt, StoreError>;

    /// All of a learner's records joined with concept names, highest mastery first.
    async fn list_progress(&self, learner_id: &str) -> Result<Vec<ConceptProgress>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Read side of the task catalog plus the completion ledger the selector needs.
#[async_trait]
pub trait TaskCatalog: Send + Sync {
    /// Ordered by difficulty, then creation order.
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskSummary>, StoreError>;

    async fn get_task(&self, id: &str) -> Result<Option<TaskDetail>, StoreError>;

    async fn upsert_task(&self, draft: &TaskDraft, concept_ids: &[String])
        -> Result<(), StoreError>;

    async fn passed_task_ids(&self, learner_id: &str) -> Result<HashSet<String>, StoreError>;

    async fn record_task_pass(&self, learner_id: &str, task_id: &str) -> Result<(), StoreError>;
}
