use std::str::FromStr;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::store::{ConceptProgress, MasteryStore, StoreError, TaskCatalog};
use crate::services::concepts::{ConceptResolver, ResolveError};
use crate::services::rating::RatingModel;

const RETRY_MESSAGE: &str = "temporarily unavailable, please try again";

#[derive(Debug, Error)]
pub enum MasteryError {
    #[error("learnerId is required")]
    MissingLearnerId,
    #[error("tags must be a non-empty array of concept names")]
    EmptyTags,
    #[error("tags[{index}] must be a non-empty string")]
    BlankTag { index: usize },
    #[error("result must be \"pass\" or \"fail\"")]
    InvalidResult,
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MasteryError {
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::MissingLearnerId | Self::EmptyTags | Self::BlankTag { .. } | Self::InvalidResult
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptResult {
    Pass,
    Fail,
}

impl AttemptResult {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

impl FromStr for AttemptResult {
    type Err = MasteryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            _ => Err(MasteryError::InvalidResult),
        }
    }
}

/// A validated pass/fail observation, consumed once by [`MasteryService::apply_outcome`].
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub learner_id: String,
    pub tags: Vec<String>,
    pub result: AttemptResult,
    pub task_id: Option<String>,
}

impl AttemptOutcome {
    /// Validates raw caller input. Tags are trimmed and de-duplicated in first-seen order.
    pub fn parse(
        learner_id: Option<&str>,
        tags: Option<&[String]>,
        result: Option<&str>,
        task_id: Option<&str>,
    ) -> Result<Self, MasteryError> {
        let learner_id = required_learner_id(learner_id)?;

        let raw_tags = tags.filter(|tags| !tags.is_empty()).ok_or(MasteryError::EmptyTags)?;
        let mut tags: Vec<String> = Vec::with_capacity(raw_tags.len());
        for (index, tag) in raw_tags.iter().enumerate() {
            let tag = tag.trim();
            if tag.is_empty() {
                return Err(MasteryError::BlankTag { index });
            }
            if !tags.iter().any(|seen| seen == tag) {
                tags.push(tag.to_string());
            }
        }

        let result = result
            .ok_or(MasteryError::InvalidResult)?
            .parse::<AttemptResult>()?;

        let task_id = task_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Ok(Self {
            learner_id,
            tags,
            result,
            task_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptUpdate {
    pub concept: String,
    pub old_mastery: f64,
    pub new_mastery: f64,
    pub change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagFailure {
    pub concept: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MasteryUpdateReport {
    pub updates: Vec<ConceptUpdate>,
    pub failed: Vec<TagFailure>,
}

impl MasteryUpdateReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub concept: String,
    pub mastery: f64,
    pub attempts: i64,
    pub successes: i64,
    pub success_rate: String,
}

impl From<ConceptProgress> for ProgressEntry {
    fn from(progress: ConceptProgress) -> Self {
        Self {
            success_rate: format_success_rate(progress.successes, progress.attempts),
            concept: progress.concept,
            mastery: progress.mastery,
            attempts: progress.attempts,
            successes: progress.successes,
        }
    }
}

/// Orchestrates rating updates across every concept an attempt exercised.
#[derive(Clone)]
pub struct MasteryService {
    store: Arc<dyn MasteryStore>,
    catalog: Arc<dyn TaskCatalog>,
    resolver: ConceptResolver,
    model: RatingModel,
}

impl MasteryService {
    pub fn new(
        store: Arc<dyn MasteryStore>,
        catalog: Arc<dyn TaskCatalog>,
        model: RatingModel,
    ) -> Self {
        let resolver = ConceptResolver::new(Arc::clone(&store), model.default_concept_difficulty());
        Self {
            store,
            catalog,
            resolver,
            model,
        }
    }

    pub fn resolver(&self) -> &ConceptResolver {
        &self.resolver
    }

    /// Applies one outcome to each tag independently. Tags that fail are reported
    /// in [`MasteryUpdateReport::failed`]; tags already committed stay committed.
    ///
    /// A passed `task_id` is recorded as completed only once every tag committed.
    pub async fn apply_outcome(
        &self,
        outcome: &AttemptOutcome,
    ) -> Result<MasteryUpdateReport, MasteryError> {
        if let Some(task_id) = outcome.task_id.as_deref() {
            if self.catalog.get_task(task_id).await?.is_none() {
                return Err(MasteryError::TaskNotFound(task_id.to_string()));
            }
        }

        let success = outcome.result.is_success();
        let results = join_all(
            outcome
                .tags
                .iter()
                .map(|tag| self.apply_tag(&outcome.learner_id, tag, success)),
        )
        .await;

        let mut report = MasteryUpdateReport::default();
        for (tag, result) in outcome.tags.iter().zip(results) {
            match result {
                Ok(update) => report.updates.push(update),
                Err(err) => {
                    tracing::warn!(
                        learner_id = %outcome.learner_id,
                        concept = %tag,
                        error = %err,
                        "mastery update failed"
                    );
                    report.failed.push(TagFailure {
                        concept: tag.clone(),
                        error: RETRY_MESSAGE.to_string(),
                    });
                }
            }
        }

        if let Some(task_id) = outcome.task_id.as_deref() {
            if outcome.result.is_success() && report.is_complete() {
                self.catalog
                    .record_task_pass(&outcome.learner_id, task_id)
                    .await?;
            }
        }

        tracing::info!(
            learner_id = %outcome.learner_id,
            result = outcome.result.as_str(),
            updated = report.updates.len(),
            failed = report.failed.len(),
            "attempt outcome applied"
        );

        Ok(report)
    }

    async fn apply_tag(
        &self,
        learner_id: &str,
        tag: &str,
        success: bool,
    ) -> Result<ConceptUpdate, ResolveError> {
        let concept = self.resolver.resolve(tag).await?;
        let applied = self
            .store
            .apply_attempt(learner_id, &concept.id, success, &self.model)
            .await?;

        let new_mastery = applied.record.mastery;
        tracing::debug!(
            learner_id,
            concept = tag,
            old = applied.previous_mastery,
            new = new_mastery,
            attempts = applied.record.attempts,
            "mastery record updated"
        );

        Ok(ConceptUpdate {
            concept: tag.to_string(),
            old_mastery: applied.previous_mastery,
            new_mastery,
            change: new_mastery - applied.previous_mastery,
        })
    }

    pub async fn progress(&self, learner_id: Option<&str>) -> Result<Vec<ProgressEntry>, MasteryError> {
        let learner_id = required_learner_id(learner_id)?;
        let rows = self.store.list_progress(&learner_id).await?;
        Ok(rows.into_iter().map(ProgressEntry::from).collect())
    }
}

fn required_learner_id(learner_id: Option<&str>) -> Result<String, MasteryError> {
    learner_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(MasteryError::MissingLearnerId)
}

/// Percentage with one decimal, halves rounded up.
pub fn format_success_rate(successes: i64, attempts: i64) -> String {
    if attempts <= 0 {
        return "0.0".to_string();
    }
    // tenths of a percent: round(successes * 1000 / attempts), half up
    let tenths = (successes * 2000 + attempts) / (attempts * 2);
    format!("{}.{}", tenths / 10, tenths % 10)
}
