use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::store::{MasteryStore, StoreError, TaskCatalog, TaskDetail, TaskFilter, TaskSummary};
use crate::services::rating::RatingModel;

const DEFAULT_TARGET_OFFSET: f64 = 0.5;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("learnerId is required")]
    MissingLearnerId,
    #[error("strategy must be one of \"just-right\", \"sequential\"")]
    UnknownStrategy,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SelectionError {
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::MissingLearnerId | Self::UnknownStrategy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    JustRight,
    Sequential,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JustRight => "just-right",
            Self::Sequential => "sequential",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = SelectionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "just-right" => Ok(Self::JustRight),
            "sequential" => Ok(Self::Sequential),
            _ => Err(SelectionError::UnknownStrategy),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorConfig {
    /// How far above current ability, in difficulty tiers, the ideal task sits.
    pub target_offset: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            target_offset: DEFAULT_TARGET_OFFSET,
        }
    }
}

impl SelectorConfig {
    pub fn from_env() -> Self {
        let target_offset = std::env::var("SELECTOR_TARGET_OFFSET")
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(DEFAULT_TARGET_OFFSET);
        Self { target_offset }
    }
}

#[derive(Clone)]
pub struct TaskSelector {
    store: Arc<dyn MasteryStore>,
    catalog: Arc<dyn TaskCatalog>,
    model: RatingModel,
    config: SelectorConfig,
}

impl TaskSelector {
    pub fn new(
        store: Arc<dyn MasteryStore>,
        catalog: Arc<dyn TaskCatalog>,
        model: RatingModel,
        config: SelectorConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            model,
            config,
        }
    }

    /// `Ok(None)` means nothing is left to serve, which is a normal outcome.
    pub async fn next_task(
        &self,
        learner_id: Option<&str>,
        strategy: Option<&str>,
    ) -> Result<Option<TaskDetail>, SelectionError> {
        let learner_id = learner_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(SelectionError::MissingLearnerId)?;
        let strategy = strategy
            .ok_or(SelectionError::UnknownStrategy)?
            .trim()
            .parse::<Strategy>()?;

        let tasks = self.catalog.list_tasks(&TaskFilter::default()).await?;
        let passed = self.catalog.passed_task_ids(learner_id).await?;

        let chosen = match strategy {
            Strategy::Sequential => select_sequential(&tasks, &passed),
            Strategy::JustRight => {
                let mastery: HashMap<String, f64> = self
                    .store
                    .list_progress(learner_id)
                    .await?
                    .into_iter()
                    .map(|p| (p.concept, p.mastery))
                    .collect();
                select_just_right(&tasks, &passed, &mastery, &self.model, &self.config)
            }
        };

        let Some(chosen) = chosen else {
            tracing::info!(learner_id, %strategy, candidates = tasks.len(), "no eligible task");
            return Ok(None);
        };

        tracing::info!(
            learner_id,
            %strategy,
            task_id = %chosen.id,
            difficulty = chosen.difficulty,
            "next task selected"
        );
        Ok(self.catalog.get_task(&chosen.id).await?)
    }
}

fn creation_order(a: &TaskSummary, b: &TaskSummary) -> Ordering {
    a.difficulty
        .cmp(&b.difficulty)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Easiest unpassed task, earliest created first.
pub fn select_sequential<'a>(
    tasks: &'a [TaskSummary],
    passed: &HashSet<String>,
) -> Option<&'a TaskSummary> {
    tasks
        .iter()
        .filter(|task| !passed.contains(&task.id))
        .min_by(|a, b| creation_order(a, b))
}

/// Learner ability for one task: mean mastery over its concepts on the 1..=5 scale.
/// Concepts without a record count at the default starting score.
pub fn task_ability(task: &TaskSummary, mastery: &HashMap<String, f64>, model: &RatingModel) -> f64 {
    let mean = if task.concepts.is_empty() {
        model.default_mastery()
    } else {
        let total: f64 = task
            .concepts
            .iter()
            .map(|concept| {
                mastery
                    .get(concept)
                    .copied()
                    .unwrap_or_else(|| model.default_mastery())
            })
            .sum();
        total / task.concepts.len() as f64
    };
    model.normalized_ability(mean)
}

/// Picks the unpassed task whose difficulty is nearest `ability + target_offset`.
///
/// Tasks at or above the learner's ability are preferred; only when none remain
/// does the choice fall back to the nearest easier task. Ties go to lower
/// difficulty, then creation order.
pub fn select_just_right<'a>(
    tasks: &'a [TaskSummary],
    passed: &HashSet<String>,
    mastery: &HashMap<String, f64>,
    model: &RatingModel,
    config: &SelectorConfig,
) -> Option<&'a TaskSummary> {
    let scored: Vec<Scored<'a>> = tasks
        .iter()
        .filter(|task| !passed.contains(&task.id))
        .map(|task| {
            let ability = task_ability(task, mastery, model);
            let target = ability + config.target_offset;
            Scored {
                task,
                ability,
                distance: (task.difficulty as f64 - target).abs(),
            }
        })
        .collect();

    nearest(scored.iter().filter(|s| s.task.difficulty as f64 >= s.ability))
        .or_else(|| nearest(scored.iter()))
}

struct Scored<'a> {
    task: &'a TaskSummary,
    ability: f64,
    distance: f64,
}

fn nearest<'a, 'b>(candidates: impl Iterator<Item = &'b Scored<'a>>) -> Option<&'a TaskSummary>
where
    'a: 'b,
{
    candidates
        .min_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| creation_order(a.task, b.task))
        })
        .map(|s| s.task)
}
