use std::sync::Arc;
use std::time::Instant;

use crate::db::{DatabaseProxy, MasteryStore, TaskCatalog};
use crate::services::evaluation::{EvaluationClient, EvaluationConfig};
use crate::services::mastery::MasteryService;
use crate::services::rating::RatingModel;
use crate::services::task_selector::{SelectorConfig, TaskSelector};

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    store: Arc<dyn MasteryStore>,
    catalog: Arc<dyn TaskCatalog>,
    mastery: MasteryService,
    selector: TaskSelector,
    evaluation: EvaluationClient,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MasteryStore>,
        catalog: Arc<dyn TaskCatalog>,
        model: RatingModel,
        selector: SelectorConfig,
        evaluation: EvaluationConfig,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            mastery: MasteryService::new(Arc::clone(&store), Arc::clone(&catalog), model),
            selector: TaskSelector::new(Arc::clone(&store), Arc::clone(&catalog), model, selector),
            evaluation: EvaluationClient::new(evaluation),
            store,
            catalog,
        }
    }

    pub fn from_proxy(
        proxy: &DatabaseProxy,
        model: RatingModel,
        selector: SelectorConfig,
        evaluation: EvaluationConfig,
    ) -> Self {
        Self::new(proxy.mastery_store(), proxy.catalog(), model, selector, evaluation)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn store(&self) -> &Arc<dyn MasteryStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<dyn TaskCatalog> {
        &self.catalog
    }

    pub fn mastery(&self) -> &MasteryService {
        &self.mastery
    }

    pub fn selector(&self) -> &TaskSelector {
        &self.selector
    }

    pub fn evaluation(&self) -> &EvaluationClient {
        &self.evaluation
    }
}
