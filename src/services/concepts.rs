use std::sync::Arc;

use thiserror::Error;

use crate::db::store::{Concept, ConceptDraft, MasteryStore, StoreError};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("concept tag must not be blank")]
    BlankTag,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Find-or-create over the concept table. Name uniqueness lives in the store, so
/// racing resolutions of one unseen tag converge on a single record.
#[derive(Clone)]
pub struct ConceptResolver {
    store: Arc<dyn MasteryStore>,
    default_difficulty: i32,
}

impl ConceptResolver {
    pub fn new(store: Arc<dyn MasteryStore>, default_difficulty: i32) -> Self {
        Self {
            store,
            default_difficulty,
        }
    }

    pub async fn resolve(&self, tag: &str) -> Result<Concept, ResolveError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ResolveError::BlankTag);
        }

        let draft = ConceptDraft::auto_created(tag, self.default_difficulty);
        let concept = self.store.find_or_create_concept(&draft).await?;
        tracing::trace!(concept = %concept.name, concept_id = %concept.id, "concept resolved");
        Ok(concept)
    }

    /// Like [`resolve`](Self::resolve) but with curated attributes for a first insert.
    /// An existing concept keeps its stored attributes.
    pub async fn resolve_draft(&self, draft: &ConceptDraft) -> Result<Concept, ResolveError> {
        if draft.name.trim().is_empty() {
            return Err(ResolveError::BlankTag);
        }
        Ok(self.store.find_or_create_concept(draft).await?)
    }
}
