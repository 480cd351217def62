use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db::config::DbConfig;
use crate::db::store::{
    assemble_summaries, AppliedAttempt, Concept, ConceptDraft, ConceptProgress, ConceptRow,
    MasteryRecord, MasteryStore, StoreError, TaskCatalog, TaskConceptRow, TaskDetail,
    TaskDetailRow, TaskDraft, TaskFilter, TaskRow, TaskSummary,
};
use crate::services::rating::RatingModel;

const MASTERY_COLUMNS: &str =
    r#""id","learnerId","conceptId","mastery","attempts","successes","lastAttemptAt""#;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &DbConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.sqlite_busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn concept_links_for(&self, task_ids: &[String]) -> Result<Vec<TaskConceptRow>, StoreError> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"SELECT tc."taskId", tc."conceptId", c."name" FROM "task_concepts" tc
               JOIN "concepts" c ON c."id" = tc."conceptId"
               WHERE tc."taskId" IN ("#,
        );
        let mut separated = qb.separated(", ");
        for id in task_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(r#") ORDER BY c."name""#);

        Ok(qb.build_query_as::<TaskConceptRow>().fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl MasteryStore for SqliteStore {
    async fn find_or_create_concept(&self, draft: &ConceptDraft) -> Result<Concept, StoreError> {
        sqlx::query(
            r#"INSERT INTO "concepts" ("id","name","description","difficulty","prerequisites","createdAt")
               VALUES (?1,?2,?3,?4,?5,?6)
               ON CONFLICT ("name") DO NOTHING"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(draft.difficulty)
        .bind(Json(&draft.prerequisites))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.find_concept(&draft.name)
            .await?
            .ok_or_else(|| StoreError::MissingConcept(draft.name.clone()))
    }

    async fn find_concept(&self, name: &str) -> Result<Option<Concept>, StoreError> {
        let row = sqlx::query_as::<_, ConceptRow>(
            r#"SELECT "id","name","description","difficulty","prerequisites"
               FROM "concepts" WHERE "name" = ?1"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Concept::from))
    }

    async fn find_mastery(
        &self,
        learner_id: &str,
        concept_id: &str,
    ) -> Result<Option<MasteryRecord>, StoreError> {
        let sql = format!(
            r#"SELECT {MASTERY_COLUMNS} FROM "mastery_progress" WHERE "learnerId" = ?1 AND "conceptId" = ?2"#
        );
        Ok(sqlx::query_as::<_, MasteryRecord>(&sql)
            .bind(learner_id)
            .bind(concept_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn apply_attempt(
        &self,
        learner_id: &str,
        concept_id: &str,
        success: bool,
        model: &RatingModel,
    ) -> Result<AppliedAttempt, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // The provisioning insert is the first statement, so the deferred transaction
        // takes the database write lock before reading; concurrent writers queue on
        // busy_timeout instead of interleaving their read-modify-write.
        sqlx::query(
            r#"INSERT INTO "mastery_progress" ("id","learnerId","conceptId","mastery","attempts","successes","createdAt")
               VALUES (?1,?2,?3,?4,0,0,?5)
               ON CONFLICT ("learnerId","conceptId") DO NOTHING"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(learner_id)
        .bind(concept_id)
        .bind(model.default_mastery())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let select_sql = format!(
            r#"SELECT {MASTERY_COLUMNS} FROM "mastery_progress"
               WHERE "learnerId" = ?1 AND "conceptId" = ?2"#
        );
        let current = sqlx::query_as::<_, MasteryRecord>(&select_sql)
            .bind(learner_id)
            .bind(concept_id)
            .fetch_one(&mut *tx)
            .await?;

        let next = model.update(current.mastery, success);

        let update_sql = format!(
            r#"UPDATE "mastery_progress"
               SET "mastery" = ?3,
                   "attempts" = "attempts" + 1,
                   "successes" = "successes" + ?4,
                   "lastAttemptAt" = ?5
               WHERE "learnerId" = ?1 AND "conceptId" = ?2
               RETURNING {MASTERY_COLUMNS}"#
        );
        let record = sqlx::query_as::<_, MasteryRecord>(&update_sql)
            .bind(learner_id)
            .bind(concept_id)
            .bind(next)
            .bind(if success { 1_i64 } else { 0_i64 })
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(AppliedAttempt {
            previous_mastery: current.mastery,
            record,
        })
    }

    async fn list_progress(&self, learner_id: &str) -> Result<Vec<ConceptProgress>, StoreError> {
        Ok(sqlx::query_as::<_, ConceptProgress>(
            r#"SELECT c."name" AS "concept", m."mastery", m."attempts", m."successes"
               FROM "mastery_progress" m
               JOIN "concepts" c ON c."id" = m."conceptId"
               WHERE m."learnerId" = ?1
               ORDER BY m."mastery" DESC, c."name" ASC"#,
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskCatalog for SqliteStore {
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskSummary>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"SELECT t."id", t."title", t."difficulty", t."createdAt" FROM "tasks" t WHERE 1 = 1"#,
        );
        if let Some(difficulty) = filter.difficulty {
            qb.push(r#" AND t."difficulty" = "#).push_bind(difficulty);
        }
        if let Some(concept) = filter.concept.as_deref() {
            qb.push(
                r#" AND EXISTS (SELECT 1 FROM "task_concepts" tc
                    JOIN "concepts" c ON c."id" = tc."conceptId"
                    WHERE tc."taskId" = t."id" AND c."name" = "#,
            )
            .push_bind(concept)
            .push(")");
        }
        if let Some(concept_id) = filter.concept_id.as_deref() {
            qb.push(
                r#" AND EXISTS (SELECT 1 FROM "task_concepts" tc
                    WHERE tc."taskId" = t."id" AND tc."conceptId" = "#,
            )
            .push_bind(concept_id)
            .push(")");
        }
        qb.push(r#" ORDER BY t."difficulty" ASC, t."createdAt" ASC, t."id" ASC"#);

        let rows = qb.build_query_as::<TaskRow>().fetch_all(&self.pool).await?;
        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        let links = self.concept_links_for(&ids).await?;
        Ok(assemble_summaries(rows, links))
    }

    async fn get_task(&self, id: &str) -> Result<Option<TaskDetail>, StoreError> {
        let row = sqlx::query_as::<_, TaskDetailRow>(
            r#"SELECT "id","title","description","prompt","difficulty","scaffold","tests","hints"
               FROM "tasks" WHERE "id" = ?1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let concepts = self
            .concept_links_for(std::slice::from_ref(&row.id))
            .await?
            .into_iter()
            .map(|link| link.name)
            .collect();
        Ok(Some(row.into_detail(concepts)))
    }

    async fn upsert_task(
        &self,
        draft: &TaskDraft,
        concept_ids: &[String],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO "tasks" ("id","title","description","prompt","difficulty","scaffold","tests","hints","createdAt")
               VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
               ON CONFLICT ("id") DO UPDATE SET
               "title"=EXCLUDED."title",
               "description"=EXCLUDED."description",
               "prompt"=EXCLUDED."prompt",
               "difficulty"=EXCLUDED."difficulty",
               "scaffold"=EXCLUDED."scaffold",
               "tests"=EXCLUDED."tests",
               "hints"=EXCLUDED."hints""#,
        )
        .bind(&draft.id)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.prompt)
        .bind(draft.difficulty)
        .bind(Json(&draft.scaffold))
        .bind(Json(&draft.tests))
        .bind(Json(&draft.hints))
        .bind(draft.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(r#"DELETE FROM "task_concepts" WHERE "taskId" = ?1"#)
            .bind(&draft.id)
            .execute(&mut *tx)
            .await?;

        for concept_id in concept_ids {
            sqlx::query(
                r#"INSERT INTO "task_concepts" ("taskId","conceptId") VALUES (?1,?2)
                   ON CONFLICT DO NOTHING"#,
            )
            .bind(&draft.id)
            .bind(concept_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn passed_task_ids(&self, learner_id: &str) -> Result<HashSet<String>, StoreError> {
        let ids: Vec<String> =
            sqlx::query_scalar(r#"SELECT "taskId" FROM "task_completions" WHERE "learnerId" = ?1"#)
                .bind(learner_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn record_task_pass(&self, learner_id: &str, task_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO "task_completions" ("learnerId","taskId","passedAt")
               VALUES (?1,?2,?3)
               ON CONFLICT ("learnerId","taskId") DO NOTHING"#,
        )
        .bind(learner_id)
        .bind(task_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
