pub mod config;
pub mod migrate;
pub mod postgres;
pub mod sqlite;
pub mod store;

use std::sync::Arc;

use thiserror::Error;

use crate::db::config::{DbConfig, DbConfigError, DbKind};
use crate::db::migrate::MigrationError;
use crate::db::postgres::PgStore;
use crate::db::sqlite::SqliteStore;

pub use crate::db::store::{MasteryStore, StoreError, TaskCatalog};

#[derive(Clone)]
enum Backend {
    Postgres(Arc<PgStore>),
    Sqlite(Arc<SqliteStore>),
}

/// Process-wide handle on the relational store: opened once at startup, handed
/// to every component that needs it, closed at shutdown.
#[derive(Clone)]
pub struct DatabaseProxy {
    backend: Backend,
}

impl DatabaseProxy {
    pub async fn from_env() -> Result<Self, DbInitError> {
        let config = DbConfig::from_env()?;
        Self::connect(&config).await
    }

    pub async fn connect(config: &DbConfig) -> Result<Self, DbInitError> {
        let backend = match config.kind {
            DbKind::Postgres => {
                let store = PgStore::connect(config).await?;
                migrate::run_postgres_migrations(store.pool()).await?;
                Backend::Postgres(Arc::new(store))
            }
            DbKind::Sqlite => {
                let store = SqliteStore::connect(config).await?;
                migrate::run_sqlite_migrations(store.pool()).await?;
                Backend::Sqlite(Arc::new(store))
            }
        };

        tracing::info!(backend = config.kind.as_str(), "database connected");
        Ok(Self { backend })
    }

    pub fn kind(&self) -> DbKind {
        match self.backend {
            Backend::Postgres(_) => DbKind::Postgres,
            Backend::Sqlite(_) => DbKind::Sqlite,
        }
    }

    pub fn mastery_store(&self) -> Arc<dyn MasteryStore> {
        match &self.backend {
            Backend::Postgres(store) => Arc::clone(store) as Arc<dyn MasteryStore>,
            Backend::Sqlite(store) => Arc::clone(store) as Arc<dyn MasteryStore>,
        }
    }

    pub fn catalog(&self) -> Arc<dyn TaskCatalog> {
        match &self.backend {
            Backend::Postgres(store) => Arc::clone(store) as Arc<dyn TaskCatalog>,
            Backend::Sqlite(store) => Arc::clone(store) as Arc<dyn TaskCatalog>,
        }
    }

    pub async fn close(&self) {
        match &self.backend {
            Backend::Postgres(store) => store.pool().close().await,
            Backend::Sqlite(store) => store.pool().close().await,
        }
        tracing::info!("database pool closed");
    }
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error(transparent)]
    Config(#[from] DbConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}
