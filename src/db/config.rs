use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Postgres,
    Sqlite,
}

impl DbKind {
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub kind: DbKind,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub sqlite_busy_timeout: Duration,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, DbConfigError> {
        let url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(DbConfigError::Missing {
                key: "DATABASE_URL",
            })?;

        let mut config = Self::from_url(url)?;
        config.max_connections = env_u32("DB_MAX_CONNECTIONS", config.max_connections);
        config.acquire_timeout = Duration::from_millis(env_u64("DB_ACQUIRE_TIMEOUT_MS", 5000));
        config.sqlite_busy_timeout =
            Duration::from_millis(env_u64("SQLITE_BUSY_TIMEOUT_MS", 5000));
        Ok(config)
    }

    pub fn from_url(url: impl Into<String>) -> Result<Self, DbConfigError> {
        let url = url.into();
        let kind = DbKind::from_url(&url).ok_or_else(|| DbConfigError::UnsupportedScheme {
            url: redact(&url),
        })?;

        Ok(Self {
            url,
            kind,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            sqlite_busy_timeout: Duration::from_secs(5),
        })
    }
}

#[derive(Debug, Error)]
pub enum DbConfigError {
    #[error("missing env var: {key}")]
    Missing { key: &'static str },
    #[error("unsupported database url scheme: {url}")]
    UnsupportedScheme { url: String },
}

/// Keeps the scheme, drops anything that might carry credentials.
fn redact(url: &str) -> String {
    match url.split_once(':') {
        Some((scheme, _)) => format!("{scheme}:***"),
        None => "***".to_string(),
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
