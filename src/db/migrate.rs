use sqlx::{PgPool, SqlitePool};

const POSTGRES_MIGRATIONS: &[(&str, &str)] = &[(
    "001_mastery_schema",
    include_str!("../../sql/postgres/001_mastery_schema.sql"),
)];

const SQLITE_MIGRATIONS: &[(&str, &str)] = &[(
    "001_mastery_schema",
    include_str!("../../sql/sqlite/001_mastery_schema.sql"),
)];

pub async fn run_postgres_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    tracing::info!(backend = "postgres", "Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "_migrations" (
            "id" SERIAL PRIMARY KEY,
            "name" TEXT NOT NULL UNIQUE,
            "applied_at" TIMESTAMP NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: Vec<String> =
        sqlx::query_scalar(r#"SELECT "name" FROM "_migrations" ORDER BY "id""#)
            .fetch_all(pool)
            .await?;

    let mut applied_count = 0;
    for (name, sql) in POSTGRES_MIGRATIONS {
        if applied.iter().any(|done| done == name) {
            tracing::debug!(migration = name, "Already applied, skipping");
            continue;
        }

        tracing::info!(migration = name, "Applying migration...");
        let mut tx = pool.begin().await?;
        for statement in split_sql_statements(sql) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|source| MigrationError::Migration {
                    name: name.to_string(),
                    source,
                })?;
        }
        sqlx::query(r#"INSERT INTO "_migrations" ("name") VALUES ($1)"#)
            .bind(*name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        applied_count += 1;
        tracing::info!(migration = name, "Migration applied successfully");
    }

    log_summary(applied_count);
    Ok(())
}

pub async fn run_sqlite_migrations(pool: &SqlitePool) -> Result<(), MigrationError> {
    tracing::info!(backend = "sqlite", "Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS "_migrations" (
            "id" INTEGER PRIMARY KEY AUTOINCREMENT,
            "name" TEXT NOT NULL UNIQUE,
            "applied_at" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied: Vec<String> =
        sqlx::query_scalar(r#"SELECT "name" FROM "_migrations" ORDER BY "id""#)
            .fetch_all(pool)
            .await?;

    let mut applied_count = 0;
    for (name, sql) in SQLITE_MIGRATIONS {
        if applied.iter().any(|done| done == name) {
            tracing::debug!(migration = name, "Already applied, skipping");
            continue;
        }

        tracing::info!(migration = name, "Applying migration...");
        let mut tx = pool.begin().await?;
        for statement in split_sql_statements(sql) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|source| MigrationError::Migration {
                    name: name.to_string(),
                    source,
                })?;
        }
        sqlx::query(r#"INSERT INTO "_migrations" ("name") VALUES (?1)"#)
            .bind(*name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        applied_count += 1;
        tracing::info!(migration = name, "Migration applied successfully");
    }

    log_summary(applied_count);
    Ok(())
}

fn log_summary(applied_count: usize) {
    if applied_count > 0 {
        tracing::info!(count = applied_count, "Database migrations completed");
    } else {
        tracing::info!("Database is up to date, no migrations needed");
    }
}

/// Splits a script on top-level semicolons, dropping `--` comment lines.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for line in sql.lines() {
        if !in_single_quote && !in_double_quote && line.trim_start().starts_with("--") {
            continue;
        }

        for ch in line.chars() {
            match ch {
                '\'' if !in_double_quote => in_single_quote = !in_single_quote,
                '"' if !in_single_quote => in_double_quote = !in_double_quote,
                ';' if !in_single_quote && !in_double_quote => {
                    let stmt = current.trim();
                    if !stmt.is_empty() {
                        statements.push(stmt.to_string());
                    }
                    current.clear();
                    continue;
                }
                _ => {}
            }
            current.push(ch);
        }
        current.push('\n');
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Migration '{name}' failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
