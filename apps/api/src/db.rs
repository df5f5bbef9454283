use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS job_postings (
    id                          BIGSERIAL PRIMARY KEY,
    api_name                    TEXT NOT NULL,
    api_id                      TEXT NOT NULL,
    title                       TEXT NOT NULL,
    company_name                TEXT,
    company_logo                TEXT,
    url                         TEXT,
    category                    TEXT,
    job_type                    TEXT,
    experience_level            TEXT NOT NULL DEFAULT 'MID',
    publication_date            TIMESTAMPTZ,
    candidate_required_location TEXT,
    salary                      TEXT,
    description                 TEXT NOT NULL DEFAULT '',
    created_at                  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    tsv_en                      TSVECTOR GENERATED ALWAYS AS (
        to_tsvector('english', COALESCE(title, '') || ' ' || COALESCE(description, ''))
    ) STORED,
    UNIQUE (api_name, api_id)
);

CREATE INDEX IF NOT EXISTS job_postings_tsv_en_idx ON job_postings USING GIN (tsv_en);

CREATE TABLE IF NOT EXISTS job_skills (
    id     BIGSERIAL PRIMARY KEY,
    job_id BIGINT NOT NULL REFERENCES job_postings (id) ON DELETE CASCADE,
    skill  TEXT NOT NULL,
    level  INTEGER NOT NULL CHECK (level > 0)
);

CREATE INDEX IF NOT EXISTS job_skills_job_id_idx ON job_skills (job_id);

CREATE TABLE IF NOT EXISTS skill_groups (
    skill      TEXT PRIMARY KEY,
    group_name TEXT NOT NULL
);
"#;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates the ingestion tables if they are missing. Safe to run on every boot.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    pool.execute(SCHEMA)
        .await
        .context("Failed to apply database schema")?;
    info!("Database schema is up to date");
    Ok(())
}
