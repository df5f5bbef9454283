use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::{JobStore, SkillTaxonomy};
use crate::models::aggregates::SkillTotal;
use crate::models::job::{EnrichedJob, SkillGroup};
use crate::models::rows::{LocationCountRow, SkillGroupRow, SkillTotalRow};

/// Full-text filter shared by the aggregate queries. A blank query matches every posting.
const QUERY_FILTER: &str = "($1 = '' OR jp.tsv_en @@ plainto_tsquery('english', $1))";

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn existing_keys(&self, keys: &[String]) -> Result<HashSet<String>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }

        let found: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT api_name || ':' || api_id
            FROM job_postings
            WHERE api_name || ':' || api_id = ANY($1)
            "#,
        )
        .bind(keys)
        .fetch_all(&self.pool)
        .await
        .context("Failed to look up existing posting keys")?;

        Ok(found.into_iter().collect())
    }

    async fn save_all(&self, jobs: &[EnrichedJob]) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for job in jobs {
            let posting = &job.posting;
            let id: Option<i64> = sqlx::query_scalar(
                r#"
                INSERT INTO job_postings
                    (api_name, api_id, title, company_name, company_logo, url, category,
                     job_type, experience_level, publication_date,
                     candidate_required_location, salary, description)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (api_name, api_id) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(posting.provider.as_str())
            .bind(&posting.native_id)
            .bind(&posting.title)
            .bind(&posting.company_name)
            .bind(&posting.company_logo)
            .bind(&posting.url)
            .bind(&posting.category)
            .bind(&posting.job_type)
            .bind(job.experience_level.as_str())
            .bind(posting.publication_date)
            .bind(&posting.candidate_required_location)
            .bind(&posting.salary)
            .bind(&posting.description)
            .fetch_optional(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert posting {}", posting.natural_key()))?;

            // Already stored by a concurrent run; its skills were written with it.
            let Some(id) = id else { continue };
            inserted += 1;

            for skill in &job.skills {
                sqlx::query("INSERT INTO job_skills (job_id, skill, level) VALUES ($1, $2, $3)")
                    .bind(id)
                    .bind(&skill.name)
                    .bind(i32::try_from(skill.level).unwrap_or(i32::MAX))
                    .execute(&mut *tx)
                    .await
                    .context("Failed to insert job skill")?;
            }
        }

        tx.commit().await?;
        debug!(inserted, batch = jobs.len(), "Saved posting batch");
        Ok(())
    }

    async fn location_aggregates_for(&self, query: &str) -> Result<HashMap<Option<String>, u64>> {
        let sql = format!(
            r#"
            SELECT jp.candidate_required_location AS location, COUNT(*) AS total
            FROM job_postings jp
            WHERE {QUERY_FILTER}
            GROUP BY jp.candidate_required_location
            "#
        );
        let rows = sqlx::query_as::<_, LocationCountRow>(&sql)
            .bind(query.trim())
            .fetch_all(&self.pool)
            .await
            .context("Failed to load location aggregates")?;

        Ok(rows
            .into_iter()
            .map(|row| (row.location, row.total.max(0) as u64))
            .collect())
    }

    async fn skill_aggregates_for(&self, query: &str) -> Result<HashMap<String, SkillTotal>> {
        let sql = format!(
            r#"
            SELECT js.skill, sg.group_name, SUM(js.level)::BIGINT AS total_level
            FROM job_skills js
            JOIN job_postings jp ON jp.id = js.job_id
            LEFT JOIN skill_groups sg ON sg.skill = LOWER(js.skill)
            WHERE {QUERY_FILTER}
            GROUP BY js.skill, sg.group_name
            "#
        );
        let rows = sqlx::query_as::<_, SkillTotalRow>(&sql)
            .bind(query.trim())
            .fetch_all(&self.pool)
            .await
            .context("Failed to load skill aggregates")?;

        let mut totals: HashMap<String, SkillTotal> = HashMap::new();
        for row in rows {
            let entry = totals.entry(row.skill).or_insert(SkillTotal {
                group: None,
                total: 0,
            });
            entry.total += row.total_level.max(0) as u64;
            if entry.group.is_none() {
                entry.group = row.group_name;
            }
        }
        Ok(totals)
    }
}

#[derive(Clone)]
pub struct PgSkillTaxonomy {
    pool: PgPool,
}

impl PgSkillTaxonomy {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SkillTaxonomy for PgSkillTaxonomy {
    async fn lookup_groups(&self, skills: &[String]) -> Result<Vec<SkillGroup>> {
        if skills.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, SkillGroupRow>(
            "SELECT skill, group_name FROM skill_groups WHERE skill = ANY($1)",
        )
        .bind(skills)
        .fetch_all(&self.pool)
        .await
        .context("Failed to look up skill groups")?;

        Ok(rows
            .into_iter()
            .map(|row| SkillGroup {
                skill: row.skill,
                group: row.group_name,
            })
            .collect())
    }

    async fn save_groups(&self, groups: &[SkillGroup]) -> Result<()> {
        if groups.is_empty() {
            return Ok(());
        }

        let (skills, names): (Vec<String>, Vec<String>) = groups
            .iter()
            .map(|g| (g.skill.clone(), g.group.clone()))
            .unzip();

        sqlx::query(
            r#"
            INSERT INTO skill_groups (skill, group_name)
            SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[])
            ON CONFLICT (skill) DO NOTHING
            "#,
        )
        .bind(&skills)
        .bind(&names)
        .execute(&self.pool)
        .await
        .context("Failed to save skill groups")?;

        Ok(())
    }
}
