use async_trait::async_trait;
use chrono::Utc;
use mediagen_domain::{
    GenerationJob, JobOutcome, JobRepository, JobStatus, NewGenerationJob, Page, PageRequest,
    SitemapEntry,
};
use mediagen_errors::GenerationResult;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::database::mapping::MappingHelpers;

const JOB_COLUMNS: &str = "id, user_id, project_id, node_id, prompt, status, result_url, slug, \
                           error_message, created_at, completed_at";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(user_id = %job.user_id, slug = %job.slug))]
    async fn insert(&self, job: &NewGenerationJob) -> GenerationResult<GenerationJob> {
        let created = GenerationJob::pending(job);
        sqlx::query(
            r#"
            INSERT INTO generations (id, user_id, project_id, node_id, prompt, status, slug, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(created.id.to_string())
        .bind(&created.user_id)
        .bind(&created.project_id)
        .bind(&created.node_id)
        .bind(&created.prompt)
        .bind(created.status)
        .bind(&created.slug)
        .bind(created.created_at)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %created.id, "生成记录已写入");
        Ok(created)
    }

    /// 比较后交换: 只有仍为 PENDING 的记录会被写入终态
    #[instrument(skip(self, outcome), fields(job_id = %id, status = outcome.status().as_str()))]
    async fn finalize(&self, id: Uuid, outcome: &JobOutcome) -> GenerationResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE generations
            SET status = $1, result_url = $2, error_message = $3, completed_at = $4
            WHERE id = $5 AND status = $6
            "#,
        )
        .bind(outcome.status())
        .bind(outcome.result_url())
        .bind(outcome.error_message())
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(JobStatus::Pending)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        if !applied {
            warn!("记录不存在或已处于终态");
        }
        Ok(applied)
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: Uuid) -> GenerationResult<Option<GenerationJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM generations WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(MappingHelpers::row_to_job).transpose()
    }

    #[instrument(skip(self))]
    async fn get_by_slug(&self, slug: &str) -> GenerationResult<Option<GenerationJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM generations WHERE slug = $1");
        let row = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(MappingHelpers::row_to_job).transpose()
    }

    #[instrument(skip(self), fields(page = page.page, page_size = page.page_size))]
    async fn list_completed(&self, page: PageRequest) -> GenerationResult<Page<GenerationJob>> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM generations WHERE status = $1")
            .bind(JobStatus::Completed)
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM generations WHERE status = $1 \
             ORDER BY created_at DESC, rowid DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query(&sql)
            .bind(JobStatus::Completed)
            .bind(page.page_size)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(MappingHelpers::row_to_job)
            .collect::<GenerationResult<Vec<_>>>()?;
        Ok(Page::new(items, total, page))
    }

    #[instrument(skip(self))]
    async fn sitemap(&self, limit: i64) -> GenerationResult<Vec<SitemapEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT slug, created_at FROM generations
            WHERE status = $1
            ORDER BY created_at DESC, rowid DESC
            LIMIT $2
            "#,
        )
        .bind(JobStatus::Completed)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(SitemapEntry {
                slug: row.try_get("slug")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(entries)
    }
}
