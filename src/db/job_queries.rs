use std::str::FromStr;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{JobStore, JOB_EXPIRY_HOURS};
use crate::models::job::{GenerationJob, JobOutputs, JobStatus, NewGenerationJob};

/// Postgres-backed generation job store.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const JOB_COLUMNS: &str = "id, public_id, brand_id, product_id, customizations, user_hint, \
     session_id, client_ip, user_agent, referrer, prompt, negative_prompt, provider, model, \
     quality, output_format, width, height, status, tokens_used, cost_cents, processing_ms, \
     error_message, error_code, retry_count, ar_view_count, viewed_in_ar, output_image_url, \
     thumbnail_url, ar_model_url, provider_metadata, created_at, completed_at, expires_at";

fn job_from_row(row: &PgRow) -> Result<GenerationJob, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str).unwrap_or(JobStatus::Pending);

    let customizations: serde_json::Value = row.try_get("customizations")?;
    let customizations = serde_json::from_value(customizations)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    let width: i32 = row.try_get("width")?;
    let height: i32 = row.try_get("height")?;

    Ok(GenerationJob {
        id: row.try_get("id")?,
        public_id: row.try_get("public_id")?,
        brand_id: row.try_get("brand_id")?,
        product_id: row.try_get("product_id")?,
        customizations,
        user_hint: row.try_get("user_hint")?,
        session_id: row.try_get("session_id")?,
        client_ip: row.try_get("client_ip")?,
        user_agent: row.try_get("user_agent")?,
        referrer: row.try_get("referrer")?,
        prompt: row.try_get("prompt")?,
        negative_prompt: row.try_get("negative_prompt")?,
        provider: row.try_get("provider")?,
        model: row.try_get("model")?,
        quality: row.try_get("quality")?,
        output_format: row.try_get("output_format")?,
        width: width.max(0) as u32,
        height: height.max(0) as u32,
        status,
        tokens_used: row.try_get("tokens_used")?,
        cost_cents: row.try_get("cost_cents")?,
        processing_ms: row.try_get("processing_ms")?,
        error_message: row.try_get("error_message")?,
        error_code: row.try_get("error_code")?,
        retry_count: row.try_get("retry_count")?,
        ar_view_count: row.try_get("ar_view_count")?,
        viewed_in_ar: row.try_get("viewed_in_ar")?,
        output_image_url: row.try_get("output_image_url")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        ar_model_url: row.try_get("ar_model_url")?,
        provider_metadata: row.try_get("provider_metadata")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

#[async_trait::async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, new: &NewGenerationJob) -> Result<GenerationJob, sqlx::Error> {
        let public_id = NewGenerationJob::generate_public_id();
        let customizations = serde_json::to_value(&new.customizations)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let sql = format!(
            r#"
            INSERT INTO generation_jobs
                (public_id, brand_id, product_id, customizations, user_hint, session_id,
                 client_ip, user_agent, referrer, prompt, negative_prompt, provider, model,
                 quality, output_format, width, height, status, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    'pending', NOW() + make_interval(hours => $18))
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(&public_id)
            .bind(new.brand_id)
            .bind(new.product_id)
            .bind(customizations)
            .bind(&new.user_hint)
            .bind(&new.session_id)
            .bind(&new.client_ip)
            .bind(&new.user_agent)
            .bind(&new.referrer)
            .bind(&new.prompt)
            .bind(&new.negative_prompt)
            .bind(&new.provider)
            .bind(&new.model)
            .bind(&new.quality)
            .bind(&new.output_format)
            .bind(new.width as i32)
            .bind(new.height as i32)
            .bind(JOB_EXPIRY_HOURS as i32)
            .fetch_one(&self.pool)
            .await?;

        job_from_row(&row)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<GenerationJob>, sqlx::Error> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn get_by_public_id(
        &self,
        public_id: &str,
    ) -> Result<Option<GenerationJob>, sqlx::Error> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM generation_jobs WHERE public_id = $1");
        let row = sqlx::query(&sql)
            .bind(public_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_recent_for_brand(
        &self,
        brand_id: Uuid,
        limit: i64,
    ) -> Result<Vec<GenerationJob>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS} FROM generation_jobs
            WHERE brand_id = $1
              AND (status = 'completed' OR expires_at > NOW())
            ORDER BY created_at DESC
            LIMIT $2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(brand_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn mark_processing(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        // Forward-only: re-entry from 'failed' is allowed on redelivery, but a
        // completed job never leaves 'completed' and nothing regresses to
        // 'pending'.
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = 'processing'
            WHERE id = $1 AND status IN ('pending', 'processing', 'failed')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_completed(&self, id: Uuid, outputs: &JobOutputs) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = 'completed',
                output_image_url = $2,
                thumbnail_url = $3,
                ar_model_url = $4,
                cost_cents = $5,
                tokens_used = $6,
                processing_ms = $7,
                provider_metadata = $8,
                error_message = NULL,
                error_code = NULL,
                completed_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(id)
        .bind(&outputs.output_image_url)
        .bind(&outputs.thumbnail_url)
        .bind(&outputs.ar_model_url)
        .bind(outputs.cost_cents)
        .bind(outputs.tokens_used)
        .bind(outputs.processing_ms)
        .bind(&outputs.provider_metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error_code: &str,
        error_message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = 'failed',
                error_code = $2,
                error_message = $3,
                completed_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(id)
        .bind(error_code)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_retry(&self, id: Uuid) -> Result<i32, sqlx::Error> {
        let row = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET retry_count = retry_count + 1
            WHERE id = $1
            RETURNING retry_count
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        row.try_get("retry_count")
    }

    async fn increment_ar_views(&self, public_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE generation_jobs
            SET ar_view_count = ar_view_count + 1,
                viewed_in_ar = TRUE
            WHERE public_id = $1
            "#,
        )
        .bind(public_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
