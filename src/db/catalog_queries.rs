use std::str::FromStr;

use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{BrandStore, ProductStore};
use crate::models::brand::{BrandLimits, PlanTier};
use crate::models::product::{ArConfig, CustomizationZone, Product, RenderStyle, ZoneType};

/// Read model over the catalog collaborator's product and zone tables.
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProductStore for PgProductStore {
    async fn get_active_product(
        &self,
        brand_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Product>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, brand_id, name, category, active, prompt_template, negative_prompt,
                   ai_provider, ai_model, quality, output_format, width, height,
                   base_image_url, ar_enabled, model_3d_url, ar_tracking_type, ar_scale,
                   ar_offset_x, ar_offset_y, ar_offset_z
            FROM products
            WHERE id = $1 AND brand_id = $2 AND active = TRUE
            "#,
        )
        .bind(product_id)
        .bind(brand_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let zone_rows = sqlx::query(
            r#"
            SELECT zone_id, name, zone_type, required, max_length, render_style,
                   x, y, width, height
            FROM customization_zones
            WHERE product_id = $1
            ORDER BY sort_order, zone_id
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let zones = zone_rows
            .iter()
            .map(|z| {
                let zone_type: String = z.try_get("zone_type")?;
                let render_style: String = z.try_get("render_style")?;
                let max_length: Option<i32> = z.try_get("max_length")?;
                let x: i32 = z.try_get("x")?;
                let y: i32 = z.try_get("y")?;
                let width: i32 = z.try_get("width")?;
                let height: i32 = z.try_get("height")?;
                Ok(CustomizationZone {
                    id: z.try_get("zone_id")?,
                    name: z.try_get("name")?,
                    zone_type: ZoneType::from_str(&zone_type).unwrap_or(ZoneType::Text),
                    required: z.try_get("required")?,
                    max_length: max_length.map(|l| l.max(0) as u32),
                    render_style: RenderStyle::from_str(&render_style)
                        .unwrap_or(RenderStyle::Flat),
                    x: x.max(0) as u32,
                    y: y.max(0) as u32,
                    width: width.max(0) as u32,
                    height: height.max(0) as u32,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let width: i32 = row.try_get("width")?;
        let height: i32 = row.try_get("height")?;

        Ok(Some(Product {
            id: row.try_get("id")?,
            brand_id: row.try_get("brand_id")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            active: row.try_get("active")?,
            prompt_template: row.try_get("prompt_template")?,
            negative_prompt: row.try_get("negative_prompt")?,
            ai_provider: row.try_get("ai_provider")?,
            ai_model: row.try_get("ai_model")?,
            quality: row.try_get("quality")?,
            output_format: row.try_get("output_format")?,
            width: width.max(0) as u32,
            height: height.max(0) as u32,
            base_image_url: row.try_get("base_image_url")?,
            ar: ArConfig {
                enabled: row.try_get("ar_enabled")?,
                model_3d_url: row.try_get("model_3d_url")?,
                tracking_type: row.try_get("ar_tracking_type")?,
                scale: row.try_get("ar_scale")?,
                offset: [
                    row.try_get("ar_offset_x")?,
                    row.try_get("ar_offset_y")?,
                    row.try_get("ar_offset_z")?,
                ],
            },
            zones,
        }))
    }
}

/// Brand limits and usage accounting over Postgres.
pub struct PgBrandStore {
    pool: PgPool,
}

impl PgBrandStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BrandStore for PgBrandStore {
    async fn get_brand_limits(&self, brand_id: Uuid) -> Result<Option<BrandLimits>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, plan_tier, monthly_generations, max_monthly_generations
            FROM brands
            WHERE id = $1
            "#,
        )
        .bind(brand_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => {
                let tier: String = row.try_get("plan_tier")?;
                Some(BrandLimits {
                    brand_id: row.try_get("id")?,
                    plan_tier: PlanTier::from_str(&tier).unwrap_or(PlanTier::Free),
                    monthly_generations: row.try_get("monthly_generations")?,
                    max_monthly_generations: row.try_get("max_monthly_generations")?,
                })
            }
            None => None,
        })
    }

    async fn increment_monthly_generations(&self, brand_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE brands
            SET monthly_generations = monthly_generations + 1
            WHERE id = $1
            "#,
        )
        .bind(brand_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_generation_usage(
        &self,
        brand_id: Uuid,
        job_id: Uuid,
        model: &str,
        cost_cents: i32,
    ) -> Result<(), sqlx::Error> {
        // Unique on job_id: a redelivered job cannot be charged twice.
        sqlx::query(
            r#"
            INSERT INTO usage_records (brand_id, job_id, model, cost_cents)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(brand_id)
        .bind(job_id)
        .bind(model)
        .bind(cost_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
