//! SQLite implementation of [`CatalogPersistence`]
//!
//! Identity keys (seller name, category slug, product slug, pack size, image
//! url) are never rewritten. A product row is only updated when one of its
//! mutable fields actually differs, so replaying a record set is a no-op.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, warn};

use crate::domain::errors::CrawlError;
use crate::domain::job::SellerIdentity;
use crate::domain::product::{CannabinoidRange, CategoryRef, PriceVariant, ProductCardRecord};
use crate::domain::repositories::{CatalogPersistence, JobActivity, SellerStatus, UpsertSummary};

/// Seller row as stored
#[derive(Debug, Clone, PartialEq)]
pub struct SellerRecord {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub status: String,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub last_max_pages: Option<u32>,
}

/// What changed for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordWrite {
    Created,
    Updated,
    Unchanged,
}

#[derive(Clone)]
pub struct SqliteCatalogRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn find_seller(&self, name: &str) -> Result<Option<SellerRecord>> {
        let row = sqlx::query(
            "SELECT id, name, base_url, status, last_scraped_at, last_max_pages FROM sellers WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(|row| -> Result<SellerRecord> {
            Ok(SellerRecord {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                base_url: row.try_get("base_url")?,
                status: row.try_get("status")?,
                last_scraped_at: row.try_get("last_scraped_at")?,
                last_max_pages: row
                    .try_get::<Option<i64>, _>("last_max_pages")?
                    .map(|pages| pages as u32),
            })
        })
        .transpose()
    }

    pub async fn count_products(&self, seller_id: i64) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM products p
            JOIN categories c ON c.id = p.category_id
            WHERE c.seller_id = ?
            ",
        )
        .bind(seller_id)
        .fetch_one(&*self.pool)
        .await?;
        Ok(count as u32)
    }

    pub async fn count_job_logs(&self, seller_id: i64) -> Result<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scrape_logs WHERE seller_id = ?")
            .bind(seller_id)
            .fetch_one(&*self.pool)
            .await?;
        Ok(count as u32)
    }

    /// Load stored records of one category, ordered by slug
    pub async fn products_in_category(&self, category_id: i64) -> Result<Vec<ProductCardRecord>> {
        let category_row = sqlx::query("SELECT name, url FROM categories WHERE id = ?")
            .bind(category_id)
            .fetch_one(&*self.pool)
            .await
            .with_context(|| format!("Unknown category {category_id}"))?;
        let category = CategoryRef::new(
            &category_row.try_get::<String, _>("name")?,
            &category_row.try_get::<String, _>("url")?,
        );

        let rows = sqlx::query("SELECT * FROM products WHERE category_id = ? ORDER BY slug")
            .bind(category_id)
            .fetch_all(&*self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let product_id: i64 = row.try_get("id")?;
            let mut record = record_from_row(&row, category.clone())?;
            record.price_variants = self.variants_for(product_id).await?;
            records.push(record);
        }
        Ok(records)
    }

    async fn variants_for(&self, product_id: i64) -> Result<Vec<PriceVariant>> {
        let rows = sqlx::query(
            "SELECT pack_size, total_price, price_per_seed FROM price_variants WHERE product_id = ? ORDER BY pack_size",
        )
        .bind(product_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PriceVariant {
                    pack_size: row.try_get::<i64, _>("pack_size")? as u32,
                    total_price: row.try_get("total_price")?,
                    price_per_seed: row.try_get("price_per_seed")?,
                })
            })
            .collect()
    }

    async fn write_record(&self, category_id: i64, record: &ProductCardRecord) -> Result<RecordWrite> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r"
            SELECT id, price_text, in_stock, classification,
                   thc_min, thc_max, thc_text, cbd_min, cbd_max, cbd_text
            FROM products WHERE category_id = ? AND slug = ?
            ",
        )
        .bind(category_id)
        .bind(&record.slug)
        .fetch_optional(&mut *tx)
        .await?;

        let (product_id, mut write) = match existing {
            None => (insert_product(&mut tx, category_id, record).await?, RecordWrite::Created),
            Some(row) => {
                let product_id: i64 = row.try_get("id")?;
                if mutable_fields_differ(&row, record)? {
                    update_product(&mut tx, product_id, record).await?;
                    (product_id, RecordWrite::Updated)
                } else {
                    (product_id, RecordWrite::Unchanged)
                }
            }
        };

        for variant in &record.price_variants {
            if upsert_variant(&mut tx, product_id, variant).await? && write == RecordWrite::Unchanged {
                write = RecordWrite::Updated;
            }
        }

        if let Some(image_url) = &record.image_url {
            link_image(&mut tx, product_id, image_url).await?;
        }

        tx.commit().await?;
        Ok(write)
    }
}

async fn insert_product(
    tx: &mut Transaction<'_, Sqlite>,
    category_id: i64,
    record: &ProductCardRecord,
) -> Result<i64> {
    let (thc_min, thc_max, thc_text) = range_columns(record.thc_range.as_ref());
    let (cbd_min, cbd_max, cbd_text) = range_columns(record.cbd_range.as_ref());

    let result = sqlx::query(
        r"
        INSERT INTO products
        (category_id, name, slug, url, image_url, price_text, in_stock, classification,
         badge, rating, review_count, thc_min, thc_max, thc_text, cbd_min, cbd_max, cbd_text,
         flowering_time, growth_difficulty)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(category_id)
    .bind(&record.name)
    .bind(&record.slug)
    .bind(&record.canonical_url)
    .bind(&record.image_url)
    .bind(&record.price_text)
    .bind(record.in_stock)
    .bind(&record.classification)
    .bind(&record.badge)
    .bind(record.rating.map(f64::from))
    .bind(record.review_count.map(i64::from))
    .bind(thc_min)
    .bind(thc_max)
    .bind(thc_text)
    .bind(cbd_min)
    .bind(cbd_max)
    .bind(cbd_text)
    .bind(&record.flowering_time)
    .bind(&record.growth_difficulty)
    .execute(&mut **tx)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn update_product(
    tx: &mut Transaction<'_, Sqlite>,
    product_id: i64,
    record: &ProductCardRecord,
) -> Result<()> {
    let (thc_min, thc_max, thc_text) = range_columns(record.thc_range.as_ref());
    let (cbd_min, cbd_max, cbd_text) = range_columns(record.cbd_range.as_ref());

    sqlx::query(
        r"
        UPDATE products
        SET price_text = ?, in_stock = ?, classification = ?,
            thc_min = ?, thc_max = ?, thc_text = ?,
            cbd_min = ?, cbd_max = ?, cbd_text = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        ",
    )
    .bind(&record.price_text)
    .bind(record.in_stock)
    .bind(&record.classification)
    .bind(thc_min)
    .bind(thc_max)
    .bind(thc_text)
    .bind(cbd_min)
    .bind(cbd_max)
    .bind(cbd_text)
    .bind(product_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Returns `true` when a variant row was inserted or changed
async fn upsert_variant(
    tx: &mut Transaction<'_, Sqlite>,
    product_id: i64,
    variant: &PriceVariant,
) -> Result<bool> {
    let existing = sqlx::query(
        "SELECT id, total_price, price_per_seed FROM price_variants WHERE product_id = ? AND pack_size = ?",
    )
    .bind(product_id)
    .bind(i64::from(variant.pack_size))
    .fetch_optional(&mut **tx)
    .await?;

    match existing {
        None => {
            sqlx::query(
                "INSERT INTO price_variants (product_id, pack_size, total_price, price_per_seed) VALUES (?, ?, ?, ?)",
            )
            .bind(product_id)
            .bind(i64::from(variant.pack_size))
            .bind(variant.total_price)
            .bind(variant.price_per_seed)
            .execute(&mut **tx)
            .await?;
            Ok(true)
        }
        Some(row) => {
            let total: f64 = row.try_get("total_price")?;
            let per_seed: f64 = row.try_get("price_per_seed")?;
            if total == variant.total_price && per_seed == variant.price_per_seed {
                return Ok(false);
            }
            sqlx::query(
                "UPDATE price_variants SET total_price = ?, price_per_seed = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            )
            .bind(variant.total_price)
            .bind(variant.price_per_seed)
            .bind(row.try_get::<i64, _>("id")?)
            .execute(&mut **tx)
            .await?;
            Ok(true)
        }
    }
}

async fn link_image(tx: &mut Transaction<'_, Sqlite>, product_id: i64, image_url: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO images (url) VALUES (?)")
        .bind(image_url)
        .execute(&mut **tx)
        .await?;
    let image_id: i64 = sqlx::query_scalar("SELECT id FROM images WHERE url = ?")
        .bind(image_url)
        .fetch_one(&mut **tx)
        .await?;
    sqlx::query("INSERT OR IGNORE INTO product_images (product_id, image_id) VALUES (?, ?)")
        .bind(product_id)
        .bind(image_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn range_columns(range: Option<&CannabinoidRange>) -> (Option<f64>, Option<f64>, Option<String>) {
    range.map_or((None, None, None), |r| (r.min, r.max, Some(r.raw_text.clone())))
}

fn mutable_fields_differ(row: &SqliteRow, record: &ProductCardRecord) -> Result<bool> {
    let (thc_min, thc_max, thc_text) = range_columns(record.thc_range.as_ref());
    let (cbd_min, cbd_max, cbd_text) = range_columns(record.cbd_range.as_ref());

    Ok(row.try_get::<Option<String>, _>("price_text")? != record.price_text
        || row.try_get::<Option<bool>, _>("in_stock")? != record.in_stock
        || row.try_get::<Option<String>, _>("classification")? != record.classification
        || row.try_get::<Option<f64>, _>("thc_min")? != thc_min
        || row.try_get::<Option<f64>, _>("thc_max")? != thc_max
        || row.try_get::<Option<String>, _>("thc_text")? != thc_text
        || row.try_get::<Option<f64>, _>("cbd_min")? != cbd_min
        || row.try_get::<Option<f64>, _>("cbd_max")? != cbd_max
        || row.try_get::<Option<String>, _>("cbd_text")? != cbd_text)
}

fn range_from_row(row: &SqliteRow, prefix: &str) -> Result<Option<CannabinoidRange>> {
    let raw_text: Option<String> = row.try_get(format!("{prefix}_text").as_str())?;
    Ok(match raw_text {
        Some(raw_text) => Some(CannabinoidRange {
            min: row.try_get(format!("{prefix}_min").as_str())?,
            max: row.try_get(format!("{prefix}_max").as_str())?,
            raw_text,
        }),
        None => None,
    })
}

fn record_from_row(row: &SqliteRow, category: CategoryRef) -> Result<ProductCardRecord> {
    let name: String = row.try_get("name")?;
    let url: String = row.try_get("url")?;
    let mut record = ProductCardRecord::new(&name, &url, category);
    record.slug = row.try_get("slug")?;
    record.image_url = row.try_get("image_url")?;
    record.price_text = row.try_get("price_text")?;
    record.in_stock = row.try_get("in_stock")?;
    record.classification = row.try_get("classification")?;
    record.badge = row.try_get("badge")?;
    record.rating = row.try_get::<Option<f64>, _>("rating")?.map(|r| r as f32);
    record.review_count = row.try_get::<Option<i64>, _>("review_count")?.map(|c| c as u32);
    record.thc_range = range_from_row(row, "thc")?;
    record.cbd_range = range_from_row(row, "cbd")?;
    record.flowering_time = row.try_get("flowering_time")?;
    record.growth_difficulty = row.try_get("growth_difficulty")?;
    Ok(record)
}

#[async_trait]
impl CatalogPersistence for SqliteCatalogRepository {
    async fn upsert_seller(&self, seller: &SellerIdentity, status: SellerStatus) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO sellers (name, base_url, status, last_scraped_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(name) DO UPDATE SET
                base_url = excluded.base_url,
                status = excluded.status,
                last_scraped_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            ",
        )
        .bind(&seller.name)
        .bind(&seller.base_url)
        .bind(status.as_str())
        .fetch_one(&*self.pool)
        .await
        .with_context(|| format!("Failed to upsert seller '{}'", seller.name))?;
        Ok(id)
    }

    async fn touch_seller(&self, seller_id: i64, status: SellerStatus) -> Result<()> {
        sqlx::query(
            "UPDATE sellers SET status = ?, last_scraped_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(seller_id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn last_known_max_pages(&self, seller_id: i64) -> Result<Option<u32>> {
        let pages = sqlx::query_scalar::<_, Option<i64>>("SELECT last_max_pages FROM sellers WHERE id = ?")
            .bind(seller_id)
            .fetch_optional(&*self.pool)
            .await?
            .flatten();
        Ok(pages.filter(|p| *p > 0).map(|p| p as u32))
    }

    async fn remember_max_pages(&self, seller_id: i64, max_pages: u32) -> Result<()> {
        sqlx::query("UPDATE sellers SET last_max_pages = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(i64::from(max_pages))
            .bind(seller_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_category(&self, seller_id: i64, category: &CategoryRef) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO categories (seller_id, name, slug, url)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(seller_id, slug) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            ",
        )
        .bind(seller_id)
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.url)
        .fetch_one(&*self.pool)
        .await
        .with_context(|| format!("Failed to upsert category '{}'", category.slug))?;
        Ok(id)
    }

    async fn upsert_products(&self, category_id: i64, records: &[ProductCardRecord]) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();

        for record in records {
            match self.write_record(category_id, record).await {
                Ok(RecordWrite::Created) => summary.saved += 1,
                Ok(RecordWrite::Updated) => summary.updated += 1,
                Ok(RecordWrite::Unchanged) => {}
                Err(e) => {
                    warn!(slug = %record.slug, error = %e, "⚠️ Failed to persist product, continuing");
                    summary.errors += 1;
                    summary.failures.push(CrawlError::PersistenceWriteError {
                        slug: record.slug.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        debug!(
            category_id,
            saved = summary.saved,
            updated = summary.updated,
            errors = summary.errors,
            "Products upserted"
        );
        Ok(summary)
    }

    async fn log_job_activity(&self, activity: &JobActivity) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO scrape_logs
            (job_id, seller_id, status, mode, pages_visited, success_count, error_count,
             saved_count, updated_count, duration_ms, error_detail)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&activity.job_id)
        .bind(activity.seller_id)
        .bind(activity.status.as_str())
        .bind(activity.mode.to_string())
        .bind(i64::from(activity.pages_visited))
        .bind(i64::from(activity.success_count))
        .bind(i64::from(activity.error_count))
        .bind(i64::from(activity.saved_count))
        .bind(i64::from(activity.updated_count))
        .bind(activity.duration_ms as i64)
        .bind(&activity.error_detail)
        .execute(&*self.pool)
        .await
        .context("Failed to write scrape log")?;
        Ok(())
    }
}
