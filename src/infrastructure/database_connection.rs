// Database connection and pool management
// This module handles SQLite database connections using sqlx

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{debug, info};

pub struct DatabaseConnection {
    pool: SqlitePool,
}

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS sellers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        base_url TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'idle',
        last_scraped_at DATETIME,
        last_max_pages INTEGER,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    r"
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        seller_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        slug TEXT NOT NULL,
        url TEXT NOT NULL,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (seller_id, slug),
        FOREIGN KEY (seller_id) REFERENCES sellers (id) ON DELETE CASCADE
    )",
    r"
    CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        slug TEXT NOT NULL,
        url TEXT NOT NULL,
        image_url TEXT,
        price_text TEXT,
        in_stock BOOLEAN,
        classification TEXT,
        badge TEXT,
        rating REAL,
        review_count INTEGER,
        thc_min REAL,
        thc_max REAL,
        thc_text TEXT,
        cbd_min REAL,
        cbd_max REAL,
        cbd_text TEXT,
        flowering_time TEXT,
        growth_difficulty TEXT,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (category_id, slug),
        FOREIGN KEY (category_id) REFERENCES categories (id) ON DELETE CASCADE
    )",
    r"
    CREATE TABLE IF NOT EXISTS price_variants (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_id INTEGER NOT NULL,
        pack_size INTEGER NOT NULL,
        total_price REAL NOT NULL,
        price_per_seed REAL NOT NULL,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (product_id, pack_size),
        FOREIGN KEY (product_id) REFERENCES products (id) ON DELETE CASCADE
    )",
    r"
    CREATE TABLE IF NOT EXISTS images (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE
    )",
    r"
    CREATE TABLE IF NOT EXISTS product_images (
        product_id INTEGER NOT NULL,
        image_id INTEGER NOT NULL,
        PRIMARY KEY (product_id, image_id),
        FOREIGN KEY (product_id) REFERENCES products (id) ON DELETE CASCADE,
        FOREIGN KEY (image_id) REFERENCES images (id) ON DELETE CASCADE
    )",
    r"
    CREATE TABLE IF NOT EXISTS scrape_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL,
        seller_id INTEGER NOT NULL,
        status TEXT NOT NULL,
        mode TEXT NOT NULL,
        pages_visited INTEGER NOT NULL DEFAULT 0,
        success_count INTEGER NOT NULL DEFAULT 0,
        error_count INTEGER NOT NULL DEFAULT 0,
        saved_count INTEGER NOT NULL DEFAULT 0,
        updated_count INTEGER NOT NULL DEFAULT 0,
        duration_ms INTEGER NOT NULL DEFAULT 0,
        error_detail TEXT,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (seller_id) REFERENCES sellers (id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS idx_categories_seller_id ON categories (seller_id)",
    "CREATE INDEX IF NOT EXISTS idx_products_category_id ON products (category_id)",
    "CREATE INDEX IF NOT EXISTS idx_scrape_logs_seller_id ON scrape_logs (seller_id)",
];

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        if !in_memory {
            // Create database file directory if it doesn't exist
            let db_path = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let db_path = db_path.split('?').next().unwrap_or(db_path);
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database url '{database_url}'"))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database is a separate database
        let max_connections = if in_memory { 1 } else { max_connections.max(1) };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {database_url}"))?;

        info!(database_url, max_connections, "🗄️ Database connected");
        Ok(Self { pool })
    }

    /// Single-connection in-memory database with the schema applied
    pub async fn in_memory() -> Result<Self> {
        let db = Self::new("sqlite::memory:", 1).await?;
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        debug!("Schema applied ({} statements)", SCHEMA.len());
        Ok(())
    }
}
