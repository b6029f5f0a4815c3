use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::StoreConfig;
use crate::db;

/// `courier init`: create the store schema. Safe to run repeatedly.
pub async fn run_migrations(config: &StoreConfig) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT NOT NULL,
            collection TEXT NOT NULL,
            seq INTEGER NOT NULL,
            document TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_hash ON records(collection, hash)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_seq ON records(collection, seq)")
        .execute(pool)
        .await?;

    Ok(())
}
