//! Vector store: named collections of (document, embedding, metadata) records
//! in SQLite, ranked by brute-force cosine similarity.
//!
//! Record ids are `doc_<n>`, numbered in insertion order from 0 within each
//! collection. Clearing a collection restarts the numbering.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use crate::config::StoreConfig;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{StoreItem, StoredMatch};

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open the store, creating the schema if needed.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Create the collection if it does not exist. Returns `true` when created.
    pub async fn get_or_create_collection(&self, name: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result =
            sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
                .bind(name)
                .bind(now)
                .execute(&self.pool)
                .await?;
        let created = result.rows_affected() > 0;
        if created {
            tracing::info!("Created collection '{}'", name);
        }
        Ok(created)
    }

    /// Delete every record in the collection. Returns the number removed.
    pub async fn clear_collection(&self, name: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Add items in one transaction, returning the assigned ids.
    pub async fn add(&self, collection: &str, items: &[StoreItem]) -> Result<Vec<String>> {
        self.get_or_create_collection(collection).await?;

        let mut tx = self.pool.begin().await?;
        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM records WHERE collection = ?",
        )
        .bind(collection)
        .fetch_one(&mut *tx)
        .await?;

        let now = chrono::Utc::now().timestamp();
        let mut ids = Vec::with_capacity(items.len());
        for (offset, item) in items.iter().enumerate() {
            let seq = next + offset as i64;
            let id = format!("doc_{}", seq);
            sqlx::query(
                r#"
                INSERT INTO records
                    (id, collection, seq, document, embedding, dims, metadata_json, hash, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(collection)
            .bind(seq)
            .bind(&item.document)
            .bind(vec_to_blob(&item.embedding))
            .bind(item.embedding.len() as i64)
            .bind(item.metadata.to_string())
            .bind(crate::chunk::hash_text(&item.document))
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert record {}", id))?;
            ids.push(id);
        }
        tx.commit().await?;

        tracing::debug!("Added {} records to '{}'", ids.len(), collection);
        Ok(ids)
    }

    /// Up to `top_n` records ranked by cosine similarity to `vector`, best first.
    ///
    /// Records whose dimensionality differs from the query score 0.
    pub async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_n: usize,
    ) -> Result<Vec<StoredMatch>> {
        let rows = sqlx::query(
            "SELECT id, document, embedding, metadata_json FROM records WHERE collection = ? ORDER BY seq",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let embedding = blob_to_vec(&blob);
            let metadata_json: String = row.get("metadata_json");
            let metadata = serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null);
            matches.push(StoredMatch {
                id: row.get("id"),
                document: row.get("document"),
                similarity: cosine_similarity(vector, &embedding),
                embedding,
                metadata,
            });
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_n);
        Ok(matches)
    }

    pub async fn count(&self, collection: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// All collections with their record counts, by name.
    pub async fn list_collections(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT c.name AS name, COUNT(r.id) AS n
            FROM collections c
            LEFT JOIN records r ON r.collection = c.name
            GROUP BY c.name
            ORDER BY c.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("name"), row.get::<i64, _>("n")))
            .collect())
    }

    /// Whether a record with this document hash is already stored.
    pub async fn contains_hash(&self, collection: &str, hash: &str) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM records WHERE collection = ? AND hash = ?",
        )
        .bind(collection)
        .bind(hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: tmp.path().join("store.sqlite"),
            ..StoreConfig::default()
        };
        let store = Store::open(&config).await.unwrap();
        (tmp, store)
    }

    fn item(text: &str, v: Vec<f32>) -> StoreItem {
        StoreItem {
            document: text.to_string(),
            embedding: v,
            metadata: serde_json::json!({ "chunk_file": format!("{}.txt", text) }),
        }
    }

    #[tokio::test]
    async fn add_assigns_sequential_ids() {
        let (_tmp, store) = temp_store().await;
        let ids = store
            .add("c", &[item("a", vec![1.0, 0.0]), item("b", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(ids, vec!["doc_0", "doc_1"]);
        let more = store.add("c", &[item("c", vec![1.0, 1.0])]).await.unwrap();
        assert_eq!(more, vec!["doc_2"]);
        assert_eq!(store.count("c").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn query_ranks_by_similarity() {
        let (_tmp, store) = temp_store().await;
        store
            .add(
                "c",
                &[
                    item("far", vec![-1.0, 0.0]),
                    item("near", vec![1.0, 0.1]),
                    item("mid", vec![0.5, 0.5]),
                ],
            )
            .await
            .unwrap();
        let hits = store.query("c", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document, "near");
        assert_eq!(hits[1].document, "mid");
        assert!(hits[0].similarity > hits[1].similarity);
        assert_eq!(hits[0].metadata["chunk_file"], "near.txt");
        assert_eq!(hits[0].embedding, vec![1.0, 0.1]);
    }

    #[tokio::test]
    async fn mismatched_dims_score_zero() {
        let (_tmp, store) = temp_store().await;
        store.add("c", &[item("x", vec![1.0, 0.0, 0.0])]).await.unwrap();
        let hits = store.query("c", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].similarity, 0.0);
    }

    #[tokio::test]
    async fn clear_restarts_numbering() {
        let (_tmp, store) = temp_store().await;
        store
            .add("c", &[item("a", vec![1.0]), item("b", vec![1.0])])
            .await
            .unwrap();
        assert_eq!(store.clear_collection("c").await.unwrap(), 2);
        assert_eq!(store.count("c").await.unwrap(), 0);
        let ids = store.add("c", &[item("z", vec![1.0])]).await.unwrap();
        assert_eq!(ids, vec!["doc_0"]);
    }

    #[tokio::test]
    async fn collections_are_listed_with_counts() {
        let (_tmp, store) = temp_store().await;
        assert!(store.get_or_create_collection("empty").await.unwrap());
        assert!(!store.get_or_create_collection("empty").await.unwrap());
        store.add("full", &[item("a", vec![1.0])]).await.unwrap();
        let list = store.list_collections().await.unwrap();
        assert_eq!(
            list,
            vec![("empty".to_string(), 0), ("full".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn hash_lookup() {
        let (_tmp, store) = temp_store().await;
        store.add("c", &[item("hello", vec![1.0])]).await.unwrap();
        let h = crate::chunk::hash_text("hello");
        assert!(store.contains_hash("c", &h).await.unwrap());
        assert!(!store.contains_hash("other", &h).await.unwrap());
    }
}
