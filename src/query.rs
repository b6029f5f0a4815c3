//! Nearest-neighbor retrieval for RAG prompts.
//!
//! `courier query --text "..."` embeds the query, pulls the `top_n` closest
//! records from the collection and prints
//! `{"combined_context": ..., "documents": [{"text", "similarity_score", "metadata"}]}`
//! with documents ordered by similarity, best first.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::embedding::{cosine_similarity, embed_one, EmbeddingProvider, OpenAIProvider};
use crate::models::{RetrievalResult, RetrievedDocument};
use crate::store::Store;
use crate::tokenize::{Tokenizer, REPORTING_ENCODING};

/// Retrieval parameters.
pub struct RetrieveOptions<'a> {
    pub collection: &'a str,
    pub top_n: usize,
    pub preview_chars: usize,
}

/// First `max_chars` characters of `text`.
fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub async fn retrieve(
    store: &Store,
    provider: &dyn EmbeddingProvider,
    query: &str,
    opts: &RetrieveOptions<'_>,
) -> Result<RetrievalResult> {
    let query_embedding = embed_one(provider, query)
        .await
        .context("Error computing query embedding")?;
    tracing::info!(
        "Computed embedding: dimension = {}, first 5 values = {:?}",
        query_embedding.len(),
        &query_embedding[..query_embedding.len().min(5)]
    );

    if store.get_or_create_collection(opts.collection).await? {
        tracing::info!("Collection '{}' not found. Created it.", opts.collection);
    }
    let matches = store
        .query(opts.collection, &query_embedding, opts.top_n)
        .await?;

    let tokenizer = Tokenizer::for_encoding(REPORTING_ENCODING)?;
    let mut documents = Vec::with_capacity(matches.len());
    for (i, m) in matches.into_iter().enumerate() {
        let chunk_name = m
            .metadata
            .get("chunk_file")
            .and_then(|c| c.as_str())
            .unwrap_or("<unknown>")
            .to_string();

        let candidate = if m.embedding.is_empty() {
            embed_one(provider, &m.document).await?
        } else {
            m.embedding
        };
        let similarity = cosine_similarity(&query_embedding, &candidate) as f64;
        let tokens = tokenizer.count(&m.document);
        tracing::info!(
            "Document {} chunk='{}' similarity={:.3} tokens={}",
            i,
            chunk_name,
            similarity,
            tokens
        );

        documents.push(RetrievedDocument {
            text: m.document,
            similarity_score: similarity,
            metadata: m.metadata,
        });
    }

    documents.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let combined_context = documents
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    tracing::info!(
        "Merged doc (truncated {} chars): {}",
        opts.preview_chars,
        preview(&combined_context, opts.preview_chars)
    );
    tracing::info!(
        "Merged doc token count: {}",
        tokenizer.count(&combined_context)
    );

    Ok(RetrievalResult {
        combined_context,
        documents,
    })
}

/// `courier query`: print the retrieval result as pretty JSON.
pub async fn run_query(config: &Config, text: &str, top_n: Option<usize>) -> Result<()> {
    let provider = OpenAIProvider::from_config(&config.openai, None)?;
    let store = Store::open(&config.store).await?;
    let opts = RetrieveOptions {
        collection: &config.store.collection,
        top_n: top_n.unwrap_or(config.retrieval.top_n).max(1),
        preview_chars: config.retrieval.preview_chars,
    };

    let result = retrieve(&store, &provider, text, &opts).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::models::StoreItem;
    use async_trait::async_trait;

    /// Embeds "alpha" along x, "beta" along y, anything else diagonally.
    struct AxisProvider;

    #[async_trait]
    impl EmbeddingProvider for AxisProvider {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| match t.as_str() {
                    "alpha" => vec![1.0, 0.0],
                    "beta" => vec![0.0, 1.0],
                    _ => vec![1.0, 1.0],
                })
                .collect())
        }
    }

    async fn store_with(items: &[(&str, Vec<f32>)]) -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(&StoreConfig {
            path: tmp.path().join("q.sqlite"),
            ..StoreConfig::default()
        })
        .await
        .unwrap();
        let items: Vec<StoreItem> = items
            .iter()
            .map(|(text, v)| StoreItem {
                document: text.to_string(),
                embedding: v.clone(),
                metadata: serde_json::json!({ "chunk_file": format!("{}.txt", text) }),
            })
            .collect();
        if !items.is_empty() {
            store.add("docs", &items).await.unwrap();
        }
        (tmp, store)
    }

    fn opts(top_n: usize) -> RetrieveOptions<'static> {
        RetrieveOptions {
            collection: "docs",
            top_n,
            preview_chars: 100,
        }
    }

    #[tokio::test]
    async fn results_sorted_and_combined() {
        let (_tmp, store) = store_with(&[
            ("about beta", vec![0.1, 1.0]),
            ("about alpha", vec![1.0, 0.05]),
            ("mixed", vec![1.0, 1.0]),
        ])
        .await;

        let result = retrieve(&store, &AxisProvider, "alpha", &opts(2)).await.unwrap();
        assert_eq!(result.documents.len(), 2);
        assert_eq!(result.documents[0].text, "about alpha");
        assert_eq!(result.documents[1].text, "mixed");
        assert!(result.documents[0].similarity_score > result.documents[1].similarity_score);
        assert_eq!(result.combined_context, "about alpha\nmixed");
        assert_eq!(result.documents[0].metadata["chunk_file"], "about alpha.txt");
    }

    #[tokio::test]
    async fn missing_collection_yields_empty_result() {
        let (_tmp, store) = store_with(&[]).await;
        let result = retrieve(&store, &AxisProvider, "alpha", &opts(3)).await.unwrap();
        assert!(result.documents.is_empty());
        assert_eq!(result.combined_context, "");
        assert_eq!(store.list_collections().await.unwrap().len(), 1);
    }

    #[test]
    fn output_shape() {
        let result = RetrievalResult {
            combined_context: "a".into(),
            documents: vec![RetrievedDocument {
                text: "a".into(),
                similarity_score: 0.5,
                metadata: serde_json::json!({"token_count": 1}),
            }],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["combined_context"], "a");
        assert_eq!(json["documents"][0]["similarity_score"], 0.5);
        assert_eq!(json["documents"][0]["metadata"]["token_count"], 1);
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("hi", 10), "hi");
    }
}
