//! Loading documents into the vector store.
//!
//! Two entry points feed a collection:
//! - `courier store import` reads a precomputed embeddings CSV (as written by
//!   `courier embed`) and the chunk files it names.
//! - `courier store embed` embeds a directory of chunk files directly,
//!   L2-normalizing each vector before storage.
//!
//! Both clear the target collection first unless `--keep` is given.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::chunk::hash_text;
use crate::config::Config;
use crate::embed_cmd::{embed_files, word_count};
use crate::embedding::{l2_normalize, EmbeddingProvider, NormSummary, OpenAIProvider};
use crate::models::StoreItem;
use crate::progress;
use crate::scan;
use crate::store::Store;

const REQUIRED_COLUMNS: [&str; 3] = ["chunk_file", "token_count", "embedding"];

/// Parse an embedding column: a JSON (or Python) list literal of floats.
pub fn parse_embedding(raw: &str) -> Result<Vec<f32>> {
    let values: Vec<f64> = serde_json::from_str(raw.trim())
        .with_context(|| format!("not a list of numbers: {:.40}", raw))?;
    Ok(values.into_iter().map(|v| v as f32).collect())
}

/// Resolve a `chunk_file` entry as given, else under `chunks_dir`.
fn resolve_chunk_file(chunk_file: &str, chunks_dir: &Path) -> Option<PathBuf> {
    let direct = PathBuf::from(chunk_file);
    if direct.is_file() {
        return Some(direct);
    }
    let alt = chunks_dir.join(chunk_file);
    alt.is_file().then_some(alt)
}

/// Read an embeddings CSV into store items.
///
/// Rows with an unparsable embedding or a missing/unreadable chunk file are
/// logged and skipped. Metadata is `{token_count, chunk_file}` with the
/// resolved chunk path.
pub fn load_csv(csv_path: &Path, chunks_dir: &Path) -> Result<Vec<StoreItem>> {
    tracing::info!("Loading embeddings from CSV file: {}", csv_path.display());
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let headers = reader.headers()?.clone();
    let mut columns = [0usize; 3];
    for (slot, name) in columns.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h.trim() == name)
            .with_context(|| {
                format!(
                    "CSV file must contain the columns: {}",
                    REQUIRED_COLUMNS.join(", ")
                )
            })?;
    }
    let [file_col, count_col, embedding_col] = columns;

    let mut items = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("Error reading CSV row {}: {}", index, e);
                continue;
            }
        };
        let chunk_file = record.get(file_col).unwrap_or_default();
        let token_count: i64 = match record.get(count_col).unwrap_or_default().trim().parse() {
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Error parsing token_count at row {}: {}", index, e);
                continue;
            }
        };
        let embedding = match parse_embedding(record.get(embedding_col).unwrap_or_default()) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("Error parsing embedding at row {}: {:#}", index, e);
                continue;
            }
        };
        let Some(path) = resolve_chunk_file(chunk_file, chunks_dir) else {
            tracing::error!(
                "Chunk file '{}' does not exist (row {}).",
                chunk_file,
                index
            );
            continue;
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t.trim().to_string(),
            Err(e) => {
                tracing::error!(
                    "Error reading file '{}' at row {}: {}",
                    path.display(),
                    index,
                    e
                );
                continue;
            }
        };

        items.push(StoreItem {
            document: text,
            embedding,
            metadata: serde_json::json!({
                "token_count": token_count,
                "chunk_file": path.display().to_string(),
            }),
        });
    }

    tracing::info!("Successfully loaded {} embeddings from CSV.", items.len());
    Ok(items)
}

async fn prepare_collection(store: &Store, collection: &str, keep: bool) -> Result<()> {
    store.get_or_create_collection(collection).await?;
    tracing::info!("Using collection: '{}'", collection);
    if !keep {
        let removed = store.clear_collection(collection).await?;
        if removed > 0 {
            tracing::info!(
                "Cleared {} existing records from '{}'.",
                removed,
                collection
            );
        }
    }
    Ok(())
}

/// `courier store import`: load an embeddings CSV into the collection.
pub async fn run_import(
    config: &Config,
    csv_path: &Path,
    chunks_dir: &Path,
    keep: bool,
) -> Result<()> {
    if !csv_path.is_file() {
        bail!("CSV file not found: {}", csv_path.display());
    }
    let items = load_csv(csv_path, chunks_dir)?;
    if items.is_empty() {
        bail!("No valid embeddings loaded from {}", csv_path.display());
    }

    let collection = &config.store.collection;
    let store = Store::open(&config.store).await?;
    prepare_collection(&store, collection, keep).await?;
    let ids = store.add(collection, &items).await?;
    tracing::info!(
        "Added {} items to the '{}' collection.",
        ids.len(),
        collection
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "collection": collection,
            "added": ids.len(),
            "total": store.count(collection).await?,
        }))?
    );
    store.close().await;
    Ok(())
}

/// Embed `files`, normalize, and build store items. Returns the items and
/// the number of files whose embedding failed.
pub async fn embed_to_items(
    provider: &dyn EmbeddingProvider,
    files: Vec<scan::TextFile>,
    batch_size: usize,
) -> (Vec<StoreItem>, usize) {
    let reporter = progress::reporter_for_tty();
    let (embedded, failed) = embed_files(provider, files, batch_size, reporter.as_ref()).await;

    let mut summary = NormSummary::default();
    let items: Vec<StoreItem> = embedded
        .into_iter()
        .map(|(file, raw)| {
            let (normalized, before, after) = l2_normalize(&raw);
            summary.record(before, after);
            let token_count = word_count(&file.text);
            tracing::debug!("Processed '{}' (~{} words).", file.name, token_count);
            StoreItem {
                metadata: serde_json::json!({
                    "chunk_file": file.name,
                    "token_count": token_count,
                }),
                document: file.text,
                embedding: normalized,
            }
        })
        .collect();

    if summary.count() > 0 {
        summary.log();
    }
    (items, failed)
}

/// Outcome of embedding a directory into a collection.
#[derive(Debug, Default, PartialEq)]
pub struct EmbedOutcome {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Embed `files` into `collection`. Texts are trimmed, matching what
/// `store import` stores, so `keep` recognises chunks from either path by
/// their content hash.
pub async fn embed_into_store(
    store: &Store,
    collection: &str,
    provider: &dyn EmbeddingProvider,
    files: Vec<scan::TextFile>,
    batch_size: usize,
    keep: bool,
) -> Result<EmbedOutcome> {
    prepare_collection(store, collection, keep).await?;

    let mut outcome = EmbedOutcome::default();
    let mut fresh = Vec::with_capacity(files.len());
    for mut file in files {
        file.text = file.text.trim().to_string();
        if keep && store.contains_hash(collection, &hash_text(&file.text)).await? {
            tracing::debug!("Skipping already stored '{}'", file.name);
            outcome.skipped += 1;
        } else {
            fresh.push(file);
        }
    }
    if fresh.is_empty() {
        return Ok(outcome);
    }

    let (items, failed) = embed_to_items(provider, fresh, batch_size).await;
    outcome.failed = failed;
    if items.is_empty() {
        tracing::warn!("No embeddings to store.");
    } else {
        outcome.added = store.add(collection, &items).await?.len();
        tracing::info!(
            "Added {} items to the '{}' collection.",
            outcome.added,
            collection
        );
    }
    Ok(outcome)
}

/// `courier store embed`: embed a directory of chunk files into the collection.
pub async fn run_store_embed(
    config: &Config,
    input_dir: &Path,
    model: Option<&str>,
    keep: bool,
) -> Result<()> {
    tracing::info!("Reading chunk files from: {}", input_dir.display());
    let files = scan::read_text_files(input_dir, &config.chunking.include_glob)?;
    if files.is_empty() {
        tracing::warn!(
            "No files matching '{}' in {}",
            config.chunking.include_glob,
            input_dir.display()
        );
    }

    let provider = OpenAIProvider::from_config(&config.openai, model)?;
    tracing::info!("Using embedding model {}", provider.model_name());

    let collection = &config.store.collection;
    let store = Store::open(&config.store).await?;
    let outcome = embed_into_store(
        &store,
        collection,
        &provider,
        files,
        config.openai.batch_size,
        keep,
    )
    .await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "collection": collection,
            "added": outcome.added,
            "skipped": outcome.skipped,
            "failed": outcome.failed,
            "total": store.count(collection).await?,
        }))?
    );
    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use async_trait::async_trait;

    /// Returns `[len, 0]` for every text, rejecting any batch with an empty one.
    struct LengthProvider;

    #[async_trait]
    impl EmbeddingProvider for LengthProvider {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.is_empty()) {
                bail!("empty input");
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
        }
    }

    fn text_file(name: &str, text: &str) -> scan::TextFile {
        scan::TextFile {
            path: name.into(),
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    async fn temp_store(dir: &Path) -> Store {
        Store::open(&StoreConfig {
            path: dir.join("store.sqlite"),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    #[test]
    fn parses_list_literals() {
        assert_eq!(parse_embedding("[0.5, -1, 2e-1]").unwrap(), vec![0.5, -1.0, 0.2]);
        assert_eq!(parse_embedding(" [] ").unwrap(), Vec::<f32>::new());
        assert!(parse_embedding("not a list").is_err());
        assert!(parse_embedding("[0.1, 'x']").is_err());
    }

    #[test]
    fn load_csv_resolves_and_skips() {
        let tmp = tempfile::tempdir().unwrap();
        let chunks = tmp.path().join("chunks");
        std::fs::create_dir(&chunks).unwrap();
        std::fs::write(chunks.join("a_chunk_001.txt"), "  first chunk \n").unwrap();
        std::fs::write(chunks.join("a_chunk_002.txt"), "second").unwrap();

        let csv_path = tmp.path().join("embeddings.csv");
        std::fs::write(
            &csv_path,
            "chunk_file,token_count,embedding\n\
             a_chunk_001.txt,2,\"[0.1, 0.2]\"\n\
             missing.txt,1,\"[0.3, 0.4]\"\n\
             a_chunk_002.txt,1,\"oops\"\n\
             a_chunk_002.txt,1,\"[1.0, 0.0]\"\n",
        )
        .unwrap();

        let items = load_csv(&csv_path, &chunks).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].document, "first chunk");
        assert_eq!(items[0].embedding, vec![0.1, 0.2]);
        assert_eq!(items[0].metadata["token_count"], 2);
        assert!(items[0].metadata["chunk_file"]
            .as_str()
            .unwrap()
            .ends_with("a_chunk_001.txt"));
        assert_eq!(items[1].document, "second");
    }

    #[test]
    fn load_csv_requires_columns() {
        let tmp = tempfile::tempdir().unwrap();
        let csv_path = tmp.path().join("bad.csv");
        std::fs::write(&csv_path, "file,embedding\nx,[1]\n").unwrap();
        let err = load_csv(&csv_path, tmp.path()).unwrap_err();
        assert!(err.to_string().contains("chunk_file"));
    }

    #[tokio::test]
    async fn embedded_items_are_normalized_with_metadata() {
        let files = vec![text_file("a_chunk_001.txt", "two words")];
        let (items, failed) = embed_to_items(&LengthProvider, files, 8).await;
        assert_eq!(failed, 0);
        assert_eq!(items[0].embedding, vec![1.0, 0.0]);
        assert_eq!(items[0].metadata["chunk_file"], "a_chunk_001.txt");
        assert_eq!(items[0].metadata["token_count"], 2);
        assert_eq!(items[0].document, "two words");
    }

    #[tokio::test]
    async fn keep_skips_chunks_already_imported() {
        let tmp = tempfile::tempdir().unwrap();
        let chunks = tmp.path().join("chunks");
        std::fs::create_dir(&chunks).unwrap();
        std::fs::write(chunks.join("a_chunk_001.txt"), "old chunk\n").unwrap();
        let csv_path = tmp.path().join("embeddings.csv");
        std::fs::write(
            &csv_path,
            "chunk_file,token_count,embedding\na_chunk_001.txt,2,\"[0.0, 1.0]\"\n",
        )
        .unwrap();

        let store = temp_store(tmp.path()).await;
        let imported = load_csv(&csv_path, &chunks).unwrap();
        store.add("notes", &imported).await.unwrap();

        let files = vec![
            text_file("a_chunk_001.txt", "old chunk\n"),
            text_file("a_chunk_002.txt", "new chunk here\n"),
            text_file("a_chunk_003.txt", "   "),
        ];
        let outcome = embed_into_store(&store, "notes", &LengthProvider, files, 64, true)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EmbedOutcome {
                added: 1,
                skipped: 1,
                failed: 1,
            }
        );
        assert_eq!(store.count("notes").await.unwrap(), 2);
        assert!(store
            .contains_hash("notes", &hash_text("new chunk here"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn without_keep_the_collection_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let store = temp_store(tmp.path()).await;
        let files = || vec![text_file("a.txt", "alpha"), text_file("b.txt", "beta")];

        embed_into_store(&store, "notes", &LengthProvider, files(), 1, false)
            .await
            .unwrap();
        let outcome = embed_into_store(&store, "notes", &LengthProvider, files(), 1, false)
            .await
            .unwrap();
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(store.count("notes").await.unwrap(), 2);
    }
}
