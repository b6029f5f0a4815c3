use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::embedding::{embed_one, EmbeddingProvider, OpenAIProvider};
use crate::models::EmbeddingRecord;
use crate::progress::{self, EmbedProgressEvent, ProgressReporter};
use crate::scan::{self, TextFile};

/// Approximate token count: whitespace-separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Embed files in batches of `batch_size`.
///
/// When a batch is rejected its files are retried one at a time, so only the
/// files that fail on their own are skipped. Returns the embedded files
/// paired with their vectors, in input order, plus the failure count.
pub async fn embed_files(
    provider: &dyn EmbeddingProvider,
    files: Vec<TextFile>,
    batch_size: usize,
    reporter: &dyn ProgressReporter,
) -> (Vec<(TextFile, Vec<f32>)>, usize) {
    let total = files.len() as u64;
    reporter.report(EmbedProgressEvent::Discovered { total });

    let mut embedded = Vec::with_capacity(files.len());
    let mut failed = 0usize;
    let mut done = 0u64;

    for batch in files.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|f| f.text.clone()).collect();
        match provider.embed(&texts).await {
            Ok(vectors) => {
                for (file, vec) in batch.iter().zip(vectors) {
                    accept(provider, file, vec, &mut embedded);
                }
            }
            Err(e) if batch.len() == 1 => {
                tracing::error!("Error embedding {}: {:#}", batch[0].name, e);
                failed += 1;
            }
            Err(e) => {
                tracing::warn!(
                    "Batch of {} files rejected ({:#}); embedding one at a time",
                    batch.len(),
                    e
                );
                for file in batch {
                    match embed_one(provider, &file.text).await {
                        Ok(vec) => accept(provider, file, vec, &mut embedded),
                        Err(e) => {
                            tracing::error!("Error embedding {}: {:#}", file.name, e);
                            failed += 1;
                        }
                    }
                }
            }
        }
        done += batch.len() as u64;
        reporter.report(EmbedProgressEvent::Embedding { n: done, total });
    }

    (embedded, failed)
}

fn accept(
    provider: &dyn EmbeddingProvider,
    file: &TextFile,
    vec: Vec<f32>,
    embedded: &mut Vec<(TextFile, Vec<f32>)>,
) {
    let expected = provider.dims();
    if expected > 0 && vec.len() != expected {
        tracing::warn!(
            "{}: got {} dimensions, {} expects {}",
            file.name,
            vec.len(),
            provider.model_name(),
            expected
        );
    }
    tracing::info!("Processed {}", file.name);
    embedded.push((file.clone(), vec));
}

/// Write `chunk_file,token_count,embedding` rows; the embedding column holds
/// a JSON array.
pub fn write_csv(path: &Path, records: &[EmbeddingRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["chunk_file", "token_count", "embedding"])?;
    for record in records {
        writer.write_record([
            record.chunk_file.clone(),
            record.token_count.to_string(),
            serde_json::to_string(&record.embedding)?,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// `courier embed`: embed every text file in a directory into a CSV.
pub async fn run_embed(
    config: &Config,
    input_dir: &Path,
    output_file: &Path,
    model: Option<&str>,
) -> Result<()> {
    let files = scan::read_text_files(input_dir, &config.chunking.include_glob)?;
    tracing::info!(
        "Found {} files matching '{}' in {}",
        files.len(),
        config.chunking.include_glob,
        input_dir.display()
    );

    let provider = OpenAIProvider::from_config(&config.openai, model)?;
    tracing::info!("Using embedding model {}", provider.model_name());

    let reporter = progress::reporter_for_tty();
    let (embedded, failed) = embed_files(
        &provider,
        files,
        config.openai.batch_size,
        reporter.as_ref(),
    )
    .await;

    let records: Vec<EmbeddingRecord> = embedded
        .into_iter()
        .map(|(file, embedding)| EmbeddingRecord {
            token_count: word_count(&file.text),
            chunk_file: file.name,
            embedding,
        })
        .collect();

    if records.is_empty() {
        tracing::warn!("No embeddings were generated; nothing written");
    } else {
        write_csv(output_file, &records)?;
        tracing::info!(
            "Saved {} embeddings to {}",
            records.len(),
            output_file.display()
        );
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "output_file": output_file.display().to_string(),
            "embedded": records.len(),
            "failed": failed,
        }))?
    );
    Ok(())
}
