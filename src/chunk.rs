//! Overlapping token-window chunker.
//!
//! Splits text into [`TokenChunk`]s of at most `chunk_size` tokens, each
//! window starting `chunk_size - overlap` tokens after the previous one.
//! Sizes are measured with the same BPE encoding the embedding model uses,
//! so a chunk never exceeds the model's input limit.
//!
//! # Algorithm
//!
//! 1. Encode the full text to token ids.
//! 2. `start = 0`; while `start < total`, take `[start, start + chunk_size)`
//!    (clamped to `total`), decode it and emit a chunk.
//! 3. Advance `start` by `chunk_size - overlap`.
//!
//! A window edge can fall inside a multi-byte character. Such edges are
//! widened outward to the nearest token boundary that decodes cleanly, so a
//! chunk may carry up to a few extra tokens but no text is ever lost.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::models::TokenChunk;
use crate::tokenize::Tokenizer;

/// How far a window edge may be widened to reach a clean UTF-8 boundary, in tokens.
const MAX_EDGE_WIDEN: usize = 8;

/// Split `text` into overlapping token windows.
///
/// # Errors
///
/// Returns an error if `chunk_size` is zero or `overlap >= chunk_size`
/// (the window would never advance).
///
/// # Guarantees
///
/// - Empty text yields no chunks.
/// - Indices are contiguous: `0, 1, 2, …, N-1`.
/// - Every window except possibly the last spans `chunk_size` tokens.
pub fn chunk_tokens(
    tokenizer: &Tokenizer,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<TokenChunk>> {
    if chunk_size == 0 {
        bail!("chunk size must be > 0");
    }
    if overlap >= chunk_size {
        bail!(
            "overlap ({}) must be smaller than chunk size ({})",
            overlap,
            chunk_size
        );
    }

    let tokens = tokenizer.encode(text);
    let total = tokens.len();
    tracing::debug!("Total tokens in input: {}", total);

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total {
        let end = (start + chunk_size).min(total);
        let (s, e, chunk_text) = decode_window(tokenizer, &tokens, start, end)?;
        tracing::debug!(
            "Created chunk with tokens {} to {} (size: {} tokens)",
            s,
            e,
            e - s
        );
        chunks.push(make_chunk(chunks.len(), s, e, chunk_text));
        start += step;
    }

    Ok(chunks)
}

/// Decode `tokens[start..end]`, widening the edges until the slice is valid UTF-8.
fn decode_window(
    tokenizer: &Tokenizer,
    tokens: &[u32],
    start: usize,
    end: usize,
) -> Result<(usize, usize, String)> {
    for widen_start in 0..=MAX_EDGE_WIDEN.min(start) {
        for widen_end in 0..=MAX_EDGE_WIDEN.min(tokens.len() - end) {
            let s = start - widen_start;
            let e = end + widen_end;
            if let Ok(text) = tokenizer.decode(&tokens[s..e]) {
                return Ok((s, e, text));
            }
        }
    }
    bail!("could not decode token window {}..{}", start, end)
}

fn make_chunk(index: usize, start: usize, end: usize, text: String) -> TokenChunk {
    TokenChunk {
        index,
        start,
        end,
        token_count: end - start,
        hash: hash_text(&text),
        text,
    }
}

/// SHA-256 of a text, hex encoded. Used to recognise already-stored documents.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// File name for the `index`-th (0-based) chunk of `base_name`.
pub fn chunk_file_name(base_name: &str, index: usize) -> String {
    format!("{}_chunk_{:03}.txt", base_name, index + 1)
}

/// Write each chunk to `<dir>/<base>_chunk_NNN.txt`.
///
/// Returns the number of files written; individual write failures are
/// logged and skipped.
pub fn write_chunks(dir: &Path, base_name: &str, chunks: &[TokenChunk]) -> Result<usize> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        tracing::info!("Created output directory: {}", dir.display());
    }

    let mut written = 0usize;
    for chunk in chunks {
        let path: PathBuf = dir.join(chunk_file_name(base_name, chunk.index));
        match std::fs::write(&path, &chunk.text) {
            Ok(()) => {
                written += 1;
                tracing::debug!("Wrote chunk {} to {}", chunk.index + 1, path.display());
            }
            Err(e) => tracing::error!("Error writing chunk {}: {}", chunk.index + 1, e),
        }
    }
    Ok(written)
}

/// `courier chunk`: split a file into overlapping chunk files.
pub fn run_chunk(
    input: &Path,
    output_dir: &Path,
    chunk_size: usize,
    overlap: usize,
    encoding: &str,
) -> Result<()> {
    tracing::info!("Input file: {}", input.display());
    tracing::info!("Output directory: {}", output_dir.display());
    tracing::info!("Chunk size: {} tokens", chunk_size);
    tracing::info!("Overlap: {} tokens", overlap);

    if !input.is_file() {
        bail!("Input file not found: {}", input.display());
    }
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file {}", input.display()))?;

    let tokenizer = Tokenizer::for_encoding(encoding)?;
    let before = tokenizer.count(&text);
    tracing::info!("Token count before chunking: {} tokens", before);

    let chunks = chunk_tokens(&tokenizer, &text, chunk_size, overlap)?;
    tracing::info!(
        "Created {} chunks (each {} tokens with {} overlap) in memory.",
        chunks.len(),
        chunk_size,
        overlap
    );

    let after: usize = chunks.iter().map(|c| tokenizer.count(&c.text)).sum();
    tracing::info!("Sum of tokens across all chunks: {}", after);

    let base_name = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string());
    let written = write_chunks(output_dir, &base_name, &chunks)?;
    tracing::info!("Wrote {} chunks to {}", written, output_dir.display());

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": input.display().to_string(),
            "output_dir": output_dir.display().to_string(),
            "tokens_before": before,
            "tokens_after": after,
            "chunks": chunks.len(),
            "written": written,
        }))?
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok() -> Tokenizer {
        Tokenizer::for_encoding("cl100k_base").unwrap()
    }

    fn long_text() -> String {
        (0..200)
            .map(|i| format!("Sentence number {} talks about a topic.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn empty_text_no_chunks() {
        let chunks = chunk_tokens(&tok(), "", 10, 2).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_tokens(&tok(), "Hello, world!", 1000, 150).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].start, 0);
    }

    #[test]
    fn windows_advance_by_step() {
        let t = tok();
        let text = long_text();
        let total = t.count(&text);
        let chunks = chunk_tokens(&t, &text, 100, 20).unwrap();

        let expected = total.div_ceil(80);
        assert_eq!(chunks.len(), expected);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.start, i * 80);
            assert!(c.token_count <= 100);
        }
        assert_eq!(chunks.last().unwrap().end, total);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let t = tok();
        let text = long_text();
        let chunks = chunk_tokens(&t, &text, 50, 10).unwrap();
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2).filter(|p| p[0].token_count == 50) {
            assert_eq!(pair[0].end - pair[1].start, 10);
        }
    }

    #[test]
    fn zero_overlap_partitions_text() {
        let t = tok();
        let text = long_text();
        let chunks = chunk_tokens(&t, &text, 64, 0).unwrap();
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn multibyte_text_decodes() {
        let t = tok();
        let text = "Příliš žluťoučký kůň úpěl ďábelské ódy. 日本語のテキストも含まれています。".repeat(10);
        let chunks = chunk_tokens(&t, &text, 7, 2).unwrap();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(chunk_tokens(&tok(), "abc", 0, 0).is_err());
        assert!(chunk_tokens(&tok(), "abc", 10, 10).is_err());
        assert!(chunk_tokens(&tok(), "abc", 10, 11).is_err());
    }

    #[test]
    fn deterministic_hashes() {
        let t = tok();
        let text = long_text();
        let a = chunk_tokens(&t, &text, 40, 5).unwrap();
        let b = chunk_tokens(&t, &text, 40, 5).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.hash, y.hash);
        }
    }

    #[test]
    fn file_names_are_one_based_and_padded() {
        assert_eq!(chunk_file_name("doc", 0), "doc_chunk_001.txt");
        assert_eq!(chunk_file_name("doc", 41), "doc_chunk_042.txt");
        assert_eq!(chunk_file_name("doc", 1233), "doc_chunk_1234.txt");
    }

    #[test]
    fn write_chunks_creates_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("out");
        let chunks = chunk_tokens(&tok(), &long_text(), 100, 10).unwrap();
        let written = write_chunks(&dir, "big", &chunks).unwrap();
        assert_eq!(written, chunks.len());
        let first = std::fs::read_to_string(dir.join("big_chunk_001.txt")).unwrap();
        assert_eq!(first, chunks[0].text);
    }
}
