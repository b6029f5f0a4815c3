//! Sentence-level deduplication.
//!
//! Sentences that occur more than once are offered for review in pages; for
//! every sentence selected, only its first occurrence survives. Unselected
//! duplicates and unique sentences are kept as they are. The result is
//! written beside the input as `<stem>_deduplicated<.ext>`, one sentence per
//! line.

use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use unicode_segmentation::UnicodeSegmentation;

/// Split text into sentences on Unicode sentence boundaries (UAX #29).
/// Sentences are trimmed; empty ones are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.unicode_sentences()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Sentences occurring more than once with their frequency, most frequent
/// first. Equal frequencies keep first-occurrence order.
pub fn find_duplicates(sentences: &[String]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for s in sentences {
        let count = counts.entry(s.as_str()).or_insert(0);
        if *count == 0 {
            order.push(s.as_str());
        }
        *count += 1;
    }

    let mut duplicates: Vec<(String, usize)> = order
        .into_iter()
        .filter_map(|s| {
            let c = counts[s];
            (c > 1).then(|| (s.to_string(), c))
        })
        .collect();
    // Stable sort keeps first-occurrence order among ties.
    duplicates.sort_by(|a, b| b.1.cmp(&a.1));
    duplicates
}

/// Keep only the first occurrence of each selected sentence; join with `\n`.
pub fn apply_dedup(sentences: &[String], selected: &HashSet<String>) -> String {
    let mut seen: HashSet<&str> = HashSet::new();
    sentences
        .iter()
        .filter(|s| !selected.contains(s.as_str()) || seen.insert(s.as_str()))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

/// `<dir>/<stem>_deduplicated<.ext>`.
pub fn output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}_deduplicated.{}", stem, ext.to_string_lossy()),
        None => format!("{}_deduplicated", stem),
    };
    input.with_file_name(name)
}

/// Picks which duplicates in a page to deduplicate.
pub trait DuplicateSelector {
    /// Returns the selected indices within `page`, or `None` to stop
    /// reviewing (the rest of the duplicates are kept).
    fn select(
        &mut self,
        page: &[(String, usize)],
        page_no: usize,
        pages: usize,
    ) -> Result<Option<Vec<usize>>>;
}

/// Selects every duplicate without prompting.
pub struct SelectAll;

impl DuplicateSelector for SelectAll {
    fn select(
        &mut self,
        page: &[(String, usize)],
        _page_no: usize,
        _pages: usize,
    ) -> Result<Option<Vec<usize>>> {
        Ok(Some((0..page.len()).collect()))
    }
}

/// Terminal multi-select: Space toggles, `a` toggles all, Enter confirms the
/// page, Esc or `q` stops reviewing.
pub struct InteractiveSelector;

impl DuplicateSelector for InteractiveSelector {
    fn select(
        &mut self,
        page: &[(String, usize)],
        page_no: usize,
        pages: usize,
    ) -> Result<Option<Vec<usize>>> {
        let labels: Vec<String> = page
            .iter()
            .map(|(s, freq)| {
                let short: String = s.chars().take(80).collect();
                format!("[freq={}] {}", freq, short.replace('\n', " "))
            })
            .collect();

        let selection = dialoguer::MultiSelect::with_theme(
            &dialoguer::theme::ColorfulTheme::default(),
        )
        .with_prompt(format!(
            "Page {}/{}: select sentences to deduplicate (Space toggles, Enter confirms, Esc stops)",
            page_no, pages
        ))
        .items(&labels)
        .interact_opt()
        .context("Interactive selection failed")?;
        Ok(selection)
    }
}

/// Walk the duplicates page by page, collecting selected sentences.
pub fn review(
    duplicates: &[(String, usize)],
    page_size: usize,
    selector: &mut dyn DuplicateSelector,
) -> Result<HashSet<String>> {
    let page_size = page_size.max(1);
    let pages = duplicates.len().div_ceil(page_size);
    let mut selected = HashSet::new();

    for (i, page) in duplicates.chunks(page_size).enumerate() {
        match selector.select(page, i + 1, pages)? {
            Some(indices) => {
                for idx in indices {
                    if let Some((sentence, _)) = page.get(idx) {
                        selected.insert(sentence.clone());
                    }
                }
            }
            None => {
                tracing::info!("Review stopped at page {}; remaining duplicates kept", i + 1);
                break;
            }
        }
    }
    Ok(selected)
}

/// `courier dedup`.
pub fn run_dedup(input: &Path, page_size: usize, all: bool) -> Result<()> {
    if !input.is_file() {
        bail!("The file '{}' does not exist.", input.display());
    }
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let sentences = split_sentences(&text);
    tracing::info!(
        "Loaded {} sentences from '{}'.",
        sentences.len(),
        input.display()
    );

    let duplicates = find_duplicates(&sentences);
    if duplicates.is_empty() {
        println!("No duplicates found! Exiting.");
        return Ok(());
    }
    tracing::info!("Found {} sentences with freq > 1.", duplicates.len());

    let selected = if all {
        review(&duplicates, page_size, &mut SelectAll)?
    } else {
        if !atty::is(atty::Stream::Stdin) || !atty::is(atty::Stream::Stderr) {
            bail!("Interactive review needs a terminal; pass --all to deduplicate every repeated sentence");
        }
        review(&duplicates, page_size, &mut InteractiveSelector)?
    };
    tracing::info!(
        "Selected {} sentences for deduplication...",
        selected.len()
    );

    let output = output_path(input);
    let final_text = apply_dedup(&sentences, &selected);
    std::fs::write(&output, &final_text)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!("Deduplicated text saved to: {}", output.display());

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": input.display().to_string(),
            "output": output.display().to_string(),
            "sentences": sentences.len(),
            "duplicates": duplicates.len(),
            "deduplicated": selected.len(),
        }))?
    );
    Ok(())
}
