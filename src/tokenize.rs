//! BPE tokenization via `tiktoken-rs`.
//!
//! Token counts here are the same ones the OpenAI models see, which is what
//! chunk sizing and context budgeting are measured in.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tiktoken_rs::CoreBPE;

/// Encodings understood by [`Tokenizer::for_encoding`].
pub const ENCODINGS: &[&str] = &["cl100k_base", "o200k_base", "p50k_base", "r50k_base", "gpt2"];

/// Encoding used for the similarity log lines and merged-context budget.
pub const REPORTING_ENCODING: &str = "gpt2";

pub struct Tokenizer {
    name: String,
    bpe: CoreBPE,
}

impl Tokenizer {
    /// Load a tokenizer by encoding name (`cl100k_base`, `o200k_base`, ...).
    pub fn for_encoding(name: &str) -> Result<Self> {
        let bpe = match name {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "r50k_base" | "gpt2" => tiktoken_rs::r50k_base(),
            other => bail!(
                "Unknown encoding: '{}'. Supported: {}",
                other,
                ENCODINGS.join(", ")
            ),
        }
        .with_context(|| format!("failed to load encoding {}", name))?;

        Ok(Self {
            name: name.to_string(),
            bpe,
        })
    }

    /// Load the tokenizer a model uses, falling back to `gpt2` for unknown models.
    pub fn for_model(model: &str) -> Result<Self> {
        match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Ok(Self {
                name: model.to_string(),
                bpe,
            }),
            Err(_) => Self::for_encoding("gpt2"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encode text to token ids. Special-token markup is treated as plain text.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| t as u32)
            .collect()
    }

    pub fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Decode token ids. Fails if the ids do not form valid UTF-8 on their own,
    /// which happens when a slice starts or ends inside a multi-byte character.
    pub fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.bpe
            .decode(tokens.iter().map(|&t| t as _).collect())
            .map_err(|e| anyhow::anyhow!("token decode failed: {}", e))
    }
}

/// Validate an encoding name without loading its ranks.
pub fn check_encoding(name: &str) -> Result<()> {
    if ENCODINGS.contains(&name) {
        Ok(())
    } else {
        bail!(
            "Unknown encoding: '{}'. Supported: {}",
            name,
            ENCODINGS.join(", ")
        )
    }
}

/// `courier tokens`: count (and optionally print) the tokens of a file.
pub fn run_tokens(input: &Path, encoding: &str, show_tokens: bool) -> Result<()> {
    if !input.is_file() {
        bail!("Input file not found: {}", input.display());
    }

    tracing::info!("Reading input file: {}", input.display());
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Error reading file {}", input.display()))?;

    tracing::info!("Tokenizing text...");
    let tokenizer = Tokenizer::for_encoding(encoding)?;
    let tokens = tokenizer.encode(&text);
    tracing::info!("Tokenization complete. Total tokens: {}", tokens.len());

    if show_tokens {
        println!("{}", serde_json::to_string(&tokens)?);
    } else {
        println!("{}", tokens.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_matches_encode_len() {
        let tok = Tokenizer::for_encoding("cl100k_base").unwrap();
        let text = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(tok.count(text), tok.encode(text).len());
        assert!(tok.count(text) > 5);
    }

    #[test]
    fn encode_decode_ascii() {
        let tok = Tokenizer::for_encoding("cl100k_base").unwrap();
        let text = "hello world, this is a test";
        let ids = tok.encode(text);
        assert_eq!(tok.decode(&ids).unwrap(), text);
    }

    #[test]
    fn empty_text_has_no_tokens() {
        let tok = Tokenizer::for_encoding("cl100k_base").unwrap();
        assert_eq!(tok.count(""), 0);
    }

    #[test]
    fn unknown_encoding_errors() {
        assert!(Tokenizer::for_encoding("nope").is_err());
        assert!(check_encoding("nope").is_err());
        assert!(check_encoding("cl100k_base").is_ok());
    }

    #[test]
    fn unknown_model_falls_back_to_gpt2() {
        let tok = Tokenizer::for_model("definitely-not-a-model").unwrap();
        assert_eq!(tok.name(), "gpt2");
    }
}
