//! Core data types shared across the pipelines.

use serde::{Deserialize, Serialize};

/// A token window produced by the chunker.
#[derive(Debug, Clone)]
pub struct TokenChunk {
    /// 0-based position of the chunk within its source text.
    pub index: usize,
    /// First token (inclusive).
    pub start: usize,
    /// Last token (exclusive).
    pub end: usize,
    pub token_count: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// One row of the embeddings CSV: `chunk_file,token_count,embedding`.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub chunk_file: String,
    /// Approximate token count (whitespace-separated words).
    pub token_count: usize,
    pub embedding: Vec<f32>,
}

/// A (document, embedding, metadata) triple ready to be added to a collection.
#[derive(Debug, Clone)]
pub struct StoreItem {
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// A stored record returned by a nearest-neighbor lookup.
#[derive(Debug, Clone)]
pub struct StoredMatch {
    pub id: String,
    pub document: String,
    pub metadata: serde_json::Value,
    pub embedding: Vec<f32>,
    pub similarity: f32,
}

/// A candidate document in a retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub text: String,
    pub similarity_score: f64,
    pub metadata: serde_json::Value,
}

/// The JSON printed by `courier query`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetrievalResult {
    pub combined_context: String,
    pub documents: Vec<RetrievedDocument>,
}

/// Chat roles accepted by the completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Summary of one mailbox message, as printed by `courier gmail read`
/// and consumed by `courier gmail reply`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailRecord {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub time: String,
    pub label: String,
    pub unread: bool,
    /// HTML body of the message.
    pub email: String,
}
