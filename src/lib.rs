//! # Courier
//!
//! Command-line glue between a chat/embeddings API, a local vector store and
//! a Gmail mailbox.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Text    │──▶│ dedup/chunk │──▶│   embed     │──▶│  SQLite  │
//! │  files   │   │ (tiktoken)  │   │  (OpenAI)   │   │  store   │
//! └──────────┘   └─────────────┘   └─────────────┘   └────┬─────┘
//!                                                         │
//!                                   ┌─────────────┐       ▼
//!                                   │    chat     │   ┌──────────┐
//!                                   │  (OpenAI)   │   │  query   │
//!                                   └─────────────┘   └──────────┘
//!
//! ┌──────────┐   ┌─────────────┐   ┌─────────────┐
//! │ Pub/Sub  │──▶│   watch     │──▶│ Gmail REST  │  read / reply / drafts
//! └──────────┘   └─────────────┘   └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | HTTP error classification and retry backoff |
//! | [`models`] | Core data types |
//! | [`tokenize`] | tiktoken encodings |
//! | [`chunk`] | Token-window chunking |
//! | [`dedup`] | Sentence deduplication |
//! | [`openai`] | OpenAI HTTP client |
//! | [`embedding`] | Embedding provider and vector utilities |
//! | [`chat`] | Chat completions |
//! | [`scan`] | Text file discovery |
//! | [`embed_cmd`] | Directory → embeddings CSV |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Vector store collections |
//! | [`ingest`] | CSV or directory → store |
//! | [`query`] | Retrieval for RAG |
//! | [`stats`] | Store statistics |
//! | [`progress`] | Embedding progress reporting |
//! | [`gmail`] | Mailbox tools |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod dedup;
pub mod embed_cmd;
pub mod embedding;
pub mod error;
pub mod gmail;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod openai;
pub mod progress;
pub mod query;
pub mod scan;
pub mod stats;
pub mod store;
pub mod tokenize;
