//! TOML configuration.
//!
//! Every section has serde defaults matching the values the tools were
//! originally tuned with, so an empty file (or no file at all) yields a
//! working configuration. [`load_config`] validates the parsed values.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "./config/courier.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAIConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAIConfig {
    #[serde(default = "default_api_key_file")]
    pub api_key_file: PathBuf,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key_file: default_api_key_file(),
            base_url: default_openai_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_file() -> PathBuf {
    PathBuf::from("openai_api.key")
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl OpenAIConfig {
    /// Resolve the API key: `OPENAI_API_KEY` wins, then the key file.
    pub fn api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                return Ok(key.trim().to_string());
            }
        }
        let key = std::fs::read_to_string(&self.api_key_file).with_context(|| {
            format!(
                "OPENAI_API_KEY not set and key file unreadable: {}",
                self.api_key_file.display()
            )
        })?;
        let key = key.trim().to_string();
        if key.is_empty() {
            bail!("API key file is empty: {}", self.api_key_file.display());
        }
        tracing::info!("API key loaded from {}", self.api_key_file.display());
        Ok(key)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            collection: default_collection(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/courier.sqlite")
}
fn default_collection() -> String {
    "text_embeddings".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_include_glob")]
    pub include_glob: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            encoding: default_encoding(),
            output_dir: default_output_dir(),
            include_glob: default_include_glob(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    150
}
fn default_encoding() -> String {
    "cl100k_base".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("chunks")
}
fn default_include_glob() -> String {
    "*.txt".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_top_n() -> usize {
    3
}
fn default_preview_chars() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct GmailConfig {
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_service_account_file")]
    pub service_account_file: PathBuf,
    #[serde(default = "default_gmail_api_base")]
    pub api_base: String,
    #[serde(default = "default_pubsub_base")]
    pub pubsub_base: String,
    #[serde(default = "default_oauth_port")]
    pub oauth_port: u16,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_subscription")]
    pub subscription: String,
    #[serde(default = "default_emails_file")]
    pub emails_file: PathBuf,
    #[serde(default = "default_signature_file")]
    pub signature_file: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            token_file: default_token_file(),
            service_account_file: default_service_account_file(),
            api_base: default_gmail_api_base(),
            pubsub_base: default_pubsub_base(),
            oauth_port: default_oauth_port(),
            label: default_label(),
            project_id: None,
            topic: default_topic(),
            subscription: default_subscription(),
            emails_file: default_emails_file(),
            signature_file: default_signature_file(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("credentials.json")
}
fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}
fn default_service_account_file() -> PathBuf {
    PathBuf::from("service_account.json")
}
fn default_gmail_api_base() -> String {
    "https://gmail.googleapis.com/gmail/v1".to_string()
}
fn default_pubsub_base() -> String {
    "https://pubsub.googleapis.com/v1".to_string()
}
fn default_oauth_port() -> u16 {
    8080
}
fn default_label() -> String {
    "autoreply".to_string()
}
fn default_topic() -> String {
    "autoreply".to_string()
}
fn default_subscription() -> String {
    "autoreply-sub".to_string()
}
fn default_emails_file() -> PathBuf {
    PathBuf::from("emails.json")
}
fn default_signature_file() -> PathBuf {
    PathBuf::from("signature.html")
}
fn default_poll_interval_secs() -> u64 {
    5
}

impl GmailConfig {
    fn project(&self) -> Result<&str> {
        self.project_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("gmail.project_id must be set for watch notifications"))
    }

    /// Fully qualified Pub/Sub topic name, e.g. `projects/p/topics/autoreply`.
    pub fn topic_path(&self) -> Result<String> {
        Ok(format!("projects/{}/topics/{}", self.project()?, self.topic))
    }

    /// Fully qualified Pub/Sub subscription name.
    pub fn subscription_path(&self) -> Result<String> {
        Ok(format!(
            "projects/{}/subscriptions/{}",
            self.project()?,
            self.subscription
        ))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load and validate a configuration file.
///
/// A missing file at [`DEFAULT_CONFIG_PATH`] is not an error: the defaults
/// are used instead. Any other unreadable path is.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }
    crate::tokenize::check_encoding(&config.chunking.encoding)?;

    if config.retrieval.top_n < 1 {
        bail!("retrieval.top_n must be >= 1");
    }
    if config.openai.batch_size < 1 {
        bail!("openai.batch_size must be >= 1");
    }
    if config.store.collection.trim().is_empty() {
        bail!("store.collection must not be empty");
    }

    Ok(())
}
