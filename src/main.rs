//! # Courier CLI (`courier`)
//!
//! One binary for the chat, embedding-pipeline and mailbox tools.
//!
//! ## Usage
//!
//! ```bash
//! courier --config ./config/courier.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `courier init` | Create the vector store database |
//! | `courier chat` | Ask the chat model a question |
//! | `courier tokens` | Count the tokens in a file |
//! | `courier dedup` | Remove repeated sentences from a file |
//! | `courier chunk` | Split a file into overlapping token windows |
//! | `courier embed` | Embed a directory of chunks into a CSV |
//! | `courier store import` | Load an embeddings CSV into the store |
//! | `courier store embed` | Embed a directory straight into the store |
//! | `courier store stats` | Show collections and record counts |
//! | `courier query` | Retrieve the best-matching chunks for a question |
//! | `courier gmail auth` | Authorize mailbox access |
//! | `courier gmail read` | Read filtered messages into a JSON file |
//! | `courier gmail reply` | Reply to messages from that file |
//! | `courier gmail watch` | Log new messages in a label |
//! | `courier gmail autoreply` | Draft acknowledgements for new messages |
//!
//! ## Examples
//!
//! ```bash
//! courier chunk --input book.txt --chunk-size 800 --overlap 100
//! courier embed --input-dir chunks --output-file embeddings.csv
//! courier store import --csv embeddings.csv
//! courier query --text "What does chapter two argue?"
//! courier gmail read --label INBOX --unread
//! courier gmail reply --recipient ann@example.com --response "Thanks" --draft
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use courier::gmail::read::ReadFilters;
use courier::gmail::reply::ReplyArgs;
use courier::{chat, chunk, config, dedup, embed_cmd, gmail, ingest, logging, migrate, query, stats, tokenize};

/// Courier: chat, embeddings, retrieval and mailbox tools.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/courier.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "courier",
    about = "Courier: chat, embeddings, retrieval and mailbox tools",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the vector store schema. Safe to run repeatedly.
    Init,

    /// Send a prompt to the chat model and print `{"text": ...}`.
    Chat {
        /// User prompt.
        #[arg(long)]
        input: String,

        /// Optional system prompt.
        #[arg(long)]
        system: Option<String>,

        /// Chat model (defaults to `openai.chat_model`).
        #[arg(long)]
        model: Option<String>,
    },

    /// Count the tokens in a text file.
    Tokens {
        #[arg(long)]
        input: PathBuf,

        /// Also print the token ids.
        #[arg(long)]
        show_tokens: bool,

        /// tiktoken encoding (defaults to `chunking.encoding`).
        #[arg(long)]
        encoding: Option<String>,
    },

    /// Deduplicate repeated sentences, writing `<name>_deduplicated.<ext>`.
    Dedup {
        #[arg(long)]
        input: PathBuf,

        /// Duplicates shown per review page.
        #[arg(long, default_value_t = 30)]
        page_size: usize,

        /// Deduplicate every repeated sentence without prompting.
        #[arg(long)]
        all: bool,
    },

    /// Split a text file into overlapping token chunks.
    Chunk {
        #[arg(long)]
        input: PathBuf,

        /// Directory for chunk files (defaults to `chunking.output_dir`).
        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Embed every chunk file in a directory into a CSV.
    Embed {
        /// Directory of chunk files (defaults to `chunking.output_dir`).
        #[arg(long)]
        input_dir: Option<PathBuf>,

        #[arg(long, default_value = "embeddings.csv")]
        output_file: PathBuf,

        /// Embedding model (defaults to `openai.embedding_model`).
        #[arg(long)]
        model: Option<String>,
    },

    /// Manage the vector store collection.
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Retrieve the chunks closest to a question.
    Query {
        #[arg(long)]
        text: String,

        /// Number of chunks to return (defaults to `retrieval.top_n`).
        #[arg(long)]
        top_n: Option<usize>,
    },

    /// Gmail tools.
    Gmail {
        #[command(subcommand)]
        action: GmailAction,
    },

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// Load an embeddings CSV (`chunk_file,token_count,embedding`).
    Import {
        #[arg(long, default_value = "embeddings.csv")]
        csv: PathBuf,

        /// Where relative chunk file names are looked up (defaults to `chunking.output_dir`).
        #[arg(long)]
        chunks_dir: Option<PathBuf>,

        /// Append instead of clearing the collection first.
        #[arg(long)]
        keep: bool,
    },

    /// Embed a directory of chunk files directly into the collection.
    Embed {
        #[arg(long)]
        input_dir: Option<PathBuf>,

        #[arg(long)]
        model: Option<String>,

        /// Append, skipping files whose text is already stored.
        #[arg(long)]
        keep: bool,
    },

    /// Show collections and record counts.
    Stats,
}

#[derive(Subcommand)]
enum GmailAction {
    /// Authorize and print the account address.
    Auth,

    /// Read filtered messages; prints JSON and saves it to a file.
    Read {
        /// Label to filter by (e.g. INBOX, STARRED).
        #[arg(long)]
        label: Option<String>,

        #[arg(long)]
        unread: bool,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        sender: Option<String>,

        /// Output file (defaults to `gmail.emails_file`).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Reply to each email in a JSON file (or `-` for stdin).
    Reply {
        #[arg(long)]
        recipient: String,

        /// Email details JSON (defaults to `gmail.emails_file`).
        #[arg(long)]
        original: Option<String>,

        /// Response text or HTML.
        #[arg(long)]
        response: Option<String>,

        /// JSON array of CC addresses.
        #[arg(long)]
        cc: Option<String>,

        /// Append a signature; without a value uses `gmail.signature_file`.
        #[arg(long, num_args = 0..=1)]
        signature: Option<Option<PathBuf>>,

        /// Sets an `X-Label` header.
        #[arg(long)]
        label: Option<String>,

        /// Save as an unread draft instead of sending.
        #[arg(long)]
        draft: bool,
    },

    /// Watch a label and log messages added to it.
    Watch {
        #[arg(long)]
        label: Option<String>,
    },

    /// Watch a label and draft an acknowledgement for each unread message.
    Autoreply {
        #[arg(long)]
        label: Option<String>,

        /// Remove UNREAD from messages once drafted.
        #[arg(long)]
        mark_read: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "courier", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging, cli.verbose);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg.store).await?;
            println!("Database initialized successfully.");
        }
        Commands::Chat {
            input,
            system,
            model,
        } => {
            chat::run_chat(&cfg, &input, system.as_deref(), model.as_deref()).await?;
        }
        Commands::Tokens {
            input,
            show_tokens,
            encoding,
        } => {
            let encoding = encoding.unwrap_or_else(|| cfg.chunking.encoding.clone());
            tokenize::run_tokens(&input, &encoding, show_tokens)?;
        }
        Commands::Dedup {
            input,
            page_size,
            all,
        } => {
            dedup::run_dedup(&input, page_size, all)?;
        }
        Commands::Chunk {
            input,
            output_dir,
            chunk_size,
            overlap,
        } => {
            chunk::run_chunk(
                &input,
                &output_dir.unwrap_or_else(|| cfg.chunking.output_dir.clone()),
                chunk_size.unwrap_or(cfg.chunking.chunk_size),
                overlap.unwrap_or(cfg.chunking.overlap),
                &cfg.chunking.encoding,
            )?;
        }
        Commands::Embed {
            input_dir,
            output_file,
            model,
        } => {
            let input_dir = input_dir.unwrap_or_else(|| cfg.chunking.output_dir.clone());
            embed_cmd::run_embed(&cfg, &input_dir, &output_file, model.as_deref()).await?;
        }
        Commands::Store { action } => match action {
            StoreAction::Import {
                csv,
                chunks_dir,
                keep,
            } => {
                let chunks_dir = chunks_dir.unwrap_or_else(|| cfg.chunking.output_dir.clone());
                ingest::run_import(&cfg, &csv, &chunks_dir, keep).await?;
            }
            StoreAction::Embed {
                input_dir,
                model,
                keep,
            } => {
                let input_dir = input_dir.unwrap_or_else(|| cfg.chunking.output_dir.clone());
                ingest::run_store_embed(&cfg, &input_dir, model.as_deref(), keep).await?;
            }
            StoreAction::Stats => {
                stats::run_stats(&cfg).await?;
            }
        },
        Commands::Query { text, top_n } => {
            query::run_query(&cfg, &text, top_n).await?;
        }
        Commands::Gmail { action } => match action {
            GmailAction::Auth => {
                gmail::run_auth(&cfg).await?;
            }
            GmailAction::Read {
                label,
                unread,
                subject,
                sender,
                output,
            } => {
                let filters = ReadFilters {
                    label: label.as_deref(),
                    unread,
                    subject: subject.as_deref(),
                    sender: sender.as_deref(),
                    output: output.as_deref(),
                };
                gmail::read::run_read(&cfg, filters).await?;
            }
            GmailAction::Reply {
                recipient,
                original,
                response,
                cc,
                signature,
                label,
                draft,
            } => {
                let args = ReplyArgs {
                    recipient: &recipient,
                    original: original.as_deref(),
                    response: response.as_deref(),
                    cc: cc.as_deref(),
                    signature: signature.as_ref().map(|s| s.as_deref()),
                    label: label.as_deref(),
                    draft,
                };
                gmail::reply::run_reply(&cfg, args).await?;
            }
            GmailAction::Watch { label } => {
                gmail::watch::run_watch(&cfg, label.as_deref()).await?;
            }
            GmailAction::Autoreply { label, mark_read } => {
                gmail::watch::run_autoreply(&cfg, label.as_deref(), mark_read).await?;
            }
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}
