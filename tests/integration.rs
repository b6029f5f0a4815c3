use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn courier_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("courier");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let chunks_dir = root.join("chunks");
    fs::create_dir_all(&chunks_dir).unwrap();
    fs::write(chunks_dir.join("doc_chunk_001.txt"), "Rust ownership rules.\n").unwrap();
    fs::write(chunks_dir.join("doc_chunk_002.txt"), "Borrowing and lifetimes.").unwrap();

    fs::write(
        root.join("embeddings.csv"),
        "chunk_file,token_count,embedding\n\
         doc_chunk_001.txt,3,\"[1.0, 0.0, 0.0]\"\n\
         doc_chunk_002.txt,3,\"[0.0, 1.0, 0.0]\"\n\
         missing_chunk.txt,2,\"[0.0, 0.0, 1.0]\"\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[store]
path = "{root}/data/courier.sqlite"
collection = "notes"

[chunking]
chunk_size = 8
overlap = 2
output_dir = "{root}/out"

[openai]
api_key_file = "{root}/missing.key"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("courier.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_courier(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = courier_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run courier binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn root_of(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().to_path_buf()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_courier(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(root_of(&config_path).join("data/courier.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_courier(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_courier(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_tokens_counts_file() {
    let (_tmp, config_path) = setup_test_env();
    let input = root_of(&config_path).join("hello.txt");
    fs::write(&input, "hello world").unwrap();

    let (stdout, stderr, success) =
        run_courier(&config_path, &["tokens", "--input", input.to_str().unwrap()]);
    assert!(success, "tokens failed: {}", stderr);
    assert_eq!(stdout.trim(), "2");

    let (stdout, _, success) = run_courier(
        &config_path,
        &["tokens", "--input", input.to_str().unwrap(), "--show-tokens"],
    );
    assert!(success);
    let ids: Vec<u32> = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(ids.len(), 2);
}

#[test]
fn test_tokens_missing_file() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_courier(&config_path, &["tokens", "--input", "/nonexistent.txt"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_chunk_writes_numbered_files() {
    let (_tmp, config_path) = setup_test_env();
    let root = root_of(&config_path);
    let input = root.join("book.txt");
    let text = (0..40)
        .map(|i| format!("word{}", i))
        .collect::<Vec<_>>()
        .join(" ");
    fs::write(&input, text).unwrap();

    let (stdout, stderr, success) =
        run_courier(&config_path, &["chunk", "--input", input.to_str().unwrap()]);
    assert!(success, "chunk failed: {}", stderr);

    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let chunks = summary["chunks"].as_u64().unwrap();
    assert!(chunks > 1);
    assert_eq!(summary["written"].as_u64().unwrap(), chunks);
    assert!(root.join("out/book_chunk_001.txt").exists());
    assert!(root
        .join(format!("out/book_chunk_{:03}.txt", chunks))
        .exists());
}

#[test]
fn test_chunk_rejects_overlap_not_below_size() {
    let (_tmp, config_path) = setup_test_env();
    let input = root_of(&config_path).join("x.txt");
    fs::write(&input, "some text here").unwrap();

    let (_, stderr, success) = run_courier(
        &config_path,
        &[
            "chunk",
            "--input",
            input.to_str().unwrap(),
            "--chunk-size",
            "4",
            "--overlap",
            "4",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("overlap"));
}

#[test]
fn test_dedup_all_writes_output() {
    let (_tmp, config_path) = setup_test_env();
    let root = root_of(&config_path);
    let input = root.join("notes.txt");
    fs::write(&input, "One fish. Two fish. One fish. Red fish.").unwrap();

    let (stdout, stderr, success) = run_courier(
        &config_path,
        &["dedup", "--input", input.to_str().unwrap(), "--all"],
    );
    assert!(success, "dedup failed: {}", stderr);
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["duplicates"], 1);

    let out = fs::read_to_string(root.join("notes_deduplicated.txt")).unwrap();
    assert_eq!(out, "One fish.\nTwo fish.\nRed fish.");
}

#[test]
fn test_dedup_no_duplicates() {
    let (_tmp, config_path) = setup_test_env();
    let root = root_of(&config_path);
    let input = root.join("unique.txt");
    fs::write(&input, "Alpha. Beta. Gamma.").unwrap();

    let (stdout, _, success) = run_courier(
        &config_path,
        &["dedup", "--input", input.to_str().unwrap(), "--all"],
    );
    assert!(success);
    assert!(stdout.contains("No duplicates found"));
    assert!(!root.join("unique_deduplicated.txt").exists());
}

#[test]
fn test_store_import_and_stats() {
    let (_tmp, config_path) = setup_test_env();
    let root = root_of(&config_path);
    let csv = root.join("embeddings.csv");
    let chunks = root.join("chunks");

    let (stdout, stderr, success) = run_courier(
        &config_path,
        &[
            "store",
            "import",
            "--csv",
            csv.to_str().unwrap(),
            "--chunks-dir",
            chunks.to_str().unwrap(),
        ],
    );
    assert!(success, "import failed: {}", stderr);
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["added"], 2);
    assert_eq!(summary["total"], 2);

    // Re-import without --keep replaces the collection.
    let (stdout, _, success) = run_courier(
        &config_path,
        &[
            "store",
            "import",
            "--csv",
            csv.to_str().unwrap(),
            "--chunks-dir",
            chunks.to_str().unwrap(),
        ],
    );
    assert!(success);
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["total"], 2);

    let (stdout, _, success) = run_courier(&config_path, &["store", "stats"]);
    assert!(success);
    assert!(stdout.contains("Store Stats"));
    assert!(stdout.contains("notes"));
    assert!(stdout.contains("Records:     2"));
}

#[test]
fn test_store_import_missing_csv() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_courier(
        &config_path,
        &["store", "import", "--csv", "/nonexistent/embeddings.csv"],
    );
    assert!(!success);
    assert!(stderr.contains("CSV file not found"));
}

#[test]
fn test_chat_without_api_key_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_courier(&config_path, &["chat", "--input", "hi"]);
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr: {}", stderr);
}

#[test]
fn test_gmail_read_requires_a_filter() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_courier(&config_path, &["gmail", "read"]);
    assert!(!success);
    assert!(stderr.contains("at least one"));
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[chunking]\nchunk_size = 10\noverlap = 20\n").unwrap();

    let (_, stderr, success) = run_courier(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("overlap"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let (tmp, _) = setup_test_env();
    let missing = tmp.path().join("config/none.toml");
    let (_, stderr, success) = run_courier(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_completions() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_courier(&config_path, &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("courier"));
}
