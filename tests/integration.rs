use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn tenders_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tenders");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    setup_test_env_with("")
}

fn setup_test_env_with(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let fixtures_dir = root.join("fixtures");
    fs::create_dir_all(&fixtures_dir).unwrap();
    fs::write(
        fixtures_dir.join("tenders.json"),
        r#"[
            {"title": "Yeni Nesil Güvenlik Duvarı Alımı", "url": "http://x/1"},
            {"title": "MADENİ YAĞ ALIMI", "url": "http://x/2"}
        ]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/tenders.sqlite"

[embedding]
provider = "disabled"

[[sources]]
slug = "fixture"
name = "Fixture Portal"
url = "file://fixture"

[sources.extractor]
kind = "json_file"
path = "{root}/fixtures/tenders.json"
{extra}
"#,
        root = root.display(),
        extra = extra,
    );

    let config_path = config_dir.join("tenders.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_tenders(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = tenders_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("SEC_SIM_THR")
        .env_remove("SEC_PROB_THR")
        .env_remove("SEC_EMB_NAME")
        .env_remove("SEC_CLF_PATH")
        .env_remove("TENDERS_DB_PATH")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tenders binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tenders(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/tenders.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_tenders(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_tenders(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sources_lists_configured_sources() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tenders(&config_path, &["sources"]);
    assert!(success, "sources failed: {}", stderr);
    assert!(stdout.contains("fixture"));
    assert!(stdout.contains("json_file"));
}

#[test]
fn test_categories() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_tenders(&config_path, &["categories"]);
    assert!(success);
    assert!(stdout.contains("bilisim_teknolojileri"));
    assert!(stdout.contains("diger"));
}

#[test]
fn test_classify_strong_signal() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tenders(
        &config_path,
        &["classify", "Yeni Nesil Güvenlik Duvarı Alımı"],
    );
    assert!(success, "classify failed: {}", stderr);
    assert!(stdout.contains("category: bilisim_teknolojileri"));
    assert!(stdout.contains("strong signal"));
}

#[test]
fn test_classify_exclusion() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_tenders(&config_path, &["classify", "MADENİ YAĞ ALIMI"]);
    assert!(success);
    assert!(stdout.contains("category: diger"));
}

#[test]
fn test_list_empty_database() {
    let (_tmp, config_path) = setup_test_env();
    run_tenders(&config_path, &["init"]);

    let (stdout, _, success) = run_tenders(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains("No tenders found."));

    let (stdout, _, success) = run_tenders(&config_path, &["list", "--json"]);
    assert!(success);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 0);
}

#[test]
fn test_list_rejects_bad_date() {
    let (_tmp, config_path) = setup_test_env();
    run_tenders(&config_path, &["init"]);

    let (_, stderr, success) = run_tenders(&config_path, &["list", "--since", "05.08.2025"]);
    assert!(!success);
    assert!(stderr.contains("YYYY-MM-DD"));
}

#[test]
fn test_recategorize_empty_database() {
    let (_tmp, config_path) = setup_test_env();
    run_tenders(&config_path, &["init"]);

    let (stdout, stderr, success) = run_tenders(&config_path, &["recategorize", "--dry-run"]);
    assert!(success, "recategorize failed: {}", stderr);
    assert!(stdout.contains("scanned: 0"));
    assert!(stdout.contains("changed: 0"));
}

#[test]
fn test_run_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_tenders(&config_path, &["run"]);
    assert!(!success);
    assert!(stderr.contains("embedding provider"));
}

#[test]
fn test_invalid_threshold_rejected() {
    let (_tmp, config_path) = setup_test_env_with("\n[relevance]\nsimilarity_threshold = 1.5\n");

    let (_, stderr, success) = run_tenders(&config_path, &["categories"]);
    assert!(!success);
    assert!(stderr.contains("similarity_threshold"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_tenders(&tmp.path().join("nope.toml"), &["sources"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
