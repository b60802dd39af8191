use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docpass_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docpass");
    path
}

const HEADER: &str = "#pragma once\n\nnamespace geo {\n\nstruct Point {\n  double x;\n  double y;\n};\n\ndouble distance(const Point& a, const Point& b);\n\n}  // namespace geo\n";

fn setup_test_env(extra_config: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files_dir = root.join("include");
    fs::create_dir_all(files_dir.join("detail")).unwrap();
    fs::write(files_dir.join("geo.h"), HEADER).unwrap();
    fs::write(
        files_dir.join("detail/math.h"),
        "inline int square(int v) {\n  return v * v;\n}\n",
    )
    .unwrap();
    fs::write(files_dir.join("geo.cpp"), "#include \"geo.h\"\n").unwrap();
    fs::create_dir_all(files_dir.join(".git")).unwrap();
    fs::write(files_dir.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();

    let config_content = format!(
        r#"[model]
provider = "echo"

[chunking]
max_units = 40
{}
"#,
        extra_config
    );

    let config_path = root.join("docpass.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docpass(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docpass_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docpass binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_tasks_lists_builtins() {
    let (_tmp, config_path) = setup_test_env("");
    let (stdout, stderr, success) = run_docpass(&config_path, &["tasks"]);
    assert!(success, "tasks failed: {}", stderr);
    assert!(stdout.contains("doxygen"));
    assert!(stdout.contains("clean-text"));
    assert!(stdout.contains("stop-reason"));
}

#[test]
fn test_split_check() {
    let (tmp, config_path) = setup_test_env("");
    let header = tmp.path().join("include/geo.h");

    let (stdout, stderr, success) =
        run_docpass(&config_path, &["split", header.to_str().unwrap(), "--check"]);
    assert!(success, "split failed: {}", stderr);
    assert!(stdout.contains("policy=code"));
    assert!(stdout.contains("#1"));
    assert!(stdout.contains("rejoin check: passed"));
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_run_single_file_with_echo() {
    let (tmp, config_path) = setup_test_env("");
    let header = tmp.path().join("include/geo.h");

    let (stdout, stderr, success) = run_docpass(&config_path, &["run", header.to_str().unwrap()]);
    assert!(success, "run failed: {}\n{}", stdout, stderr);
    assert!(stdout.trim_end().ends_with("ok"));

    let output = tmp.path().join("include/geo_doxygen.h");
    assert_eq!(fs::read_to_string(output).unwrap(), HEADER);
}

#[test]
fn test_run_single_file_explicit_output() {
    let (tmp, config_path) = setup_test_env("");
    let header = tmp.path().join("include/detail/math.h");
    let out = tmp.path().join("out/math.h");

    let (_stdout, stderr, success) = run_docpass(
        &config_path,
        &["run", header.to_str().unwrap(), "-o", out.to_str().unwrap()],
    );
    assert!(success, "run failed: {}", stderr);
    assert_eq!(
        fs::read_to_string(out).unwrap(),
        "inline int square(int v) {\n  return v * v;\n}\n"
    );
}

#[test]
fn test_run_directory_mirrors_and_resumes() {
    let (tmp, config_path) = setup_test_env("");
    let input = tmp.path().join("include");
    let out_root = tmp.path().join("include_doxygen");

    let (stdout, stderr, success) = run_docpass(&config_path, &["run", input.to_str().unwrap()]);
    assert!(success, "run failed: {}\n{}", stdout, stderr);
    assert!(stdout.contains("documents: 2"), "{}", stdout);

    assert_eq!(fs::read_to_string(out_root.join("geo.h")).unwrap(), HEADER);
    assert!(out_root.join("detail/math.h").exists());
    assert!(out_root.join("geo.cpp").exists());
    assert!(!out_root.join(".git").exists());

    // A second run finds every output in place.
    let (stdout, stderr, success) = run_docpass(&config_path, &["run", input.to_str().unwrap()]);
    assert!(success, "rerun failed: {}", stderr);
    assert!(stdout.contains("documents: 0"), "{}", stdout);
    assert!(stdout.contains("skipped (output exists): 2"), "{}", stdout);
}

#[test]
fn test_run_clean_text_task() {
    let (tmp, config_path) = setup_test_env("");
    let notes = tmp.path().join("notes.txt");
    let body = "Results are shown in Table 1. The method converges quickly!";
    fs::write(&notes, body).unwrap();

    let (stdout, stderr, success) = run_docpass(
        &config_path,
        &[
            "run",
            notes.to_str().unwrap(),
            "--task",
            "clean-text",
            "--max-chunk-units",
            "1000",
        ],
    );
    assert!(success, "run failed: {}\n{}", stdout, stderr);
    assert_eq!(
        fs::read_to_string(tmp.path().join("notes_cleaned.txt")).unwrap(),
        body
    );
}

#[test]
fn test_debug_dir_artifacts() {
    let (tmp, config_path) = setup_test_env("");
    let header = tmp.path().join("include/detail/math.h");
    let debug = tmp.path().join("debug");

    let (_stdout, stderr, success) = run_docpass(
        &config_path,
        &[
            "run",
            header.to_str().unwrap(),
            "--debug-dir",
            debug.to_str().unwrap(),
        ],
    );
    assert!(success, "run failed: {}", stderr);

    let dir = debug.join("math.h");
    assert!(dir.join("chunk_001_before.txt").exists());
    assert!(dir.join("chunk_001_fragment_01.txt").exists());
    assert!(dir.join("chunk_001_after.txt").exists());
    assert!(dir.join("manifest.json").exists());
}

#[test]
fn test_json_progress_on_stderr() {
    let (tmp, config_path) = setup_test_env("");
    let header = tmp.path().join("include/geo.h");

    let (stdout, stderr, success) = run_docpass(
        &config_path,
        &["--progress", "json", "run", header.to_str().unwrap()],
    );
    assert!(success, "run failed: {}", stderr);
    assert!(!stdout.contains("\"event\""));

    let events: Vec<serde_json::Value> = stderr
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();
    assert_eq!(events.first().unwrap()["event"], "document_started");
    assert_eq!(events.last().unwrap()["event"], "document_finished");
    assert_eq!(events.last().unwrap()["ok"], true);
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");
    let (stdout, stderr, success) = run_docpass(&missing, &["tasks"]);
    assert!(success, "tasks failed: {}", stderr);
    assert!(stdout.contains("doxygen"));
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env("");
    fs::write(&config_path, "[chunking]\nmax_units = 0\n").unwrap();
    let (_stdout, stderr, success) = run_docpass(&config_path, &["split", "whatever.h"]);
    assert!(!success);
    assert!(stderr.contains("max_units"), "{}", stderr);
}

#[test]
fn test_unknown_provider_fails() {
    let (tmp, config_path) = setup_test_env("");
    let header = tmp.path().join("include/geo.h");
    let (_stdout, _stderr, success) = run_docpass(
        &config_path,
        &["run", header.to_str().unwrap(), "--provider", "bard"],
    );
    assert!(!success);
    assert!(!tmp.path().join("include/geo_doxygen.h").exists());
}

#[test]
fn test_missing_input_fails() {
    let (tmp, config_path) = setup_test_env("");
    let missing = tmp.path().join("missing.h");
    let (_stdout, stderr, success) = run_docpass(&config_path, &["run", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("does not exist"), "{}", stderr);
}

#[test]
fn test_extract_rejects_broken_pdf() {
    let (tmp, config_path) = setup_test_env("");
    let pdf = tmp.path().join("broken.pdf");
    fs::write(&pdf, b"not a pdf").unwrap();
    let (_stdout, _stderr, success) = run_docpass(&config_path, &["extract", pdf.to_str().unwrap()]);
    assert!(!success);
    assert!(!tmp.path().join("broken.txt").exists());
}

#[test]
fn test_run_json_protocol_with_echo() {
    let (tmp, config_path) = setup_test_env("");
    let header = tmp.path().join("include/geo.h");

    let (stdout, stderr, success) = run_docpass(
        &config_path,
        &["run", header.to_str().unwrap(), "--protocol", "json"],
    );
    assert!(success, "run failed: {}\n{}", stdout, stderr);
    assert_eq!(
        fs::read_to_string(tmp.path().join("include/geo_doxygen.h")).unwrap(),
        HEADER
    );
}

#[test]
fn test_relative_output_inside_input_is_not_rewalked() {
    let (tmp, config_path) = setup_test_env("");
    let run_from_root = || {
        Command::new(docpass_binary())
            .current_dir(tmp.path())
            .arg("--config")
            .arg(&config_path)
            .args(["run", "include", "-o", "include/out"])
            .output()
            .unwrap()
    };

    let first = run_from_root();
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    let second = run_from_root();
    assert!(second.status.success(), "{}", String::from_utf8_lossy(&second.stderr));

    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(stdout.contains("documents: 0"), "{}", stdout);
    assert_eq!(
        fs::read_to_string(tmp.path().join("include/out/geo.h")).unwrap(),
        HEADER
    );
    assert!(!tmp.path().join("include/out/out").exists());
}
