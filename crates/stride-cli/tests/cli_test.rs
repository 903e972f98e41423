//! End-to-end tests for the `stride` binary.
//!
//! Each test points `XDG_CONFIG_HOME` at a fresh temporary directory so no
//! real config file is read or written.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

fn stride(config_home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_stride"));
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env_remove("STRIDE_MODEL_PATH")
        .env_remove("STRIDE_DIALECT")
        .env_remove("STRIDE_BACKEND")
        .env("RUST_LOG", "warn");
    cmd
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "stride failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

// -----------------------------------------------------------------------
// resolve
// -----------------------------------------------------------------------

#[test]
fn resolve_without_engine_uses_command_parser() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = stride(tmp.path())
        .args(["--backend", "none", "resolve", "add task \"Buy milk\" tomorrow"])
        .output()
        .unwrap();

    let value = stdout_json(&output);
    assert_eq!(value["source"], "fallback");
    assert_eq!(value["action"]["action"], "create_task");
    assert_eq!(value["action"]["data"]["taskTitle"], "Buy milk");
    assert_eq!(value["action"]["data"]["dueDate"], "tomorrow");
}

#[test]
fn resolve_with_keyword_engine_uses_model_output() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = stride(tmp.path())
        .args([
            "--backend",
            "keyword",
            "--model",
            "/models/tiny.gguf",
            "resolve",
            "create goal \"Learn Rust\"",
        ])
        .output()
        .unwrap();

    let value = stdout_json(&output);
    assert_eq!(value["source"], "model");
    assert_eq!(value["action"]["action"], "create_goal");
    assert_eq!(value["action"]["data"]["goalTitle"], "Learn Rust");
}

#[test]
fn resolve_blank_text_asks_to_rephrase() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = stride(tmp.path())
        .args(["resolve", "   "])
        .output()
        .unwrap();

    let value = stdout_json(&output);
    assert_eq!(value["source"], "rephrase");
    assert_eq!(value["action"]["action"], "reply");
}

#[test]
fn unresolvable_request_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    let output = stride(tmp.path())
        .args(["--backend", "none", "resolve", "tell me a joke"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not resolve"), "stderr: {stderr}");
}

// -----------------------------------------------------------------------
// prompt / parse
// -----------------------------------------------------------------------

#[test]
fn prompt_includes_context_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let context = tmp.path().join("context.toml");
    std::fs::write(
        &context,
        "[[goals]]\ntitle = \"Learn Guitar\"\ndaily_minutes = 20\nend_date = \"2026-12-31\"\n",
    )
    .unwrap();

    let output = stride(tmp.path())
        .args(["prompt", "how am i doing?", "--context"])
        .arg(&context)
        .output()
        .unwrap();

    assert!(output.status.success());
    let prompt = String::from_utf8_lossy(&output.stdout);
    assert!(prompt.contains("Learn Guitar"), "prompt: {prompt}");
    assert!(prompt.contains("how am i doing?"), "prompt: {prompt}");
}

#[test]
fn parse_reads_model_output_from_stdin() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut child = stride(tmp.path())
        .arg("parse")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"Here you go: {"action":"show_progress","message":"","data":{}}"#)
        .unwrap();

    let value = stdout_json(&child.wait_with_output().unwrap());
    assert_eq!(value["strict"], true);
    assert_eq!(value["action"]["action"], "show_progress");
}

// -----------------------------------------------------------------------
// init / info
// -----------------------------------------------------------------------

#[test]
fn init_writes_config_and_refuses_to_overwrite() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("stride").join("config.toml");

    let first = stride(tmp.path())
        .args(["--model", "/models/a.gguf", "init"])
        .output()
        .unwrap();
    assert!(first.status.success());
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("/models/a.gguf"), "config: {written}");

    let second = stride(tmp.path()).arg("init").output().unwrap();
    assert!(!second.status.success());

    let forced = stride(tmp.path()).args(["init", "--force"]).output().unwrap();
    assert!(forced.status.success());
}

#[test]
fn info_reads_config_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().join("stride");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("config.toml"),
        "[model]\npath = \"/models/b.gguf\"\ndialect = \"llama\"\n\n[backend]\nkind = \"keyword\"\n",
    )
    .unwrap();

    let output = stride(tmp.path()).args(["info", "--load"]).output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("keyword"), "stdout: {stdout}");
    assert!(stdout.contains("/models/b.gguf"), "stdout: {stdout}");
    assert!(stdout.contains("llama"), "stdout: {stdout}");
    assert!(stdout.contains("\"contextSize\": 2048"), "stdout: {stdout}");
}
