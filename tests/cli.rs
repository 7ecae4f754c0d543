//! End-to-end tests of the `generate-pdf` binary over stdin/stdout.

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run_cli(input: &[u8]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_generate-pdf"))
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn generate-pdf");
    child
        .stdin
        .take()
        .expect("stdin handle")
        .write_all(input)
        .expect("write stdin");
    child.wait_with_output().expect("wait for generate-pdf")
}

#[test]
fn hello_document_converts() {
    let out = run_cli(b"<html><body><p>Hello</p></body></html>");
    assert!(out.status.success(), "exit status {:?}", out.status);
    assert!(
        out.stderr.is_empty(),
        "unexpected stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(out.stdout.starts_with(b"%PDF-"));
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.trim_end().ends_with("%%EOF"));
}

#[test]
fn empty_stdin_still_yields_a_pdf() {
    let out = run_cli(b"");
    assert!(out.status.success());
    assert!(out.stdout.starts_with(b"%PDF-"));
}

#[test]
fn arguments_are_ignored() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_generate-pdf"))
        .args(["--landscape", "out.pdf"])
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn generate-pdf");
    drop(child.stdin.take());
    let out = child.wait_with_output().expect("wait for generate-pdf");
    assert!(out.status.success());
    assert!(out.stdout.starts_with(b"%PDF-"));
}

#[test]
fn invalid_utf8_fails_with_one_line() {
    let out = run_cli(&[b'<', b'p', b'>', 0xff, 0xfe, b'<', b'/', b'p', b'>']);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.starts_with("Error generating PDF: "), "{stderr}");
    assert_eq!(stderr.trim_end().lines().count(), 1);
}
