//! Blocking I/O Prohibition
//!
//! **Policy**: the engine never blocks the async executor on I/O. HTTP goes
//! through `reqwest`'s async client; conversation saves run on the blocking
//! pool through the storage writer.
//!
//! Blocking file access is confined to the storage backends (driven by the
//! storage writer) and configuration loading (once, at startup). Even there
//! it never appears inside an `async fn`.

use std::fs;

use architectural_enforcement::{
    in_async_fn, production_lines, rust_files, workspace_root, Violation,
};

const ENGINE_DIR: &str = "streamchat/core/src";

const BLOCKING_IO_PATTERNS: &[&str] = &[
    "std::fs",
    "std::net",
    "std::process::Command",
    "reqwest::blocking",
    "std::io::stdin()",
    "std::io::stdout()",
];

/// Files allowed to use blocking file I/O from synchronous functions
const BLOCKING_IO_FILES: &[&str] = &["storage.rs", "config/mod.rs"];

fn find_blocking_io() -> Vec<Violation> {
    let mut violations = Vec::new();

    for path in rust_files(&workspace_root().join(ENGINE_DIR)) {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let allowed = BLOCKING_IO_FILES.iter().any(|file| path.ends_with(file));
        let lines: Vec<&str> = content.lines().collect();

        for (line, code) in production_lines(&content) {
            if !BLOCKING_IO_PATTERNS.iter().any(|p| code.contains(p)) {
                continue;
            }
            if allowed && !in_async_fn(&lines, line - 1) {
                continue;
            }
            violations.push(Violation {
                path: path.clone(),
                line,
                text: code.trim().to_string(),
            });
        }
    }

    violations
}

#[test]
fn test_no_blocking_io_in_engine() {
    let violations = find_blocking_io();

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in engine code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse async I/O, or hand the work to the storage writer (spawn_blocking).");

        panic!("Found {} blocking I/O violation(s)", violations.len());
    }
}

#[test]
fn test_blocking_io_files_exist() {
    let engine = workspace_root().join(ENGINE_DIR);
    for file in BLOCKING_IO_FILES {
        assert!(engine.join(file).exists(), "{file} is listed but missing");
    }
}
