//! Panic Prohibition
//!
//! **Policy**: production code propagates errors with `Result` and `?`;
//! `unwrap()` and `expect()` are for tests only.

use architectural_enforcement::{find_patterns, production_dirs};

#[test]
fn test_no_unwrap_or_expect_in_production_code() {
    let violations = find_patterns(&production_dirs(), &[".unwrap()", ".expect("]);

    if !violations.is_empty() {
        for violation in &violations {
            eprintln!("  {violation}");
        }
        panic!(
            "Found {} unwrap/expect call(s) in production code",
            violations.len()
        );
    }
}
