//! Timer Prohibition
//!
//! **Policy**: production code never waits a fixed delay. Ordering between
//! steps (creating a conversation, then sending into it) is expressed by
//! sequencing calls and awaiting I/O, not by sleeping and hoping state has
//! settled. External deadlines go through session cancellation.

use architectural_enforcement::{find_patterns, production_dirs};

const TIMER_PATTERNS: &[&str] = &[
    "::sleep(",
    ".sleep(",
    "sleep_until(",
    "thread::sleep",
    "time::interval(",
];

#[test]
fn test_no_fixed_delay_timers_in_production_code() {
    let violations = find_patterns(&production_dirs(), TIMER_PATTERNS);

    if !violations.is_empty() {
        eprintln!("\nFixed-delay timers found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nSequence the operations instead (await the step that must finish first).");

        panic!("Found {} timer violation(s) in production code", violations.len());
    }
}
