//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async production code MUST NOT use blocking I/O.
//! **Required**: Use `tokio::fs` and `tokio::io`, not `std::fs` or `std::net`.
//! **Exceptions**: Non-async functions (config loading before the copy starts)
//! and test code.

use architectural_enforcement::{is_in_async_function, report, scan};

#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = scan(|lines, idx, code| {
        if !is_in_async_function(lines, idx) {
            return None;
        }
        if code.contains("std::fs::") {
            Some("Blocking file I/O")
        } else if code.contains("std::net::") {
            Some("Blocking network I/O")
        } else if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
            Some("Blocking stdin/stdout in async")
        } else if code.contains("std::process::Command") {
            Some("Blocking process I/O")
        } else {
            None
        }
    });

    report(
        "CRITICAL: Blocking I/O calls found in async production code!",
        &violations,
        &[
            "❌ FORBIDDEN: std::fs, std::net, std::io::stdin()/stdout() inside async fn",
            "✅ REQUIRED: tokio::fs::OpenOptions, tokio::io::stdin()/stdout()",
            "✅ ACCEPTABLE: blocking calls in non-async functions and tests",
        ],
    );
}

#[test]
fn test_no_blocking_mutex_in_async_code() {
    // The ring lock is synchronous and must never be taken directly in async code
    let violations = scan(|lines, idx, code| {
        (is_in_async_function(lines, idx) && code.contains("std::sync::Mutex"))
            .then_some("Blocking std mutex in async")
    });

    report(
        "CRITICAL: std::sync::Mutex used inside async production code!",
        &violations,
        &["✅ REQUIRED: parking_lot::Mutex behind a sync method, or tokio::sync::Mutex"],
    );
}
