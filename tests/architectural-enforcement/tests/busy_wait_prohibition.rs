//! Integration Test: Busy-Wait Prohibition
//!
//! Writers waiting for buffer space and readers waiting for data must park on
//! a notification, never sleep, yield in a loop or spin.
//!
//! **Policy**: Production code MUST NOT call sleep, `yield_now` or spin hints.
//! **Exceptions**: Test code (`#[cfg(test)]` modules and `tests/` directories)

use architectural_enforcement::{report, scan};

const FORBIDDEN: &[(&str, &str)] = &[
    ("::sleep(", "Sleep call"),
    (".sleep(", "Sleep call"),
    ("yield_now(", "Yield loop"),
    ("spin_loop(", "Spin hint"),
    ("std::thread::park", "Thread park"),
];

#[test]
fn test_no_busy_wait_in_production_code() {
    let violations = scan(|_, _, code| {
        FORBIDDEN
            .iter()
            .find(|(pattern, _)| code.contains(pattern))
            .map(|(_, reason)| *reason)
    });

    report(
        "CRITICAL: Busy-wait calls found in production code!",
        &violations,
        &[
            "✅ REQUIRED: wait on tokio::sync::Notify (enable, re-check, then await)",
            "✅ REQUIRED: race waits against CancellationToken::cancelled()",
            "❌ FORBIDDEN: sleep, yield_now or spin_loop to poll a predicate",
        ],
    );
}
