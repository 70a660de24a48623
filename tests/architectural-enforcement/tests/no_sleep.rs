//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the core, the daemon and the CLI MUST NOT
//! call sleep methods. Streams are driven by channel receives and socket
//! reads; a timer in the loop only adds latency.
//!
//! **Exceptions**: test code.

use architectural_enforcement::{find_violations, PRODUCTION_DIRS};

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_violations(PRODUCTION_DIRS, is_sleep_call);

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Wait on the channel or socket instead (recv().await, next().await).");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

#[test]
fn test_detector_matches_sleep_forms() {
    assert!(is_sleep_call("tokio::time::sleep(Duration::from_millis(10)).await;"));
    assert!(is_sleep_call("std::thread::sleep(d);"));
    assert!(is_sleep_call("time::sleep_until(deadline).await;"));
    assert!(!is_sleep_call("let asleep = false;"));
}
