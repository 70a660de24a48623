//! Integration Test: Retry Prohibition
//!
//! **Policy**: Provider backends MUST NOT retry. A failure before streaming is
//! returned to the caller exactly once as a request error; a failure during
//! streaming ends the session with whatever was parsed. Retrying would
//! duplicate provider calls and could replay half an answer.

use architectural_enforcement::{find_violations, BACKEND_DIR};

fn mentions_retry(code: &str) -> bool {
    let lower = code.to_lowercase();
    lower.contains("retry") || lower.contains("backoff") || lower.contains("retries")
}

#[test]
fn test_no_retry_in_backends() {
    let violations = find_violations(&[BACKEND_DIR], mentions_retry);

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Retry logic found in provider backends!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        panic!(
            "\nFound {} retry violation(s) in backend code.\nSurface the error instead.",
            violations.len()
        );
    }
}

#[test]
fn test_detector_matches_retry_forms() {
    assert!(mentions_retry("for attempt in 0..MAX_RETRIES {"));
    assert!(mentions_retry("let delay = backoff.next_delay();"));
    assert!(!mentions_retry("let response = check_status(response).await?;"));
}
