//! Integration Test: Unused Dependency Prohibition
//!
//! **Policy**: Every crate a member manifest declares, under `[dependencies]`
//! or `[dev-dependencies]`, MUST be referenced by that member's sources or
//! tests. A dependency left behind after its last use still costs build time
//! and hides what the crate actually needs.

use std::fs;

use architectural_enforcement::workspace_root;
use walkdir::WalkDir;

/// Member crates, relative to the workspace root
const MEMBERS: &[&str] = &["advisor/core", "advisor/daemon", "cli"];

/// Crate names declared in the manifest at `member/Cargo.toml`
fn declared_dependencies(member: &str) -> Vec<String> {
    let path = workspace_root().join(member).join("Cargo.toml");
    let manifest: toml::Table = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
        .parse()
        .unwrap_or_else(|e| panic!("cannot parse {}: {e}", path.display()));

    ["dependencies", "dev-dependencies"]
        .iter()
        .filter_map(|section| manifest.get(*section).and_then(toml::Value::as_table))
        .flat_map(|table| table.keys().cloned())
        .collect()
}

/// All Rust source under the member, test code included
fn member_source(member: &str) -> String {
    WalkDir::new(workspace_root().join(member))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter_map(|entry| fs::read_to_string(entry.path()).ok())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_referenced(dependency: &str, source: &str) -> bool {
    let ident = dependency.replace('-', "_");
    source.contains(&format!("{ident}::")) || source.contains(&format!("use {ident}"))
}

#[test]
fn test_no_unused_dependencies() {
    let mut violations = Vec::new();
    for member in MEMBERS {
        let source = member_source(member);
        for dependency in declared_dependencies(member) {
            if !is_referenced(&dependency, &source) {
                violations.push(format!("{member}: {dependency}"));
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Manifests declare dependencies nothing uses!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        panic!(
            "\nFound {} unused dependency(ies).\nRemove them from the manifest.",
            violations.len()
        );
    }
}

#[test]
fn test_core_manifest_has_no_binary_only_crates() {
    let declared = declared_dependencies("advisor/core");
    for crate_name in ["anyhow", "tracing-subscriber", "tokio-stream", "tokio-test"] {
        assert!(
            !declared.iter().any(|d| d == crate_name),
            "advisor-core declares {crate_name}"
        );
    }
}

#[test]
fn test_detector_matches_reference_forms() {
    assert!(is_referenced("tower-http", "use tower_http::trace::TraceLayer;"));
    assert!(is_referenced("serde", "#[derive(serde::Serialize)]"));
    assert!(!is_referenced("tokio-stream", "use tokio::sync::mpsc;"));
}
