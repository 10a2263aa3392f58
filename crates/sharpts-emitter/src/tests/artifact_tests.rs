//! Artifact writing: listing plus companion runtime config, with the
//! scoped commit-or-discard contract.

use sharpts_parser::parse_source;

use crate::{emit_program, write_artifact};

#[test]
fn writes_listing_and_runtime_config() {
    let program = parse_source("console.log(1);").expect("parse failed");
    let check = sharpts_checker::check(&program).expect("check failed");
    let module = emit_program(&program, &check).expect("emit failed");

    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("program.il");
    let paths = write_artifact(&module, &output).expect("write failed");

    let listing = std::fs::read_to_string(&paths.artifact).expect("listing readable");
    assert!(listing.contains(".module program"));
    assert!(listing.contains(".entry main"));
    assert!(listing.contains(".class Runtime"));

    let config = std::fs::read_to_string(&paths.config).expect("config readable");
    let parsed: serde_json::Value = serde_json::from_str(&config).expect("valid json");
    assert_eq!(parsed["entryPoint"], "main");
    assert!(
        parsed["runtimeVersion"]
            .as_str()
            .expect("version string")
            .starts_with("sharpts-runtime/")
    );

    // No temporary file is left behind after a committed write.
    assert!(!dir.path().join("program.il.tmp").exists());
}

#[test]
fn failed_write_leaves_no_partial_artifact() {
    let program = parse_source("console.log(1);").expect("parse failed");
    let check = sharpts_checker::check(&program).expect("check failed");
    let module = emit_program(&program, &check).expect("emit failed");

    // A directory that does not exist forces the failure path.
    let missing = std::path::Path::new("/nonexistent-sharpts-dir/program.il");
    let error = write_artifact(&module, missing).unwrap_err();
    assert!(error.message.contains("failed to write artifact"));
}
