//! Integration tests for the scan engine: dispatch order, fail-fast
//! behaviour, report shape and the scratch workspace.

mod helpers;

use helpers::{analyzer_for, new_log, scan_report, MemFs, RecordingPlugin, TestEnv};
use serde_json::json;
use std::fs;

use fwaudit::analyzer::{Analyzer, AnalyzerType, FindingValue};
use fwaudit::config::GlobalConfig;
use fwaudit::digest::sha256_bytes;
use fwaudit::error::AnalyzerError;

fn small_tree() -> MemFs {
    MemFs::new()
        .file("/a", 0o644, "alpha")
        .dir("/d", 0o755)
        .file("/d/b", 0o600, "bravo")
}

// =============================================================================
// Dispatch
// =============================================================================

#[test]
fn test_dispatch_order_follows_registration_and_walk() {
    let log = new_log();
    let mut analyzer = analyzer_for(small_tree());
    analyzer.add_plugin(Box::new(RecordingPlugin::new("P1", &log)));
    analyzer.add_plugin(Box::new(RecordingPlugin::new("P2", &log)));

    analyzer.run_plugins().unwrap();

    let expected = [
        "P1.start",
        "P2.start",
        "P1.check:/",
        "P2.check:/",
        "P1.check:/a",
        "P2.check:/a",
        "P1.check:/d",
        "P2.check:/d",
        "P1.check:/d/b",
        "P2.check:/d/b",
        "P1.finalize",
        "P2.finalize",
    ];
    assert_eq!(*log.borrow(), expected);
    assert_eq!(analyzer.plugin_names(), vec!["P1", "P2"]);
}

#[test]
fn test_check_file_error_stops_scan() {
    let log = new_log();
    let mut analyzer = analyzer_for(small_tree());
    analyzer.add_plugin(Box::new(RecordingPlugin::new("P1", &log).flag_everything().fail_on("/a")));
    analyzer.add_plugin(Box::new(RecordingPlugin::new("P2", &log)));

    let err = analyzer.run_plugins().unwrap_err();
    match err {
        AnalyzerError::Plugin { plugin, path, .. } => {
            assert_eq!(plugin, "P1");
            assert_eq!(path, "/a");
        }
        other => panic!("unexpected error: {other}"),
    }

    let calls = log.borrow();
    assert_eq!(calls.last().map(String::as_str), Some("P1.check:/a"));
    assert!(!calls.iter().any(|c| c == "P2.check:/a" || c.ends_with("/d") || c.ends_with("finalize")));

    // nothing from the failed run may leak out
    assert!(!analyzer.has_offenders());
    assert!(matches!(analyzer.report(), Err(AnalyzerError::Aborted)));
    assert!(matches!(analyzer.json_report(), Err(AnalyzerError::Aborted)));
}

#[test]
fn test_directory_listing_failure_is_walk_error() {
    let log = new_log();
    let mut analyzer = analyzer_for(small_tree().broken_dir("/d"));
    analyzer.add_plugin(Box::new(RecordingPlugin::new("P1", &log)));

    let err = analyzer.run_plugins().unwrap_err();
    assert!(matches!(err, AnalyzerError::Walk { ref path, .. } if path == "/d"));
    assert!(!log.borrow().iter().any(|c| c == "P1.finalize"));
    assert!(analyzer.json_report().is_err());
}

#[test]
fn test_symlinks_are_not_descended() {
    let log = new_log();
    let fs = MemFs::new().dir("/d", 0o755).file("/d/x", 0o644, "x").link("/l", "/d");
    let mut analyzer = analyzer_for(fs);
    analyzer.add_plugin(Box::new(RecordingPlugin::new("P", &log)));
    analyzer.run_plugins().unwrap();

    let checks: Vec<String> = log.borrow().iter().filter(|c| c.contains(".check:")).cloned().collect();
    assert_eq!(checks, ["P.check:/", "P.check:/d", "P.check:/d/x", "P.check:/l"]);
}

// =============================================================================
// Report
// =============================================================================

#[test]
fn test_offender_json_sniffing() {
    let mut analyzer = analyzer_for(MemFs::new());
    analyzer.add_offender("/x", "{\"a\":1}");
    analyzer.add_offender("/y", "not json");
    analyzer.add_offender("/y", "[1, 2]");

    let report = scan_report(&mut analyzer);
    assert_eq!(report["offenders"]["/x"][0]["a"], 1);
    assert_eq!(report["offenders"]["/y"][0], "not json");
    assert_eq!(report["offenders"]["/y"][1], json!([1, 2]));

    let typed = analyzer.report().unwrap();
    assert!(matches!(typed.offenders["/x"][0], FindingValue::Structured(_)));
    assert_eq!(typed.offenders["/x"][0].as_json(), Some(&json!({"a": 1})));
    assert_eq!(typed.offenders["/y"][0].as_text(), Some("not json"));
    assert_eq!(typed.offenders["/y"][0].as_json(), None);
}

#[test]
fn test_empty_maps_are_omitted() {
    let mut analyzer = analyzer_for(small_tree());
    analyzer.add_plugin(Box::new(RecordingPlugin::new("P", &new_log())));

    let report = scan_report(&mut analyzer);
    let keys: Vec<&str> = report.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, ["fs_type", "image_name"]);
    assert_eq!(report["fs_type"], "dirfs");
    assert_eq!(report["image_name"], "memfs.img");
    assert!(!analyzer.has_offenders());
}

#[test]
fn test_data_and_informational() {
    let mut analyzer = analyzer_for(MemFs::new());
    analyzer.add_data("build", "1");
    analyzer.add_data("build", "{\"id\":7}");
    analyzer.add_informational("/etc/motd", "hello");

    let report = scan_report(&mut analyzer);
    assert_eq!(report["data"]["build"]["id"], 7);
    assert_eq!(report["informational"]["/etc/motd"], json!(["hello"]));
    assert!(report.get("offenders").is_none());
}

#[test]
fn test_finalize_fragments_merged_at_top_level() {
    let log = new_log();
    let mut analyzer = analyzer_for(MemFs::new());
    analyzer.add_plugin(Box::new(
        RecordingPlugin::new("P1", &log).with_fragment(json!({"p1_result": {"ok": true}})),
    ));
    analyzer.add_plugin(Box::new(RecordingPlugin::new("P2", &log).with_fragment(json!("not an object"))));

    let report = scan_report(&mut analyzer);
    assert_eq!(report["p1_result"]["ok"], true);
    assert_eq!(report.as_object().unwrap().len(), 3);
}

#[test]
fn test_report_uses_tab_indent() {
    let mut analyzer = analyzer_for(MemFs::new());
    analyzer.run_plugins().unwrap();
    let text = analyzer.json_report().unwrap();
    assert!(text.contains("\n\t\"fs_type\": \"dirfs\""));
}

#[test]
fn test_scans_do_not_share_state() {
    let mut first = analyzer_for(MemFs::new());
    first.add_offender("/x", "bad");
    let second = analyzer_for(MemFs::new());
    assert!(first.has_offenders());
    assert!(!second.has_offenders());
}

// =============================================================================
// Image info
// =============================================================================

#[test]
fn test_image_digest_computed_when_configured() {
    let env = TestEnv::new();
    let image = env.path("rootfs.img");
    fs::write(&image, "image bytes").unwrap();

    let config = GlobalConfig {
        digest_image: true,
        ..Default::default()
    };
    let fs = MemFs::new().image_name(&image.to_string_lossy());
    let mut analyzer = Analyzer::new(Box::new(fs), &config).unwrap();

    let expected = sha256_bytes(b"image bytes");
    assert_eq!(analyzer.image_info().image_digest.as_deref(), Some(expected.as_str()));
    let report = scan_report(&mut analyzer);
    assert_eq!(report["image_digest"], expected);
}

#[test]
fn test_image_digest_skipped_for_non_file_image() {
    let env = TestEnv::new();
    let config = GlobalConfig {
        digest_image: true,
        ..Default::default()
    };
    let fs = MemFs::new().image_name(&env.dir.to_string_lossy());
    let analyzer = Analyzer::new(Box::new(fs), &config).unwrap();
    assert!(analyzer.image_info().image_digest.is_none());
}

#[test]
fn test_unsupported_backend_message() {
    let analyzer = analyzer_for(MemFs::new().unsupported());
    let err = analyzer.fs_type_supported().unwrap_err();
    assert_eq!(
        err.to_string(),
        "dirfs: requires additional tools, please refer to documentation."
    );
    assert!(analyzer_for(MemFs::new()).fs_type_supported().is_ok());
}

// =============================================================================
// Extraction and scratch workspace
// =============================================================================

fn scratch_entries(analyzer: &Analyzer) -> usize {
    fs::read_dir(analyzer.scratch_dir().unwrap()).unwrap().count()
}

#[test]
fn test_file_get_and_remove() {
    let analyzer = analyzer_for(small_tree());
    let staged = analyzer.file_get("/d/b").unwrap();

    assert!(staged.starts_with(analyzer.scratch_dir().unwrap()));
    assert_eq!(fs::read_to_string(&staged).unwrap(), "bravo");

    analyzer.remove_file(&staged).unwrap();
    assert!(!staged.exists());
    assert_eq!(scratch_entries(&analyzer), 0);
}

#[test]
fn test_remove_file_refuses_host_paths() {
    let env = TestEnv::new();
    let outside = env.path("keep.txt");
    fs::write(&outside, "host data").unwrap();

    let analyzer = analyzer_for(small_tree());
    let err = analyzer.remove_file(&outside).unwrap_err();
    assert!(matches!(err, AnalyzerError::Io(_)));
    assert!(outside.exists());

    let sneaky = analyzer.scratch_dir().unwrap().join("..").join("x");
    assert!(analyzer.remove_file(&sneaky).is_err());
}

#[test]
fn test_file_get_failure_leaves_nothing_behind() {
    let analyzer = analyzer_for(small_tree().unreadable_file("/locked", 0o600));

    let err = analyzer.file_get("/locked").unwrap_err();
    assert!(err.is_extraction());
    assert!(analyzer.file_get_sha256("/missing").unwrap_err().is_extraction());
    assert_eq!(scratch_entries(&analyzer), 0);
}

#[test]
fn test_file_get_sha256() {
    let analyzer = analyzer_for(small_tree());
    assert_eq!(analyzer.file_get_sha256("/a").unwrap(), sha256_bytes(b"alpha"));
    assert_eq!(scratch_entries(&analyzer), 0);
}

#[test]
fn test_get_file_info() {
    let analyzer = analyzer_for(small_tree());
    let fi = analyzer.get_file_info("/d/b").unwrap();
    assert_eq!(fi.name, "b");
    assert_eq!(fi.size, 5);
    assert!(fi.is_file());
    assert!(matches!(analyzer.get_file_info("/nope"), Err(AnalyzerError::NotFound(_))));
}

#[test]
fn test_cleanup_is_idempotent() {
    let mut analyzer = analyzer_for(small_tree());
    let scratch = analyzer.scratch_dir().unwrap().to_path_buf();
    let staged = analyzer.file_get("/a").unwrap();
    assert!(staged.exists());

    analyzer.cleanup().unwrap();
    assert!(!scratch.exists());
    assert!(analyzer.scratch_dir().is_none());
    analyzer.cleanup().unwrap();
}

#[test]
fn test_cleanup_on_drop() {
    let analyzer = analyzer_for(MemFs::new());
    let scratch = analyzer.scratch_dir().unwrap().to_path_buf();
    assert!(scratch.exists());
    drop(analyzer);
    assert!(!scratch.exists());
}

#[test]
fn test_scratch_dirs_are_unique() {
    let a = analyzer_for(MemFs::new());
    let b = analyzer_for(MemFs::new());
    assert_ne!(a.scratch_dir(), b.scratch_dir());
}

// =============================================================================
// Sub-walks
// =============================================================================

#[test]
fn test_check_all_files_with_path() {
    let fs = small_tree().dir("/d/e", 0o755).file("/d/e/c", 0o644, "c");
    let analyzer = analyzer_for(fs);

    let mut seen = Vec::new();
    analyzer
        .check_all_files_with_path("/d", &mut |fi, parent| seen.push(format!("{parent}|{}", fi.name)))
        .unwrap();
    assert_eq!(seen, ["/d|b", "/d|e", "/d/e|c"]);
}

#[test]
fn test_check_all_files_with_path_propagates_listing_error() {
    let analyzer = analyzer_for(small_tree().broken_dir("/d"));
    let err = analyzer.check_all_files_with_path("/", &mut |_, _| {}).unwrap_err();
    assert!(matches!(err, AnalyzerError::Walk { .. }));
}
