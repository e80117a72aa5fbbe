//! Integration test: driver runs against the mock loader.
//!
//! The mock resolves the plugin symbols to the demo plugin's exports linked
//! into this test binary, so every step runs real code.
//!
//! Run: cargo test -p dynlib-harness --test driver_test

use std::ffi::c_int;

use dynlib_core::testing::MockLoader;
use dynlib_core::{Handle, LoaderDefaults, Options, ResolvePolicy};
use dynlib_demo_plugin::{BinOpFn, CreatePluginFn, PluginBox, bin_op, create_plugin};
use dynlib_harness::structured_log::{LogEmitter, validate_log_file};
use dynlib_harness::{DriverConfig, inspect, run_all, run_library};

#[allow(improper_ctypes_definitions)]
extern "C" fn make_nothing() -> *mut PluginBox {
    std::ptr::null_mut()
}

extern "C" fn multiply(a: c_int, b: c_int) -> c_int {
    a * b
}

fn plugin_mock() -> MockLoader {
    let mock = MockLoader::new();
    mock.define_fn::<CreatePluginFn>("create_plugin", create_plugin);
    mock.define_fn::<BinOpFn>("bin_op", bin_op);
    mock
}

fn handle(mock: &MockLoader) -> Handle<MockLoader> {
    Handle::with_defaults(mock.clone(), LoaderDefaults::default())
}

// ---------------------------------------------------------------------------
// run_library
// ---------------------------------------------------------------------------

#[test]
fn full_run_creates_plugin_and_calls_op() {
    let mock = plugin_mock();
    let mut lib = handle(&mock);
    let mut log = LogEmitter::sink("t");

    let report = run_library(&mut lib, "plugin_b.so", &DriverConfig::default(), &mut log).unwrap();

    assert!(report.is_clean(), "{report:?}");
    let plugin = report.plugin.unwrap();
    assert_eq!(plugin.name, "plugin_b");
    assert_eq!(plugin.render, "plugin_b::render()");
    assert_eq!(report.op_result, Some(3));
    assert_eq!(
        report.op_result_after_close,
        Options::NO_DELETE.keeps_code_mapped().then_some(3)
    );
    assert_eq!(
        report.flags,
        ResolvePolicy::Lazy | (Options::GLOBAL | Options::NO_DELETE)
    );
    assert_eq!(mock.last_flags(), Some(report.flags));
    assert_eq!(mock.lookups(), vec!["create_plugin", "bin_op"]);
    assert_eq!(mock.close_count(), 1);
    assert!(!lib.is_loaded());
}

#[test]
fn without_no_delete_pointer_is_not_reused_after_close() {
    let mock = plugin_mock();
    let mut lib = handle(&mock);
    let config = DriverConfig {
        options: Options::GLOBAL,
        ..DriverConfig::default()
    };

    let report = run_library(&mut lib, "plugin_b.so", &config, &mut LogEmitter::sink("t")).unwrap();

    assert_eq!(report.op_result, Some(3));
    assert_eq!(report.op_result_after_close, None);
}

#[test]
fn empty_option_set_never_calls_after_close() {
    let mock = plugin_mock();
    let mut lib = handle(&mock);
    let config = DriverConfig {
        options: Options::NONE,
        ..DriverConfig::default()
    };
    let dir = std::env::temp_dir().join(format!("dynlib_driver_none_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("run.jsonl");

    let report = {
        let mut log = LogEmitter::to_file(&path, "none").unwrap();
        let report = run_library(&mut lib, "plugin_b.so", &config, &mut log).unwrap();
        log.flush().unwrap();
        report
    };

    assert_eq!(report.op_result, Some(3));
    assert_eq!(report.op_result_after_close, None);
    let content = std::fs::read_to_string(&path).unwrap();
    let last: serde_json::Value = serde_json::from_str(content.lines().last().unwrap()).unwrap();
    assert_eq!(last["event"], "symbol_call_after_close");
    assert_eq!(last["outcome"], "skip");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn failed_load_skips_remaining_steps() {
    let mock = plugin_mock();
    mock.fail_open(Some("plugin_x.so: cannot open shared object file"));
    let mut lib = handle(&mock);

    let report =
        run_library(&mut lib, "plugin_x.so", &DriverConfig::default(), &mut LogEmitter::sink("t"))
            .unwrap();

    assert!(!report.loaded);
    assert!(report.plugin.is_none());
    assert_eq!(report.op_result, None);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("plugin_x.so"));
    assert_eq!(mock.lookup_count(), 0);
}

#[test]
fn missing_factory_still_runs_op() {
    let mock = MockLoader::new();
    mock.define_fn::<BinOpFn>("bin_op", bin_op);
    let mut lib = handle(&mock);

    let report =
        run_library(&mut lib, "ops.so", &DriverConfig::default(), &mut LogEmitter::sink("t"))
            .unwrap();

    assert!(report.loaded);
    assert!(report.plugin.is_none());
    assert_eq!(report.op_result, Some(3));
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("create_plugin"), "{:?}", report.errors);
}

#[test]
fn missing_op_is_reported() {
    let mock = MockLoader::new();
    mock.define_fn::<CreatePluginFn>("create_plugin", create_plugin);
    let mut lib = handle(&mock);

    let report =
        run_library(&mut lib, "plugin.so", &DriverConfig::default(), &mut LogEmitter::sink("t"))
            .unwrap();

    assert!(report.plugin.is_some());
    assert_eq!(report.op_result, None);
    assert_eq!(report.op_result_after_close, None);
    assert!(report.errors[0].contains("bin_op"), "{:?}", report.errors);
    assert_eq!(mock.close_count(), 1);
}

#[test]
fn null_plugin_object_is_an_error() {
    let mock = plugin_mock();
    mock.define_fn::<CreatePluginFn>("create_plugin", make_nothing);
    let mut lib = handle(&mock);

    let report =
        run_library(&mut lib, "plugin.so", &DriverConfig::default(), &mut LogEmitter::sink("t"))
            .unwrap();

    assert!(report.plugin.is_none());
    assert_eq!(report.op_result, Some(3));
    assert!(report.errors[0].contains("null"), "{:?}", report.errors);
}

#[test]
fn custom_symbols_and_arguments() {
    let mock = plugin_mock();
    mock.define_fn::<BinOpFn>("mul", multiply);
    let mut lib = handle(&mock);
    let config = DriverConfig {
        policy: ResolvePolicy::Now,
        options: Options::LOCAL,
        op: "mul".into(),
        op_args: (6, -7),
        ..DriverConfig::default()
    };

    let report = run_library(&mut lib, "plugin.so", &config, &mut LogEmitter::sink("t")).unwrap();

    assert_eq!(report.op_result, Some(-42));
    assert_eq!(mock.last_flags(), Some(ResolvePolicy::Now | Options::LOCAL));
}

// ---------------------------------------------------------------------------
// run_all
// ---------------------------------------------------------------------------

#[test]
fn run_all_drives_each_library_through_one_handle() {
    let mock = plugin_mock();
    let mut lib = handle(&mock);
    let libraries = vec!["a.so".to_string(), "b.so".to_string()];

    let reports =
        run_all(&mut lib, &libraries, &DriverConfig::default(), &mut LogEmitter::sink("t"))
            .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_clean()));
    let opened: Vec<_> = mock
        .opens()
        .into_iter()
        .map(|call| call.filename.unwrap())
        .collect();
    assert_eq!(opened, libraries);
    assert_eq!(mock.close_count(), 2);
}

#[test]
fn run_log_is_valid_jsonl() {
    let dir = std::env::temp_dir().join(format!("dynlib_driver_test_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("run.jsonl");

    let mock = plugin_mock();
    let mut lib = handle(&mock);
    {
        let mut log = LogEmitter::to_file(&path, "integ").unwrap();
        let libraries = vec!["plugin_b.so".to_string(), "missing_op.so".to_string()];
        run_all(&mut lib, &libraries[..1], &DriverConfig::default(), &mut log).unwrap();
        mock.fail_open(Some("missing_op.so: not found"));
        run_all(&mut lib, &libraries[1..], &DriverConfig::default(), &mut log).unwrap();
    }

    let (count, errors) = validate_log_file(&path).unwrap();
    assert!(errors.is_empty(), "{errors:?}");
    // load, create, call, close, call-after-close, then the failed load.
    assert_eq!(count, 6);

    let content = std::fs::read_to_string(&path).unwrap();
    let events: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let names: Vec<&str> = events.iter().map(|e| e["event"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        [
            "library_load",
            "plugin_create",
            "symbol_call",
            "library_close",
            "symbol_call_after_close",
            "library_load",
        ]
    );
    assert_eq!(events[2]["details"]["result"], 3);
    assert_eq!(events[5]["outcome"], "fail");
    assert_eq!(events[5]["error"], "missing_op.so: not found");
    assert!(events[5]["trace_id"].as_str().unwrap().ends_with("::006"));

    std::fs::remove_dir_all(&dir).ok();
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

#[test]
fn inspect_reports_addresses_and_failures() {
    let mock = MockLoader::new();
    mock.define("present", 0x1000);
    let mut lib = handle(&mock);
    let symbols = vec!["present".to_string(), "absent".to_string()];

    let report = inspect(&mut lib, "lib.so", &symbols, &mut LogEmitter::sink("t")).unwrap();

    assert!(report.loaded);
    assert_eq!(report.symbols[0].address.as_deref(), Some("0x1000"));
    assert_eq!(report.symbols[0].error, None);
    assert_eq!(report.symbols[1].address, None);
    assert!(report.symbols[1].error.as_deref().unwrap().contains("absent"));
    assert!(!lib.is_loaded());
}

#[test]
fn inspect_failed_load_resolves_nothing() {
    let mock = MockLoader::new();
    mock.fail_open(Some("gone"));
    let mut lib = handle(&mock);

    let report =
        inspect(&mut lib, "lib.so", &["x".to_string()], &mut LogEmitter::sink("t")).unwrap();

    assert!(!report.loaded);
    assert!(report.symbols.is_empty());
    assert_eq!(mock.lookup_count(), 0);
}
