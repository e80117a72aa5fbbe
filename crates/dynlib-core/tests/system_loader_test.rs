//! Integration test: handle against the real platform loader.
//!
//! Uses the main program (always available) and the system math library
//! (glibc Linux only). Tests that need a library that is not present skip
//! with a note on stderr.
//!
//! Run: cargo test -p dynlib-core --test system_loader_test

use std::ffi::{c_char, c_double, c_int};

use dynlib_core::{ErrorKind, Handle, Options, ResolvePolicy};

type Abs = extern "C" fn(c_int) -> c_int;
type Strlen = unsafe extern "C" fn(*const c_char) -> usize;
type Cos = extern "C" fn(c_double) -> c_double;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
const LIBM: &str = "libm.so.6";
#[cfg(target_vendor = "apple")]
const LIBM: &str = "/usr/lib/libSystem.B.dylib";
#[cfg(not(any(all(target_os = "linux", target_env = "gnu"), target_vendor = "apple")))]
const LIBM: &str = "libm.so";

fn open_libm(policy: ResolvePolicy, options: Options) -> Option<Handle> {
    let mut lib = Handle::new();
    lib.set_resolve_policy(policy);
    lib.set_options(options);
    match lib.load(LIBM) {
        Ok(()) => Some(lib),
        Err(err) => {
            eprintln!("Skipping: cannot load {LIBM}: {err}");
            None
        }
    }
}

#[test]
fn main_program_resolves_libc_symbols() {
    let lib = Handle::open("").expect("main program handle");
    assert!(lib.is_loaded());
    assert_eq!(lib.lib_name(), "");

    let abs = unsafe { lib.lookup::<Abs>("abs") }.unwrap();
    assert_eq!(abs.call((-17,)), Ok(17));

    let strlen = unsafe { lib.lookup::<Strlen>("strlen") }.unwrap();
    let f = strlen.get().unwrap();
    assert_eq!(unsafe { f(c"dynlib".as_ptr()) }, 6);
}

#[test]
fn nonexistent_library_fails_with_loader_text() {
    let mut lib = Handle::new();

    let err = lib.load("libdynlib-nonexistent.so").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadFailed);
    assert!(!lib.is_loaded());
    assert!(!lib.error().is_empty());
    assert!(lib.error().contains("libdynlib-nonexistent.so"), "{}", lib.error());
}

#[test]
fn missing_symbol_reports_loader_text() {
    let lib = Handle::open("").unwrap();

    let err = unsafe { lib.lookup::<Abs>("dynlib_definitely_not_exported") }.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SymbolNotFound);
    assert!(lib.error().contains("dynlib_definitely_not_exported"), "{}", lib.error());
}

#[test]
fn math_library_lookup_matches_direct_call() {
    let Some(lib) = open_libm(ResolvePolicy::Now, Options::NONE) else {
        return;
    };
    let cos = unsafe { lib.lookup::<Cos>("cos") }.unwrap();
    for x in [0.0, 0.5, 1.0, std::f64::consts::PI] {
        assert!((cos.call((x,)).unwrap() - x.cos()).abs() < 1e-12);
    }
}

#[test]
fn no_delete_keeps_pointer_callable_after_close() {
    if !Options::NO_DELETE.keeps_code_mapped() {
        eprintln!("Skipping: loader has no RTLD_NODELETE");
        return;
    }
    let Some(mut lib) = open_libm(ResolvePolicy::Lazy, Options::GLOBAL | Options::NO_DELETE)
    else {
        return;
    };
    let cos = unsafe { lib.lookup::<Cos>("cos") }.unwrap().get().unwrap();
    assert_eq!(cos(0.0), 1.0);

    lib.close();
    assert!(!lib.is_loaded());

    assert_eq!(cos(0.0), 1.0);
}

#[test]
fn reload_cycles_keep_handle_consistent() {
    let mut lib = Handle::new();
    for _ in 0..3 {
        lib.load("").unwrap();
        assert!(lib.is_loaded());
        assert!(unsafe { lib.lookup::<Abs>("abs") }.is_ok());
        lib.close();
        assert!(!lib.is_loaded());
    }
    lib.reload().unwrap();
    assert!(lib.is_loaded());
}

#[test]
fn no_load_only_finds_resident_libraries() {
    if Options::NO_LOAD.is_empty() {
        eprintln!("Skipping: loader has no RTLD_NOLOAD");
        return;
    }
    let mut lib = Handle::new();
    lib.set_options(Options::NO_LOAD);

    // Never loaded by anything, so NO_LOAD must refuse it.
    assert!(lib.load("libdynlib-never-loaded.so").is_err());
    assert!(!lib.is_loaded());
}

#[test]
fn lookup_on_closed_handle_is_not_open() {
    let lib = Handle::new();
    let err = unsafe { lib.lookup::<Abs>("abs") }.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotOpen);
    assert_eq!(lib.error(), "Handle not open.");
}

#[test]
fn handle_can_move_between_threads() {
    let lib = Handle::open("").unwrap();
    let lib = std::thread::spawn(move || {
        assert!(unsafe { lib.lookup::<Abs>("abs") }.is_ok());
        lib
    })
    .join()
    .unwrap();
    assert!(lib.is_loaded());
}
