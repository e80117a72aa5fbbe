//! Driver tooling for dynlib.
//!
//! - [`driver`]: runs plugin libraries through load, create, call and close.
//! - [`structured_log`]: JSONL record of every driver step.

pub mod driver;
pub mod structured_log;

pub use driver::{
    DriverConfig, DriverError, InspectReport, LibraryReport, PluginReport, SymbolReport, inspect,
    run_all, run_library,
};
