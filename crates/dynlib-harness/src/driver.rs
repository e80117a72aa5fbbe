//! Plugin driver: loads each library, builds its plugin, and exercises the
//! exported binary operation, closing the library in between.
//!
//! Every step is recorded twice: as a field of the returned
//! [`LibraryReport`] and as a JSONL line on the caller's [`LogEmitter`].

use std::ffi::c_int;
use std::time::Instant;

use dynlib_core::{DlError, Handle, NativeLoader, Options, ResolvePolicy};
use dynlib_demo_plugin::{BIN_OP_SYMBOL, BinOpFn, CREATE_PLUGIN_SYMBOL, PluginBox};
use serde::Serialize;

use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

/// Errors that abort a driver run.
///
/// Library and symbol failures are not among them; those land in the report.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("log write failed: {0}")]
    Log(#[from] std::io::Error),
    #[error("report encoding failed: {0}")]
    Report(#[from] serde_json::Error),
}

/// How the driver opens each library and which symbols it exercises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub policy: ResolvePolicy,
    pub options: Options,
    /// Factory returning `*mut PluginBox`.
    pub factory: String,
    /// Symbol with the [`BinOpFn`] signature.
    pub op: String,
    pub op_args: (c_int, c_int),
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            policy: ResolvePolicy::Lazy,
            options: Options::GLOBAL | Options::NO_DELETE,
            factory: CREATE_PLUGIN_SYMBOL.to_string(),
            op: BIN_OP_SYMBOL.to_string(),
            op_args: (1, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginReport {
    pub name: String,
    pub render: String,
}

/// What happened to one library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryReport {
    pub library: String,
    pub flags: c_int,
    pub loaded: bool,
    pub plugin: Option<PluginReport>,
    pub op_result: Option<c_int>,
    /// Second call through the saved pointer once the library is closed.
    /// Only attempted when the library was opened with `NO_DELETE` on a
    /// platform that supports it.
    pub op_result_after_close: Option<c_int>,
    pub errors: Vec<String>,
}

impl LibraryReport {
    fn new(library: &str, flags: c_int) -> Self {
        Self {
            library: library.to_string(),
            flags,
            loaded: false,
            plugin: None,
            op_result: None,
            op_result_after_close: None,
            errors: Vec::new(),
        }
    }

    /// True when every step that was attempted succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.loaded && self.errors.is_empty()
    }
}

fn elapsed_ns(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Drive one library through load, create, call and close.
///
/// The handle is reconfigured from `config` before loading and is left
/// closed on return.
///
/// The symbols named by `config.factory` and `config.op` are trusted to have
/// the [`CreatePluginFn`](dynlib_demo_plugin::CreatePluginFn) and
/// [`BinOpFn`] signatures.
#[allow(unsafe_code)]
pub fn run_library<L: NativeLoader>(
    handle: &mut Handle<L>,
    library: &str,
    config: &DriverConfig,
    log: &mut LogEmitter,
) -> Result<LibraryReport, DriverError> {
    handle.set_resolve_policy(config.policy);
    handle.set_options(config.options);
    let flags = handle.flags();
    let mut report = LibraryReport::new(library, flags);

    let start = Instant::now();
    let loaded = handle.load(library);
    let entry = LogEntry::new("", LogLevel::Info, "library_load")
        .with_library(library)
        .with_flags(flags)
        .with_latency_ns(elapsed_ns(start));
    match loaded {
        Ok(()) => {
            log.emit_entry(entry.with_outcome(Outcome::Pass))?;
            report.loaded = true;
        }
        Err(err) => {
            tracing::warn!(library, error = %err, "library did not load");
            log.emit_entry(entry.with_error(handle.error()))?;
            report.errors.push(err.to_string());
            return Ok(report);
        }
    }

    // SAFETY: the factory symbol is trusted to return a heap-allocated
    // `PluginBox` (see the function docs).
    let created = unsafe { handle.create::<PluginBox, _>(&config.factory, ()) };
    let entry = LogEntry::new("", LogLevel::Info, "plugin_create")
        .with_library(library)
        .with_symbol(config.factory.as_str());
    match created {
        Ok(plugin) => {
            let plugin = PluginReport {
                name: plugin.name(),
                render: plugin.render(),
            };
            log.emit_entry(
                entry
                    .with_outcome(Outcome::Pass)
                    .with_details(serde_json::to_value(&plugin)?),
            )?;
            report.plugin = Some(plugin);
        }
        Err(err) => {
            log.emit_entry(entry.with_level(LogLevel::Warn).with_error(err.diagnostic()))?;
            report.errors.push(err.to_string());
        }
    }

    // SAFETY: the op symbol is trusted to have the `BinOpFn` signature.
    let op = unsafe { handle.lookup::<BinOpFn>(&config.op) }.and_then(|sym| {
        sym.get().ok_or(DlError::EmptySymbol {
            symbol: config.op.clone(),
        })
    });
    let entry = LogEntry::new("", LogLevel::Info, "symbol_call")
        .with_library(library)
        .with_symbol(config.op.as_str());
    let op = match op {
        Ok(f) => {
            let (a, b) = config.op_args;
            let result = f(a, b);
            log.emit_entry(
                entry
                    .with_outcome(Outcome::Pass)
                    .with_details(serde_json::json!({ "args": [a, b], "result": result })),
            )?;
            report.op_result = Some(result);
            Some(f)
        }
        Err(err) => {
            log.emit_entry(entry.with_level(LogLevel::Warn).with_error(err.diagnostic()))?;
            report.errors.push(err.to_string());
            None
        }
    };

    handle.close();
    log.emit_entry(
        LogEntry::new("", LogLevel::Info, "library_close")
            .with_library(library)
            .with_outcome(Outcome::Pass),
    )?;

    // The saved pointer stays valid only while the code remains mapped.
    if let Some(f) = op {
        let entry = LogEntry::new("", LogLevel::Info, "symbol_call_after_close")
            .with_library(library)
            .with_symbol(config.op.as_str());
        if config.options.keeps_code_mapped() {
            let (a, b) = config.op_args;
            let result = f(a, b);
            log.emit_entry(
                entry
                    .with_outcome(Outcome::Pass)
                    .with_details(serde_json::json!({ "args": [a, b], "result": result })),
            )?;
            report.op_result_after_close = Some(result);
        } else {
            log.emit_entry(entry.with_outcome(Outcome::Skip))?;
        }
    }

    tracing::debug!(library, clean = report.is_clean(), "library run finished");
    Ok(report)
}

/// Run every library in order through a single handle.
pub fn run_all<L: NativeLoader>(
    handle: &mut Handle<L>,
    libraries: &[String],
    config: &DriverConfig,
    log: &mut LogEmitter,
) -> Result<Vec<LibraryReport>, DriverError> {
    let reports = libraries
        .iter()
        .map(|library| run_library(handle, library, config, log))
        .collect::<Result<Vec<_>, _>>()?;
    log.flush()?;
    Ok(reports)
}

/// Resolution result for a single symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    /// Hex address, `None` when the lookup failed.
    pub address: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub library: String,
    pub flags: c_int,
    pub loaded: bool,
    pub error: Option<String>,
    pub symbols: Vec<SymbolReport>,
}

/// Open `library` and report the address of each symbol without calling
/// anything.
pub fn inspect<L: NativeLoader>(
    handle: &mut Handle<L>,
    library: &str,
    symbols: &[String],
    log: &mut LogEmitter,
) -> Result<InspectReport, DriverError> {
    let mut report = InspectReport {
        library: library.to_string(),
        flags: handle.flags(),
        loaded: false,
        error: None,
        symbols: Vec::new(),
    };

    let entry = LogEntry::new("", LogLevel::Info, "library_load")
        .with_library(library)
        .with_flags(report.flags);
    if let Err(err) = handle.load(library) {
        log.emit_entry(entry.with_error(err.diagnostic()))?;
        report.error = Some(err.to_string());
        log.flush()?;
        return Ok(report);
    }
    log.emit_entry(entry.with_outcome(Outcome::Pass))?;
    report.loaded = true;

    for symbol in symbols {
        let entry = LogEntry::new("", LogLevel::Info, "symbol_lookup")
            .with_library(library)
            .with_symbol(symbol.as_str());
        let line = match handle.address_of(symbol) {
            Ok(addr) => {
                let address = format!("{addr:p}");
                log.emit_entry(
                    entry
                        .with_outcome(Outcome::Pass)
                        .with_details(serde_json::json!({ "address": &address })),
                )?;
                SymbolReport {
                    symbol: symbol.clone(),
                    address: Some(address),
                    error: None,
                }
            }
            Err(err) => {
                log.emit_entry(entry.with_error(err.diagnostic()))?;
                SymbolReport {
                    symbol: symbol.clone(),
                    address: None,
                    error: Some(err.to_string()),
                }
            }
        };
        report.symbols.push(line);
    }

    handle.close();
    log.flush()?;
    Ok(report)
}
