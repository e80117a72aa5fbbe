//! Command-line driver for dynlib plugin libraries.

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dynlib_core::{Handle, Options, ResolvePolicy};
use dynlib_demo_plugin::{BIN_OP_SYMBOL, CREATE_PLUGIN_SYMBOL};
use dynlib_harness::structured_log::LogEmitter;
use dynlib_harness::{DriverConfig, LibraryReport};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter for this binary.
const LOG_FILTER_ENV: &str = "DYNLIB_LOG";

#[derive(Parser)]
#[command(name = "dynlib-driver", about = "Load plugin libraries and exercise their symbols")]
struct Cli {
    /// Write a JSONL record of every step to this file.
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// Run id stamped into JSONL trace ids.
    #[arg(long, global = true, default_value = "run")]
    run_id: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load each library, create its plugin and call its binary operation.
    Run {
        /// Libraries to drive. Read one per line from stdin when omitted.
        libraries: Vec<String>,

        /// Symbol resolution policy (`lazy` or `now`).
        #[arg(long, default_value = "lazy")]
        policy: ResolvePolicy,

        /// Comma-separated load options (`global`, `local`, `no-delete`,
        /// `no-load`, `deep-bind`, or `none`).
        #[arg(long, default_value = "global,no-delete")]
        options: Options,

        /// Factory symbol returning the plugin object.
        #[arg(long, default_value = CREATE_PLUGIN_SYMBOL)]
        factory: String,

        /// Symbol taking two ints and returning an int.
        #[arg(long, default_value = BIN_OP_SYMBOL)]
        op: String,

        /// Arguments passed to the binary operation.
        #[arg(long, num_args = 2, value_names = ["A", "B"], default_values_t = [1, 2], allow_negative_numbers = true)]
        args: Vec<i32>,

        /// Print reports as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Open a library and print the address of each named symbol.
    Inspect {
        library: String,

        /// Symbol to resolve; may be repeated.
        #[arg(long = "symbol", short = 's', required = true)]
        symbols: Vec<String>,

        #[arg(long, default_value = "now")]
        policy: ResolvePolicy,

        #[arg(long, default_value = "none")]
        options: Options,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn emitter(cli_log: Option<&PathBuf>, run_id: &str) -> std::io::Result<LogEmitter> {
    match cli_log {
        Some(path) => LogEmitter::to_file(path, run_id),
        None => Ok(LogEmitter::sink(run_id)),
    }
}

fn read_libraries() -> std::io::Result<Vec<String>> {
    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    let mut libraries = Vec::new();
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            eprint!("Enter the name of the library you wish to load: ");
            std::io::stderr().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let name = line.trim();
        if !name.is_empty() {
            libraries.push(name.to_string());
        }
    }
    Ok(libraries)
}

fn print_report(report: &LibraryReport, config: &DriverConfig) {
    let (a, b) = config.op_args;
    println!("== {}", display_name(&report.library));
    if !report.loaded {
        for err in &report.errors {
            println!("{err}");
        }
        return;
    }
    match &report.plugin {
        Some(plugin) => println!("{}", plugin.render),
        None => println!("Could not create object."),
    }
    match report.op_result {
        Some(result) => println!("{}({a}, {b}) = {result}", config.op),
        None => println!("{}: symbol cannot be found.", config.op),
    }
    if let Some(result) = report.op_result_after_close {
        println!("{}({a}, {b}) after close = {result}", config.op);
    }
}

fn display_name(library: &str) -> &str {
    if library.is_empty() {
        "<main program>"
    } else {
        library
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let mut log = emitter(cli.log.as_ref(), &cli.run_id)?;

    match cli.command {
        Command::Run {
            libraries,
            policy,
            options,
            factory,
            op,
            args,
            json,
        } => {
            let op_args = match args.as_slice() {
                [a, b] => (*a, *b),
                _ => return Err("--args takes exactly two integers".into()),
            };
            let config = DriverConfig {
                policy,
                options,
                factory,
                op,
                op_args,
            };
            let libraries = if libraries.is_empty() {
                read_libraries()?
            } else {
                libraries
            };

            let mut handle = Handle::new();
            let reports = dynlib_harness::run_all(&mut handle, &libraries, &config, &mut log)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    print_report(report, &config);
                }
            }
            if reports.iter().any(|r| !r.is_clean()) {
                std::process::exit(1);
            }
        }
        Command::Inspect {
            library,
            symbols,
            policy,
            options,
        } => {
            let mut handle = Handle::new();
            handle.set_resolve_policy(policy);
            handle.set_options(options);
            let report = dynlib_harness::inspect(&mut handle, &library, &symbols, &mut log)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.loaded {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
