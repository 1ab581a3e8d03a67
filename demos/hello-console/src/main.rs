//! Wires `console.log` into a session and runs a script.
//!
//! ```text
//! sablec fib.js -o output
//! hello-console output
//! ```
//!
//! Without a bytecode file the bundled `fib.js` is compiled in-process.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{LevelFilter, Log, Metadata, Record};

use sable_js::{Bytecode, Value, VmSession};

const BUNDLED: &str = include_str!("../fib.js");

#[derive(Parser, Debug)]
#[command(name = "hello-console", version, about)]
struct Cli {
    /// Bytecode text written by sablec.
    bytecode: Option<PathBuf>,

    /// Log session activity to stderr.
    #[arg(long)]
    verbose: bool,
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{:>5} {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// `console` object whose `log` prints its arguments space-separated.
fn install_console(vm: &mut VmSession) -> sable_js::Result<()> {
    let console = vm.create_object()?;
    let log = vm.create_function("log", |vm, _this, args| {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            parts.push(vm.to_display_string(arg)?);
        }
        println!("{}", parts.join(" "));
        Ok(vm.create_undefined()?)
    })?;
    vm.set_property(&console, "log", log)?;
    let global = vm.get_global()?;
    vm.set_property(&global, "console", console)
}

fn load(vm: &VmSession, path: Option<&PathBuf>) -> Result<Bytecode, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            Ok(Bytecode::from_text(&text)?)
        }
        None => Ok(vm.compile(BUNDLED)?),
    }
}

fn run(cli: &Cli) -> Result<Value, Box<dyn std::error::Error>> {
    let mut vm = VmSession::new()?;
    install_console(&mut vm)?;
    let bytecode = load(&vm, cli.bytecode.as_ref())?;
    let result = vm.run(&bytecode);
    vm.destroy()?;
    Ok(result?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        });
    }

    match run(&cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            println!("[ERROR] {}", e);
            ExitCode::from(1)
        }
    }
}
