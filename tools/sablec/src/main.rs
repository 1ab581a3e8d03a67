use std::process::ExitCode;

use clap::Parser;

use sablec::cli::Cli;
use sablec::compile;
use sablec::error::SablecError;
use sablec::logger;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(logger::level_for(cli.verbose));

    let result = match cli.input_path() {
        Some(input) => compile::compile_file(input, &cli.output),
        None => Err(SablecError::InputMissing),
    };

    match result {
        Ok(report) => {
            if !cli.silent {
                println!(
                    "[INFO] compiled {} -> {} ({} bytes)",
                    report.input.display(),
                    report.output.display(),
                    report.bytecode_len
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if !cli.silent {
                println!("[ERROR] {}", e);
            }
            e.exit_code()
        }
    }
}
