use clap::Parser;
use dirarchive::cli::{Cli, run_cli};
use dirarchive::output::OutputFormatter;
use std::process;

fn main() {
    let cli = Cli::parse();

    let code = match run_cli(cli) {
        Ok(code) => code,
        Err(e) => {
            OutputFormatter::error(&format!("{:#}", e));
            1
        }
    };

    process::exit(code);
}
