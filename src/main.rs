use std::io::Write;

use anyhow::Context;
use clap::Parser;
use energy_charts::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::init_tracing(cli.verbose);

    match cli::run(&cli) {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{output}").context("writing output")?;
            Ok(())
        }
        Err(err) => {
            if cli.json_output() {
                eprintln!("{}", err.to_json());
            } else {
                eprintln!("error: {err}");
            }
            std::process::exit(err.code);
        }
    }
}
