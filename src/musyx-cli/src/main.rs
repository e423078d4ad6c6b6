mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            input,
            base,
            dedupe,
            json,
        } => {
            commands::scan::run(&input, base, dedupe, json)?;
        }

        Commands::Extract {
            input,
            output,
            base,
            log_dir,
            soundfont,
            dedupe,
        } => {
            commands::extract::run(&commands::extract::Options {
                input,
                output,
                base,
                log_dir,
                soundfont,
                dedupe,
            })?;
        }
    }

    Ok(())
}
