use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use sluice::constants::DEFAULT_INDENT;
use sluice::{count, dump, load, to_canonical_string, utils};

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Sluice - streaming JSON record store with dedup, gzip and atomic replace")]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, global = true, help = "Verbose output")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Print records from matching stores to stdout")]
    Cat {
        #[arg(required = true, help = "Glob patterns selecting input stores")]
        patterns: Vec<String>,

        #[arg(long, help = "Keep duplicate records")]
        no_unique: bool,
    },

    #[command(about = "Merge records from matching stores into output stores")]
    Merge {
        #[arg(required = true, help = "Glob patterns selecting input stores")]
        patterns: Vec<String>,

        #[arg(short, long, required = true, help = "Output store path (repeatable)")]
        output: Vec<PathBuf>,

        #[arg(long, help = "Replace existing outputs")]
        overwrite: bool,

        #[arg(long, help = "Keep duplicate records")]
        no_unique: bool,
    },

    #[command(about = "Count records across matching stores")]
    Count {
        #[arg(required = true, help = "Glob patterns selecting input stores")]
        patterns: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let verbosity = if args.verbose { "verbose" } else { "normal" };
    utils::setup_logging(verbosity)?;

    match args.command {
        Command::Cat { patterns, no_unique } => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for record in load(&patterns, !no_unique, args.verbose)? {
                let record = record?;
                writeln!(out, "{}\n--", to_canonical_string(&record, DEFAULT_INDENT)?)?;
            }
        }
        Command::Merge {
            patterns,
            output,
            overwrite,
            no_unique,
        } => {
            let records = load(&patterns, !no_unique, args.verbose)?;
            let written = dump(records, &output, overwrite, !no_unique)?;
            info!("wrote {} record(s) to {} target(s)", written, output.len());
        }
        Command::Count { patterns } => {
            println!("{}", count(&patterns)?);
        }
    }

    Ok(())
}
