use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use rox::driver::{self, Outcome, Session};
use rox::error::LoxError;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log (filter with RUST_LOG)
    #[arg(long, global = true)]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: Option<PathBuf>,

        /// Print one JSON object per token instead of the text form
        #[arg(long)]
        json: bool,
    },

    /// Parses input from a file as a single expression and prints its AST
    Parse { filename: Option<PathBuf> },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: Option<PathBuf> },

    /// Runs input from a file as a Lox program
    Run { filename: Option<PathBuf> },

    /// Starts an interactive prompt
    Repl,
}

/// Reads a source file through a read-only memory map.
fn read_source(filename: &Path) -> Result<String> {
    info!("Reading file: {:?}", filename);

    let file = File::open(filename).with_context(|| format!("Failed to open file {:?}", filename))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat file {:?}", filename))?
        .len();

    if len == 0 {
        return Ok(String::new());
    }

    // SAFETY: the map is read-only and copied out before this function
    // returns; the file is not expected to change underneath us meanwhile.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to map file {:?}", filename))?;

    let source = std::str::from_utf8(&mmap)
        .map_err(LoxError::from)
        .with_context(|| format!("File {:?} is not valid UTF-8", filename))?;

    info!("Read {} bytes from {:?}", len, filename);

    Ok(source.to_owned())
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            // Strip 'rox::' from module path
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("rox::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .parse_default_env()
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Print diagnostics to stderr and return the exit code.
fn report(outcome: &Outcome) -> i32 {
    for e in outcome.diagnostics() {
        debug!("Diagnostic: {}", e);
        eprintln!("{}", e);
    }

    outcome.exit_code()
}

fn repl() -> Result<()> {
    info!("Running Repl subcommand");

    let mut session = Session::new();
    let stdin = io::stdin();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            break;
        }

        if line.trim() == "exit" {
            break;
        }

        // Errors are reported but never end the session.
        let outcome = session.run_line(line)?;
        report(&outcome);
    }

    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    let filename: Option<&PathBuf> = match &args.commands {
        Commands::Repl => return repl(),
        Commands::Tokenize { filename, .. }
        | Commands::Parse { filename }
        | Commands::Evaluate { filename }
        | Commands::Run { filename } => filename.as_ref(),
    };

    let Some(filename) = filename else {
        info!("No filepath provided");
        println!("No input filepath was provided. Exiting...");
        std::process::exit(0);
    };

    let source = read_source(filename)?;
    let stdout = io::stdout();

    let outcome: Outcome = match &args.commands {
        Commands::Tokenize { json, .. } => driver::tokenize(&source, stdout.lock(), *json)?,
        Commands::Parse { .. } => driver::parse(&source, stdout.lock())?,
        Commands::Evaluate { .. } => driver::evaluate(&source, stdout.lock())?,
        Commands::Run { .. } => driver::run(&source, stdout.lock())?,
        Commands::Repl => unreachable!("handled above"),
    };

    let code = report(&outcome);
    io::stdout().flush()?;

    info!("Exiting with code {}", code);
    std::process::exit(code);
}
