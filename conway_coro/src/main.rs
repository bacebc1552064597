// main.rs - Distributed Conway's Game of Life with one coroutine per rank
//
//   conway_coro init -k 512 -f board
//   conway_coro run -f board -n 100 -e static -s 10 -w 4

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{InitArgs, RunArgs};

/// Toroidal Game of Life split across rank coroutines
#[derive(Parser)]
#[command(name = "conway_coro")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new playground file
    Init(InitArgs),

    /// Evolve a playground for a number of generations
    Run(RunArgs),
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Init(args) => commands::init(&args).map(|path| {
            if !cli.quiet {
                println!("{} {}", "Created".green().bold(), path.display());
            }
        }),
        Commands::Run(args) => commands::run(&args).await.map(|summary| {
            if !cli.quiet {
                let report = &summary.report;
                println!(
                    "{} {} generations of a {}x{} playground in {:.3}s, {} cells alive",
                    "Done:".green().bold(),
                    report.generations,
                    report.grid.side(),
                    report.grid.side(),
                    summary.elapsed.as_secs_f64(),
                    report.grid.population()
                );
                if let Some(cycle) = report.cycle {
                    println!(
                        "  settled into a cycle of period {} at generation {}",
                        cycle.period, cycle.generation
                    );
                }
                for path in &summary.snapshots {
                    println!("  {}", path.display().to_string().dimmed());
                }
            }
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
