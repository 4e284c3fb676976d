//! Cort CLI - Render and plan component operator manifests locally

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

mod commands;
mod config;
mod error;
mod exit_codes;

use commands::SourceArgs;

#[derive(Parser)]
#[command(name = "cort")]
#[command(version)]
#[command(about = "Render and plan component operator manifests locally", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the object list and print it as multi-document YAML
    Template {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the merged parameters to stderr
        #[arg(long)]
        show_parameters: bool,
    },

    /// Run one reconciliation pass and print the next status
    Plan {
        #[command(flatten)]
        source: SourceArgs,

        /// Status from the previous pass (YAML)
        #[arg(long)]
        status: Option<PathBuf>,

        /// Treat the component as being deleted
        #[arg(long)]
        deleting: bool,

        /// Spec generation (default: the previously observed one, at least 1)
        #[arg(long)]
        generation: Option<i64>,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let env = std::env::var("CORT_LOG").unwrap_or_else(|_| default.to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Template {
            source,
            show_parameters,
        } => commands::template::run(&source, show_parameters),

        Commands::Plan {
            source,
            status,
            deleting,
            generation,
        } => commands::plan::run(&source, status.as_deref(), deleting, generation),
    };

    match result {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            std::process::exit(code);
        }
    }
}
