//! Tundra CLI - headless runner for reactive notebooks.

mod deps;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tundra")]
#[command(about = "Evaluate reactive notebooks from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every cell of a notebook and print the results
    Run {
        /// Path to the notebook (.md file)
        notebook: PathBuf,

        /// Engine configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Serve a setup cell URL from a JSON file, as URL=FILE
        #[arg(long = "script", value_name = "URL=FILE")]
        scripts: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print each cell's inputs and dependents
    Deps {
        /// Path to the notebook (.md file)
        notebook: PathBuf,
    },

    /// Rewrite a notebook in canonical form on stdout
    Fmt {
        /// Path to the notebook (.md file)
        notebook: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            notebook,
            config,
            scripts,
            json,
        } => run::execute(&notebook, config.as_deref(), &scripts, json).await?,

        Commands::Deps { notebook } => deps::execute(&notebook)?,

        Commands::Fmt { notebook } => {
            let drafts = run::read_document(&notebook)?;
            print!("{}", tundra_core::document::render(&drafts));
        }
    }

    Ok(())
}
