use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod cli;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log every training and sampling detail.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a noise predictor on a toy 2D distribution
    Train {
        #[clap(flatten)]
        args: cli::train::TrainArgs,
    },
    /// Generate points from a trained checkpoint
    Sample {
        #[clap(flatten)]
        args: cli::sample::SampleArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install the log subscriber")?;

    match &cli.command {
        Commands::Train { args } => {
            cli::train::handle_train(args)?;
        }
        Commands::Sample { args } => {
            cli::sample::handle_sample(args)?;
        }
    }

    Ok(())
}
