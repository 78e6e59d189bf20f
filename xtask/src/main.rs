use anyhow::Result;
use clap::{Parser, Subcommand};

mod tasks;

#[derive(Parser)]
#[command(
    name = "segnet",
    about = "Multi-task SegNet toolkit",
    author,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train, evaluate and visualize, controlled by the phase flags.
    Run(tasks::run::RunArgs),
    /// Convert the split containers under a data directory to Lab colour space.
    ConvertLab(tasks::convert::ConvertLabArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run(args) => tasks::run::run(args),
        Commands::ConvertLab(args) => tasks::convert::run(args),
    }
}
