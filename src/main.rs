mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, GlobalOptions};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "code_xref=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let opts = GlobalOptions::from(&cli);

    match &cli.command {
        Commands::Defs { path, files } => cli::defs(path, files, &opts)?,
        Commands::Refs {
            path,
            files,
            selection,
        } => cli::refs(path, files, selection.as_deref(), &opts)?,
        Commands::Toks { file } => cli::toks(file, &opts)?,
        Commands::Coverage { path } => cli::coverage(path, &opts)?,
        Commands::Languages => cli::languages()?,
    }

    Ok(())
}
