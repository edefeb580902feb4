use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use comicshelf::cli::{Cli, Command};
use comicshelf::commands;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    comicshelf::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Normalize(args) => commands::normalize(args).context("normalize")?,
        Command::Extract(args) => commands::extract(args).await.context("extract")?,
        Command::Resolve(args) => commands::resolve(args).await.context("resolve")?,
        Command::Import(args) => commands::import(args).await.context("import")?,
        Command::Series(args) => commands::series(args).await.context("series")?,
    }

    Ok(())
}
