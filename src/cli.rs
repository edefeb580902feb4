use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the 13-digit form of an ISBN.
    Normalize(NormalizeArgs),
    /// List the candidate ISBNs found in a CSV or plain-text file.
    Extract(ExtractArgs),
    /// Look up bibliographic data for one ISBN.
    Resolve(ResolveArgs),
    /// Register every ISBN in a file into a local catalog.
    Import(ImportArgs),
    /// Show series groups and missing volumes of a local catalog.
    Series(SeriesArgs),
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    pub isbn: String,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Input file, or `-` for stdin.
    #[arg(long, default_value = "-")]
    pub input: String,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    pub isbn: String,

    /// Embed the cover image (or a generated placeholder) as a data URL.
    #[arg(long)]
    pub download_cover: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Input file, or `-` for stdin.
    #[arg(long)]
    pub input: String,

    /// Catalog directory.
    #[arg(long)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub owner: String,

    #[arg(long)]
    pub download_covers: bool,

    /// How often to check job progress.
    #[arg(long, default_value_t = 500)]
    pub poll_ms: u64,
}

#[derive(Debug, Args)]
pub struct SeriesArgs {
    /// Catalog directory.
    #[arg(long)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub owner: String,
}
