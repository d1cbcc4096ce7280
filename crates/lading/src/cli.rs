use clap::Parser;
use std::path::PathBuf;

/// Private Python package index with fallback to an upstream index.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct LadingArgs {
    /// YAML config file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Load the config, open the store and auth backend, then exit without serving.
    #[arg(long)]
    pub check: bool,
}
