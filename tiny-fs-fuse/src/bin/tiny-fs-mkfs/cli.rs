use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Image file to create
    pub image: PathBuf,

    /// Partition size in sectors
    #[arg(long, short, default_value_t = 16384)]
    pub sectors: u32,

    /// Import every file of this directory into the image root
    #[arg(long, short)]
    pub import: Option<PathBuf>,
}
