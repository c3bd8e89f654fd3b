use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Input device or image to carve (raw bytes, no filesystem awareness)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Root directory for recovered files
    #[arg(short, long, default_value = "./recovered")]
    pub output: PathBuf,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Comma-separated format names to enable (overrides config), e.g. PNG,MP3
    #[arg(long, value_delimiter = ',')]
    pub types: Option<Vec<String>>,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}
